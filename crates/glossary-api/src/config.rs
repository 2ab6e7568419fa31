use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use glossary_core::{DuplicatePolicy, ListOrder, RemovalPolicy, StoreConfig, DEFAULT_PAGE_SIZE};
use glossary_store_sqlite::{SqliteBackend, SqliteLocation, DEFAULT_BUSY_TIMEOUT};
use serde::{Deserialize, Serialize};
use tracing::warn;

pub const ENV_BACKEND: &str = "GLOSSARY_BACKEND";
pub const ENV_FILE: &str = "GLOSSARY_FILE";
pub const ENV_DATABASE_URL: &str = "GLOSSARY_DATABASE_URL";
pub const ENV_PAGE_SIZE: &str = "GLOSSARY_PAGE_SIZE";
pub const ENV_DUPLICATE_POLICY: &str = "GLOSSARY_DUPLICATE_POLICY";
pub const ENV_REMOVAL_POLICY: &str = "GLOSSARY_REMOVAL_POLICY";
pub const ENV_LIST_ORDER: &str = "GLOSSARY_LIST_ORDER";
pub const ENV_DB_TIMEOUT_MS: &str = "GLOSSARY_DB_TIMEOUT_MS";

pub const DEFAULT_JSON_FILE: &str = "dicionario.json";
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Memory,
    #[default]
    Json,
    Sqlite,
}

impl BackendKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Json => "json",
            Self::Sqlite => "sqlite",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "memory" => Some(Self::Memory),
            "json" => Some(Self::Json),
            "sqlite" => Some(Self::Sqlite),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum BackendConfig {
    Memory,
    JsonFile { path: PathBuf },
    Sqlite { location: SqliteLocation, busy_timeout: Duration },
}

impl BackendConfig {
    #[must_use]
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Memory => BackendKind::Memory,
            Self::JsonFile { .. } => BackendKind::Json,
            Self::Sqlite { .. } => BackendKind::Sqlite,
        }
    }
}

/// Everything needed to open a store, resolved once at startup.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct GlossaryConfig {
    pub backend: BackendConfig,
    pub store: StoreConfig,
}

impl GlossaryConfig {
    /// Read configuration from the process environment, after loading `.env`
    /// when one exists.
    ///
    /// # Errors
    /// Fails when a variable holds an unknown value or the selected backend is
    /// missing required settings.
    pub fn from_env() -> Result<Self> {
        Self::from_env_with_overrides(&[])
    }

    /// Like [`GlossaryConfig::from_env`], but `overrides` (variable name and
    /// value pairs, usually from command-line flags) take precedence.
    ///
    /// # Errors
    /// Same as [`GlossaryConfig::from_env`].
    pub fn from_env_with_overrides(overrides: &[(&str, String)]) -> Result<Self> {
        if let Err(err) = dotenvy::dotenv() {
            if !err.not_found() {
                warn!(error = %err, "failed to load .env file");
            }
        }
        Self::from_lookup(|key| {
            overrides
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| value.clone())
                .or_else(|| std::env::var(key).ok())
        })
    }

    /// Resolve configuration through `lookup`, which maps a variable name to
    /// its value. Blank values count as unset.
    ///
    /// # Errors
    /// Same as [`GlossaryConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key).map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
        };

        let kind = match get(ENV_BACKEND) {
            Some(raw) => BackendKind::parse(&raw.to_lowercase()).ok_or_else(|| {
                anyhow!("{ENV_BACKEND} must be one of memory, json, sqlite (got `{raw}`)")
            })?,
            None => BackendKind::default(),
        };

        let backend = match kind {
            BackendKind::Memory => BackendConfig::Memory,
            BackendKind::Json => BackendConfig::JsonFile {
                path: get(ENV_FILE).map_or_else(|| PathBuf::from(DEFAULT_JSON_FILE), PathBuf::from),
            },
            BackendKind::Sqlite => {
                let url = get(ENV_DATABASE_URL).ok_or_else(|| {
                    anyhow!("{ENV_DATABASE_URL} is required when {ENV_BACKEND}=sqlite")
                })?;
                let location = SqliteBackend::from_url(&url)
                    .with_context(|| format!("invalid {ENV_DATABASE_URL}"))?
                    .location()
                    .clone();
                let busy_timeout = match get(ENV_DB_TIMEOUT_MS) {
                    Some(raw) => {
                        Duration::from_millis(parse_number::<u64>(ENV_DB_TIMEOUT_MS, &raw)?)
                    }
                    None => DEFAULT_BUSY_TIMEOUT,
                };
                BackendConfig::Sqlite { location, busy_timeout }
            }
        };

        let page_size = match get(ENV_PAGE_SIZE) {
            Some(raw) => parse_number::<usize>(ENV_PAGE_SIZE, &raw)?,
            None => DEFAULT_PAGE_SIZE,
        };
        if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
            return Err(anyhow!("{ENV_PAGE_SIZE} must be in 1..={MAX_PAGE_SIZE} (got {page_size})"));
        }

        let store = StoreConfig {
            duplicate_policy: parse_choice(
                ENV_DUPLICATE_POLICY,
                get(ENV_DUPLICATE_POLICY),
                DuplicatePolicy::parse,
                "reject, overwrite",
            )?
            .unwrap_or_default(),
            removal_policy: parse_choice(
                ENV_REMOVAL_POLICY,
                get(ENV_REMOVAL_POLICY),
                RemovalPolicy::parse,
                "author-or-admin, author-admin-or-unowned, open",
            )?
            .unwrap_or_default(),
            list_order: parse_choice(
                ENV_LIST_ORDER,
                get(ENV_LIST_ORDER),
                ListOrder::parse,
                "alphabetical, insertion",
            )?
            .unwrap_or_default(),
            page_size,
        };

        Ok(Self { backend, store })
    }
}

fn parse_number<T: FromStr>(key: &str, raw: &str) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    raw.parse::<T>().with_context(|| format!("{key} must be a non-negative integer (got `{raw}`)"))
}

fn parse_choice<T>(
    key: &str,
    raw: Option<String>,
    parse: fn(&str) -> Option<T>,
    expected: &str,
) -> Result<Option<T>> {
    raw.map(|raw| {
        parse(&raw.to_lowercase())
            .ok_or_else(|| anyhow!("{key} must be one of {expected} (got `{raw}`)"))
    })
    .transpose()
}
