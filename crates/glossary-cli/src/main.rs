use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use glossary_api::config::{ENV_BACKEND, ENV_DATABASE_URL, ENV_FILE};
use glossary_api::seed::{load_corpus_file, reference_corpus};
use glossary_api::{
    open_store, Author, BackendKind, GlossaryConfig, GlossaryStore, RemoveOutcome,
    SelectedBackend,
};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const CLI_CONTRACT_VERSION: &str = "cli.v1";
const LOG_ENV: &str = "GLOSSARY_LOG";
const DEFAULT_LOG_FILTER: &str = "warn";
const REMOVED_PREVIEW_CHARS: usize = 500;

#[derive(Debug, Parser)]
#[command(name = "glossary")]
#[command(about = "Term glossary CLI")]
struct Cli {
    #[command(flatten)]
    storage: StorageArgs,

    #[command(subcommand)]
    command: Command,
}

/// Flags that override the matching `GLOSSARY_*` environment variables.
#[derive(Debug, Args)]
struct StorageArgs {
    #[arg(long, global = true, value_enum)]
    backend: Option<BackendArg>,
    #[arg(long, global = true)]
    file: Option<PathBuf>,
    #[arg(long, global = true)]
    database_url: Option<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BackendArg {
    Memory,
    Json,
    Sqlite,
}

impl From<BackendArg> for BackendKind {
    fn from(value: BackendArg) -> Self {
        match value {
            BackendArg::Memory => Self::Memory,
            BackendArg::Json => Self::Json,
            BackendArg::Sqlite => Self::Sqlite,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    Define(DefineArgs),
    Edit(EditArgs),
    Lookup(LookupArgs),
    Remove(RemoveArgs),
    List(ListArgs),
    Stats,
    Seed(SeedArgs),
}

#[derive(Debug, Args)]
struct DefineArgs {
    term: String,
    definition: String,
    #[arg(long)]
    author: String,
    #[arg(long)]
    author_id: Option<String>,
}

#[derive(Debug, Args)]
struct EditArgs {
    term: String,
    definition: String,
}

#[derive(Debug, Args)]
struct LookupArgs {
    term: String,
}

#[derive(Debug, Args)]
struct RemoveArgs {
    term: String,
    #[arg(long)]
    requester_id: String,
    #[arg(long, default_value_t = false)]
    admin: bool,
}

#[derive(Debug, Args)]
struct ListArgs {
    #[arg(long, default_value_t = 1)]
    page: usize,
    #[arg(long, value_parser = clap::value_parser!(u16).range(1..=100))]
    page_size: Option<u16>,
}

#[derive(Debug, Args)]
struct SeedArgs {
    /// JSON corpus file; the built-in philosophy corpus is used when omitted.
    #[arg(long)]
    corpus: Option<PathBuf>,
}

impl StorageArgs {
    fn env_overrides(&self) -> Vec<(&'static str, String)> {
        let mut overrides = Vec::new();
        if let Some(backend) = self.backend {
            overrides.push((ENV_BACKEND, BackendKind::from(backend).as_str().to_string()));
        }
        if let Some(file) = &self.file {
            overrides.push((ENV_FILE, file.display().to_string()));
        }
        if let Some(url) = &self.database_url {
            overrides.push((ENV_DATABASE_URL, url.clone()));
        }
        overrides
    }
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    // Stdout carries the JSON contract, so logs go to stderr.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

fn with_contract_version(value: Value) -> Value {
    match value {
        Value::Object(mut object) => {
            object.insert(
                "contract_version".to_string(),
                Value::String(CLI_CONTRACT_VERSION.to_string()),
            );
            Value::Object(object)
        }
        other => serde_json::json!({
            "contract_version": CLI_CONTRACT_VERSION,
            "payload": other
        }),
    }
}

fn emit_json(value: Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&with_contract_version(value))?);
    Ok(())
}

fn emit_outcome<T: Serialize>(store: &GlossaryStore<SelectedBackend>, outcome: &T) -> Result<()> {
    emit_json(serde_json::json!({
        "backend": store.backend_name(),
        "degraded": store.is_degraded(),
        "outcome": serde_json::to_value(outcome)?,
    }))
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = GlossaryConfig::from_env_with_overrides(&cli.storage.env_overrides())
        .context("invalid glossary configuration")?;
    let mut store = open_store(&config);
    debug!(command = ?cli.command, backend = store.backend_name(), "dispatching command");

    match cli.command {
        Command::Define(args) => run_define(args, &mut store),
        Command::Edit(args) => run_edit(&args, &mut store),
        Command::Lookup(args) => run_lookup(&args, &store),
        Command::Remove(args) => run_remove(&args, &mut store),
        Command::List(args) => run_list(&args, &store),
        Command::Stats => emit_outcome(&store, &store.stats()),
        Command::Seed(args) => run_seed(&args, &mut store),
    }
}

fn run_define(args: DefineArgs, store: &mut GlossaryStore<SelectedBackend>) -> Result<()> {
    let author = Author { display_name: args.author, id: args.author_id };
    let outcome = store.define(&args.term, &args.definition, author)?;
    emit_outcome(store, &outcome)
}

fn run_edit(args: &EditArgs, store: &mut GlossaryStore<SelectedBackend>) -> Result<()> {
    let outcome = store.edit(&args.term, &args.definition)?;
    emit_outcome(store, &outcome)
}

fn run_lookup(args: &LookupArgs, store: &GlossaryStore<SelectedBackend>) -> Result<()> {
    let outcome = store.lookup(&args.term)?;
    emit_outcome(store, &outcome)
}

fn run_remove(args: &RemoveArgs, store: &mut GlossaryStore<SelectedBackend>) -> Result<()> {
    let outcome = store.remove(&args.term, &args.requester_id, args.admin)?;
    let preview = match &outcome {
        RemoveOutcome::Removed { entry, .. } => Some(entry.preview(REMOVED_PREVIEW_CHARS)),
        RemoveOutcome::NotFound { .. } | RemoveOutcome::PermissionDenied { .. } => None,
    };
    emit_json(serde_json::json!({
        "backend": store.backend_name(),
        "degraded": store.is_degraded(),
        "outcome": serde_json::to_value(&outcome)?,
        "definition_preview": preview,
    }))
}

fn run_list(args: &ListArgs, store: &GlossaryStore<SelectedBackend>) -> Result<()> {
    let outcome = match args.page_size {
        Some(page_size) => store.list_with_page_size(args.page, usize::from(page_size)),
        None => store.list(args.page),
    };
    emit_outcome(store, &outcome)
}

fn run_seed(args: &SeedArgs, store: &mut GlossaryStore<SelectedBackend>) -> Result<()> {
    let items = match &args.corpus {
        Some(path) => load_corpus_file(path)?,
        None => reference_corpus(),
    };
    let result = store.bulk_seed(items)?;
    emit_outcome(store, &result)
}
