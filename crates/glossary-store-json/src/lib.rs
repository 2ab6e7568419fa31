use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use glossary_core::timestamp::{format_rfc3339, parse_timestamp};
use glossary_core::{Backend, BackendError, Change, Entry, Glossary, Term};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

/// Author recorded for entries read from the bare `{term: definition}` shape.
pub const LEGACY_AUTHOR: &str = "Desconhecido";

/// Rich on-disk shape. Older files carry only some of these fields.
#[derive(Debug, Deserialize)]
struct StoredEntry {
    definicao: String,
    #[serde(default)]
    autor: Option<String>,
    #[serde(default)]
    autor_id: Option<String>,
    #[serde(default)]
    data: Option<String>,
    #[serde(default)]
    data_edicao: Option<String>,
}

#[derive(Debug, Serialize)]
struct StoredEntryRef<'a> {
    definicao: &'a str,
    autor: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    autor_id: Option<&'a str>,
    data: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data_edicao: Option<String>,
}

/// Whole-document JSON file, rewritten on every change.
#[derive(Debug, Clone)]
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn malformed_copy_path(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".malformed");
        PathBuf::from(name)
    }
}

impl Backend for JsonFileBackend {
    fn name(&self) -> &'static str {
        "json"
    }

    fn load(&mut self) -> Result<Glossary, BackendError> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                info!(path = %self.path.display(), "glossary file not found; starting empty");
                return Ok(Glossary::new());
            }
            Err(err) => {
                return Err(BackendError::Unavailable(format!(
                    "failed to read glossary file {}: {err}",
                    self.path.display()
                )));
            }
        };

        let document: IndexMap<String, Value> = match serde_json::from_slice(&bytes) {
            Ok(document) => document,
            Err(err) => {
                let copy = self.malformed_copy_path();
                warn!(
                    path = %self.path.display(),
                    error = %err,
                    copy = %copy.display(),
                    "glossary file is malformed; starting empty"
                );
                if let Err(err) = fs::write(&copy, &bytes) {
                    warn!(copy = %copy.display(), error = %err, "failed to keep malformed glossary copy");
                }
                return Ok(Glossary::new());
            }
        };

        let loaded_at = OffsetDateTime::now_utc();
        let mut glossary = Glossary::with_capacity(document.len());
        for (raw_term, value) in document {
            let term = match Term::parse(&raw_term) {
                Ok(term) => term,
                Err(err) => {
                    warn!(term = %raw_term, error = %err, "skipping stored term");
                    continue;
                }
            };
            if glossary.contains_key(&term) {
                warn!(term = %raw_term, "stored term collides after normalization; keeping first");
                continue;
            }
            match decode_entry(value, loaded_at) {
                Ok(entry) => {
                    glossary.insert(term, entry);
                }
                Err(reason) => warn!(term = %raw_term, %reason, "skipping stored entry"),
            }
        }

        Ok(glossary)
    }

    fn persist(&mut self, glossary: &Glossary, change: &Change) -> Result<(), BackendError> {
        let mut document = IndexMap::with_capacity(glossary.len());
        for (term, entry) in glossary {
            document.insert(term.as_str(), encode_entry(entry)?);
        }

        let bytes = to_pretty_json(&document)
            .map_err(|err| BackendError::Write(format!("failed to serialize glossary: {err}")))?;
        write_atomically(&self.path, &bytes).map_err(|err| {
            BackendError::Write(format!(
                "failed to write glossary file {}: {err}",
                self.path.display()
            ))
        })?;

        debug!(path = %self.path.display(), ?change, terms = glossary.len(), "glossary file written");
        Ok(())
    }
}

fn decode_entry(value: Value, loaded_at: OffsetDateTime) -> Result<Entry, String> {
    match value {
        Value::String(definition) => Ok(Entry {
            definition,
            author: LEGACY_AUTHOR.to_string(),
            author_id: None,
            created_at: loaded_at,
            updated_at: None,
        }),
        value @ Value::Object(_) => {
            let stored: StoredEntry = serde_json::from_value(value).map_err(|err| err.to_string())?;
            Ok(Entry {
                definition: stored.definicao,
                author: stored
                    .autor
                    .filter(|autor| !autor.trim().is_empty())
                    .unwrap_or_else(|| LEGACY_AUTHOR.to_string()),
                author_id: stored.autor_id.filter(|id| !id.trim().is_empty()),
                created_at: stored.data.as_deref().and_then(parse_timestamp).unwrap_or(loaded_at),
                updated_at: stored.data_edicao.as_deref().and_then(parse_timestamp),
            })
        }
        other => Err(format!("expected a string or an object, got {other}")),
    }
}

fn encode_entry(entry: &Entry) -> Result<StoredEntryRef<'_>, BackendError> {
    Ok(StoredEntryRef {
        definicao: &entry.definition,
        autor: &entry.author,
        autor_id: entry.author_id.as_deref(),
        data: format_rfc3339(entry.created_at)?,
        data_edicao: entry.updated_at.map(format_rfc3339).transpose()?,
    })
}

fn to_pretty_json<T: Serialize>(value: &T) -> serde_json::Result<Vec<u8>> {
    let mut bytes = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut bytes, formatter);
    value.serialize(&mut serializer)?;
    bytes.push(b'\n');
    Ok(bytes)
}

fn write_atomically(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    file.persist(path).map_err(|err| err.error)?;
    Ok(())
}
