use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use anyhow::{anyhow, Result};
use glossary_core::timestamp::{format_rfc3339, parse_timestamp};
use glossary_core::{Backend, BackendError, Change, Entry, Glossary, Term};
use rusqlite::{params, Connection, ErrorCode};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

const CREATE_GLOSSARY_SQL: &str = r"
CREATE TABLE IF NOT EXISTS glossario (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  termo TEXT NOT NULL UNIQUE,
  definicao TEXT NOT NULL,
  autor TEXT NOT NULL,
  autor_id TEXT,
  data_criacao TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now')),
  data_edicao TEXT
);
";

const UPSERT_SQL: &str = r"
INSERT INTO glossario(termo, definicao, autor, autor_id, data_criacao, data_edicao)
VALUES (?1, ?2, ?3, ?4, ?5, ?6)
ON CONFLICT(termo) DO UPDATE SET
  definicao = excluded.definicao,
  autor = excluded.autor,
  autor_id = excluded.autor_id,
  data_edicao = excluded.data_edicao
";

const DELETE_SQL: &str = "DELETE FROM glossario WHERE termo = ?1";

const SELECT_ALL_SQL: &str = r"
SELECT termo, definicao, autor, autor_id, data_criacao, data_edicao
FROM glossario
ORDER BY id ASC
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqliteLocation {
    Memory,
    File(PathBuf),
}

/// Table-backed glossary with a lazily opened connection.
///
/// The connection is opened on first use and dropped again when the database
/// reports it is unreachable or busy, so the next call retries from scratch.
/// It sits behind a mutex only so the backend is `Sync`; every call already
/// holds `&mut self`.
pub struct SqliteBackend {
    location: SqliteLocation,
    busy_timeout: Duration,
    conn: Mutex<Option<Connection>>,
}

struct StoredRow {
    termo: String,
    definicao: String,
    autor: String,
    autor_id: Option<String>,
    data_criacao: String,
    data_edicao: Option<String>,
}

enum RowWrite {
    Upsert {
        termo: String,
        definicao: String,
        autor: String,
        autor_id: Option<String>,
        data_criacao: String,
        data_edicao: Option<String>,
    },
    Delete {
        termo: String,
    },
}

impl SqliteBackend {
    #[must_use]
    pub fn new(location: SqliteLocation) -> Self {
        Self { location, busy_timeout: DEFAULT_BUSY_TIMEOUT, conn: Mutex::new(None) }
    }

    #[must_use]
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self::new(SqliteLocation::File(path.into()))
    }

    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(SqliteLocation::Memory)
    }

    /// Parse `sqlite://path`, `sqlite:path`, `:memory:` or a bare file path.
    ///
    /// # Errors
    /// Returns an error for blank URLs and for URLs naming another database engine.
    pub fn from_url(url: &str) -> Result<Self> {
        let trimmed = url.trim();
        if trimmed.is_empty() {
            return Err(anyhow!("database url MUST not be empty"));
        }

        let prefixed = trimmed.strip_prefix("sqlite://").or_else(|| trimmed.strip_prefix("sqlite:"));
        let rest = match prefixed {
            Some(rest) => rest,
            None if trimmed.contains("://") => {
                return Err(anyhow!(
                    "unsupported database url `{trimmed}`; expected sqlite://<path> or a file path"
                ));
            }
            None => trimmed,
        };

        if rest.is_empty() {
            return Err(anyhow!("database url `{trimmed}` has no database path"));
        }
        if rest == ":memory:" {
            return Ok(Self::in_memory());
        }
        Ok(Self::file(rest))
    }

    #[must_use]
    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    #[must_use]
    pub fn location(&self) -> &SqliteLocation {
        &self.location
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }

    fn connection(&mut self) -> Result<&mut Connection, BackendError> {
        let slot = self.conn.get_mut().unwrap_or_else(PoisonError::into_inner);
        if slot.is_none() {
            let conn = open_connection(&self.location, self.busy_timeout).map_err(|err| {
                BackendError::Unavailable(format!(
                    "failed to open sqlite database {}: {err}",
                    describe(&self.location)
                ))
            })?;
            info!(database = %describe(&self.location), "sqlite connection established");
            *slot = Some(conn);
        }
        slot.as_mut().ok_or_else(|| {
            BackendError::Unavailable("sqlite connection was not established".to_string())
        })
    }

    fn with_connection<T>(
        &mut self,
        context: &str,
        op: impl FnOnce(&mut Connection) -> rusqlite::Result<T>,
    ) -> Result<T, BackendError> {
        let conn = self.connection()?;
        match op(conn) {
            Ok(value) => Ok(value),
            Err(err) => {
                let err = classify(&err, context);
                if matches!(err, BackendError::Unavailable(_)) {
                    warn!(database = %describe(&self.location), error = %err, "dropping sqlite connection");
                    *self.conn.get_mut().unwrap_or_else(PoisonError::into_inner) = None;
                }
                Err(err)
            }
        }
    }
}

impl Backend for SqliteBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn load(&mut self) -> Result<Glossary, BackendError> {
        let rows = self.with_connection("failed to read glossary table", |conn| {
            let mut stmt = conn.prepare(SELECT_ALL_SQL)?;
            let rows = stmt.query_map([], |row| {
                Ok(StoredRow {
                    termo: row.get(0)?,
                    definicao: row.get(1)?,
                    autor: row.get(2)?,
                    autor_id: row.get(3)?,
                    data_criacao: row.get(4)?,
                    data_edicao: row.get(5)?,
                })
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })?;

        let loaded_at = OffsetDateTime::now_utc();
        let mut glossary = Glossary::with_capacity(rows.len());
        for row in rows {
            let term = match Term::parse(&row.termo) {
                Ok(term) => term,
                Err(err) => {
                    warn!(term = %row.termo, error = %err, "skipping stored term");
                    continue;
                }
            };
            let created_at = parse_timestamp(&row.data_criacao).unwrap_or_else(|| {
                warn!(term = %row.termo, value = %row.data_criacao, "unreadable data_criacao");
                loaded_at
            });
            glossary.entry(term).or_insert(Entry {
                definition: row.definicao,
                author: row.autor,
                author_id: row.autor_id.filter(|id| !id.trim().is_empty()),
                created_at,
                updated_at: row.data_edicao.as_deref().and_then(parse_timestamp),
            });
        }

        Ok(glossary)
    }

    fn persist(&mut self, glossary: &Glossary, change: &Change) -> Result<(), BackendError> {
        let writes = change
            .terms()
            .iter()
            .map(|term| match glossary.get(term) {
                Some(entry) => Ok(RowWrite::Upsert {
                    termo: term.to_string(),
                    definicao: entry.definition.clone(),
                    autor: entry.author.clone(),
                    autor_id: entry.author_id.clone(),
                    data_criacao: format_rfc3339(entry.created_at)?,
                    data_edicao: entry.updated_at.map(format_rfc3339).transpose()?,
                }),
                None => Ok(RowWrite::Delete { termo: term.to_string() }),
            })
            .collect::<Result<Vec<_>, BackendError>>()?;

        self.with_connection("failed to persist glossary change", |conn| {
            let tx = conn.transaction()?;
            for write in &writes {
                match write {
                    RowWrite::Upsert { termo, definicao, autor, autor_id, data_criacao, data_edicao } => {
                        tx.execute(
                            UPSERT_SQL,
                            params![termo, definicao, autor, autor_id, data_criacao, data_edicao],
                        )?;
                    }
                    RowWrite::Delete { termo } => {
                        tx.execute(DELETE_SQL, params![termo])?;
                    }
                }
            }
            tx.commit()
        })?;

        debug!(?change, rows = writes.len(), "glossary rows written");
        Ok(())
    }
}

fn open_connection(location: &SqliteLocation, busy_timeout: Duration) -> rusqlite::Result<Connection> {
    let conn = match location {
        SqliteLocation::Memory => Connection::open_in_memory()?,
        SqliteLocation::File(path) => Connection::open(path)?,
    };
    conn.busy_timeout(busy_timeout)?;
    conn.execute_batch("PRAGMA journal_mode = WAL;")?;
    conn.execute_batch(CREATE_GLOSSARY_SQL)?;
    Ok(conn)
}

/// Busy, locked or unopenable databases are treated as unreachable; anything
/// else is a failed write.
fn classify(err: &rusqlite::Error, context: &str) -> BackendError {
    let message = format!("{context}: {err}");
    match err.sqlite_error_code() {
        Some(
            ErrorCode::DatabaseBusy
            | ErrorCode::DatabaseLocked
            | ErrorCode::CannotOpen
            | ErrorCode::NotADatabase,
        ) => BackendError::Unavailable(message),
        _ => BackendError::Write(message),
    }
}

fn describe(location: &SqliteLocation) -> String {
    match location {
        SqliteLocation::Memory => ":memory:".to_string(),
        SqliteLocation::File(path) => display_path(path),
    }
}

fn display_path(path: &Path) -> String {
    path.display().to_string()
}
