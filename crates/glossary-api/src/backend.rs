use glossary_core::{Backend, BackendError, Change, Glossary, VolatileBackend};
use glossary_store_json::JsonFileBackend;
use glossary_store_sqlite::SqliteBackend;

use crate::config::BackendConfig;

/// The backend chosen at startup; fixed for the lifetime of the store.
pub enum SelectedBackend {
    Memory(VolatileBackend),
    Json(JsonFileBackend),
    Sqlite(SqliteBackend),
}

impl SelectedBackend {
    #[must_use]
    pub fn from_config(config: &BackendConfig) -> Self {
        match config {
            BackendConfig::Memory => Self::Memory(VolatileBackend),
            BackendConfig::JsonFile { path } => Self::Json(JsonFileBackend::new(path.clone())),
            BackendConfig::Sqlite { location, busy_timeout } => Self::Sqlite(
                SqliteBackend::new(location.clone()).with_busy_timeout(*busy_timeout),
            ),
        }
    }
}

impl Backend for SelectedBackend {
    fn name(&self) -> &'static str {
        match self {
            Self::Memory(backend) => backend.name(),
            Self::Json(backend) => backend.name(),
            Self::Sqlite(backend) => backend.name(),
        }
    }

    fn load(&mut self) -> Result<Glossary, BackendError> {
        match self {
            Self::Memory(backend) => backend.load(),
            Self::Json(backend) => backend.load(),
            Self::Sqlite(backend) => backend.load(),
        }
    }

    fn persist(&mut self, glossary: &Glossary, change: &Change) -> Result<(), BackendError> {
        match self {
            Self::Memory(backend) => backend.persist(glossary, change),
            Self::Json(backend) => backend.persist(glossary, change),
            Self::Sqlite(backend) => backend.persist(glossary, change),
        }
    }
}
