//! Wiring between configuration, storage backends and the glossary store.
//!
//! Front ends call [`open_store`] (single owner) or [`open_shared`] (many
//! threads) with a [`GlossaryConfig`] and then dispatch commands against the
//! returned store.

mod backend;
pub mod config;
pub mod seed;
mod shared;

pub use backend::SelectedBackend;
pub use config::{BackendConfig, BackendKind, GlossaryConfig};
pub use glossary_core::{
    Author, DefineOutcome, EditOutcome, Entry, GlossaryError, GlossaryStore, ListOutcome,
    LookupOutcome, Page, RemoveOutcome, SeedItem, SeedResult, Stats, StoreConfig, Term,
};
pub use shared::SharedGlossary;

use tracing::info;

/// Open the configured backend and load the glossary from it.
///
/// A backend that cannot be read does not fail startup; the store starts
/// empty and degraded instead (see [`GlossaryStore::is_degraded`]).
#[must_use]
pub fn open_store(config: &GlossaryConfig) -> GlossaryStore<SelectedBackend> {
    let backend = SelectedBackend::from_config(&config.backend);
    let store = GlossaryStore::open(backend, config.store);
    info!(
        backend = config.backend.kind().as_str(),
        terms = store.len(),
        degraded = store.is_degraded(),
        "glossary store opened"
    );
    store
}

#[must_use]
pub fn open_shared(config: &GlossaryConfig) -> SharedGlossary<SelectedBackend> {
    SharedGlossary::new(open_store(config))
}
