use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use glossary_core::{
    Author, Backend, DefineOutcome, EditOutcome, GlossaryError, GlossaryStore, ListOutcome,
    LookupOutcome, RemoveOutcome, SeedItem, SeedResult, Stats,
};

/// Cloneable handle for callers that dispatch commands from several threads.
///
/// Mutations hold the write lock for the whole in-memory change plus persist,
/// so readers never observe a half-applied mutation. Reads share the lock.
pub struct SharedGlossary<B> {
    inner: Arc<RwLock<GlossaryStore<B>>>,
}

impl<B> Clone for SharedGlossary<B> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<B: Backend> SharedGlossary<B> {
    #[must_use]
    pub fn new(store: GlossaryStore<B>) -> Self {
        Self { inner: Arc::new(RwLock::new(store)) }
    }

    // A panic inside a store call cannot leave the map half-written, so a
    // poisoned lock is still safe to use.
    fn read(&self) -> RwLockReadGuard<'_, GlossaryStore<B>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, GlossaryStore<B>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// # Errors
    /// See [`GlossaryStore::define`].
    pub fn define(
        &self,
        term: &str,
        definition: &str,
        author: Author,
    ) -> Result<DefineOutcome, GlossaryError> {
        self.write().define(term, definition, author)
    }

    /// # Errors
    /// See [`GlossaryStore::edit`].
    pub fn edit(&self, term: &str, definition: &str) -> Result<EditOutcome, GlossaryError> {
        self.write().edit(term, definition)
    }

    /// # Errors
    /// See [`GlossaryStore::remove`].
    pub fn remove(
        &self,
        term: &str,
        requester_id: &str,
        requester_is_admin: bool,
    ) -> Result<RemoveOutcome, GlossaryError> {
        self.write().remove(term, requester_id, requester_is_admin)
    }

    /// # Errors
    /// See [`GlossaryStore::bulk_seed`].
    pub fn bulk_seed<I>(&self, items: I) -> Result<SeedResult, GlossaryError>
    where
        I: IntoIterator<Item = SeedItem>,
    {
        self.write().bulk_seed(items)
    }

    /// # Errors
    /// See [`GlossaryStore::flush`].
    pub fn flush(&self) -> Result<usize, GlossaryError> {
        self.write().flush()
    }

    /// # Errors
    /// See [`GlossaryStore::lookup`].
    pub fn lookup(&self, term: &str) -> Result<LookupOutcome, GlossaryError> {
        self.read().lookup(term)
    }

    #[must_use]
    pub fn list(&self, page: usize) -> ListOutcome {
        self.read().list(page)
    }

    #[must_use]
    pub fn list_with_page_size(&self, page: usize, page_size: usize) -> ListOutcome {
        self.read().list_with_page_size(page, page_size)
    }

    #[must_use]
    pub fn stats(&self) -> Stats {
        self.read().stats()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.read().is_degraded()
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.read().pending_count()
    }

    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.read().backend_name()
    }
}
