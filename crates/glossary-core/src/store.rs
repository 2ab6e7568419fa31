use std::collections::BTreeMap;

use indexmap::IndexSet;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::backend::{Backend, BackendError, Change};
use crate::{
    validate_definition, Author, AuthorCount, DefineOutcome, DuplicatePolicy, EditOutcome, Entry,
    Glossary, GlossaryError, ListOrder, ListOutcome, LookupOutcome, Page, RemoveOutcome, SeedItem,
    SeedResult, Stats, StoreConfig, Term, MOST_RECENT_LIMIT,
};

/// Owns the in-memory glossary and keeps its backend in step with it.
///
/// Every mutation is applied to memory first and then handed to the backend.
/// When the backend fails the change stays in memory and the caller gets a
/// storage error. The affected terms are remembered and written again with the
/// next persist, so memory and medium diverge only until a persist succeeds.
pub struct GlossaryStore<B> {
    backend: B,
    config: StoreConfig,
    glossary: Glossary,
    degraded: bool,
    /// Terms whose latest in-memory state has not reached the medium yet.
    pending: IndexSet<Term>,
}

impl<B: Backend> GlossaryStore<B> {
    /// Load the glossary from `backend`.
    ///
    /// An unreachable medium never aborts startup: the store begins empty and
    /// retries the backend on the next mutation.
    pub fn open(mut backend: B, config: StoreConfig) -> Self {
        let (glossary, degraded) = match backend.load() {
            Ok(glossary) => {
                info!(backend = backend.name(), terms = glossary.len(), "glossary loaded");
                (glossary, false)
            }
            Err(err) => {
                warn!(
                    backend = backend.name(),
                    error = %err,
                    "glossary storage unavailable at startup; starting empty"
                );
                (Glossary::new(), true)
            }
        };
        Self { backend, config, glossary, degraded, pending: IndexSet::new() }
    }

    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// True while the backend has not been readable since startup.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Number of terms changed in memory that still have to be written.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Write every pending term without making a new change.
    ///
    /// # Errors
    /// Returns a storage error when the medium is still unreachable or the write
    /// fails; the terms stay pending.
    pub fn flush(&mut self) -> Result<usize, GlossaryError> {
        self.reconcile();
        if self.pending.is_empty() {
            return Ok(0);
        }
        let flushed = self.pending.len();
        self.persist(Change::Batch(self.pending.iter().cloned().collect()))?;
        Ok(flushed)
    }

    #[must_use]
    pub fn glossary(&self) -> &Glossary {
        &self.glossary
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.glossary.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.glossary.is_empty()
    }

    #[must_use]
    pub fn contains(&self, term: &str) -> bool {
        Term::parse(term).is_ok_and(|term| self.glossary.contains_key(&term))
    }

    /// Create a term, or handle an existing one per [`DuplicatePolicy`].
    ///
    /// # Errors
    /// Returns [`GlossaryError::Validation`] before any mutation when the term or
    /// definition is out of bounds, and a storage error when the change could not
    /// be persisted (the change is kept in memory).
    pub fn define(
        &mut self,
        term: &str,
        definition: &str,
        author: Author,
    ) -> Result<DefineOutcome, GlossaryError> {
        let term = Term::parse(term)?;
        let definition = validate_definition(definition)?;
        self.reconcile();
        let now = OffsetDateTime::now_utc();

        if let Some(existing) = self.glossary.get_mut(&term) {
            if self.config.duplicate_policy == DuplicatePolicy::Reject {
                return Ok(DefineOutcome::AlreadyExists { term, existing: existing.clone() });
            }

            let previous = existing.clone();
            existing.definition = definition;
            existing.author = author.display_name;
            existing.author_id = author.id;
            existing.updated_at = Some(now);
            let entry = existing.clone();

            self.persist(Change::Upsert(term.clone()))?;
            return Ok(DefineOutcome::Updated { term, previous, entry });
        }

        let entry = Entry::new(definition, author, now);
        self.glossary.insert(term.clone(), entry.clone());
        self.persist(Change::Upsert(term.clone()))?;
        Ok(DefineOutcome::Created { term, entry })
    }

    /// Replace the definition of an existing term, keeping its author.
    ///
    /// # Errors
    /// Same as [`GlossaryStore::define`].
    pub fn edit(&mut self, term: &str, definition: &str) -> Result<EditOutcome, GlossaryError> {
        let term = Term::parse(term)?;
        let definition = validate_definition(definition)?;
        self.reconcile();

        let Some(existing) = self.glossary.get_mut(&term) else {
            return Ok(EditOutcome::NotFound { term });
        };
        let previous = existing.clone();
        existing.definition = definition;
        existing.updated_at = Some(OffsetDateTime::now_utc());
        let entry = existing.clone();

        self.persist(Change::Upsert(term.clone()))?;
        Ok(EditOutcome::Edited { term, previous, entry })
    }

    /// # Errors
    /// Returns [`GlossaryError::Validation`] when `term` does not normalize.
    pub fn lookup(&self, term: &str) -> Result<LookupOutcome, GlossaryError> {
        let term = Term::parse(term)?;
        Ok(match self.glossary.get(&term) {
            Some(entry) => LookupOutcome::Found { entry: entry.clone(), term },
            None => LookupOutcome::NotFound { term },
        })
    }

    /// Delete a term when [`crate::RemovalPolicy`] allows the requester to.
    ///
    /// # Errors
    /// Returns [`GlossaryError::Validation`] when `term` does not normalize, and a
    /// storage error when the deletion could not be persisted.
    pub fn remove(
        &mut self,
        term: &str,
        requester_id: &str,
        requester_is_admin: bool,
    ) -> Result<RemoveOutcome, GlossaryError> {
        let term = Term::parse(term)?;
        self.reconcile();
        let Some(entry) = self.glossary.get(&term) else {
            return Ok(RemoveOutcome::NotFound { term });
        };

        if !self.config.removal_policy.permits(entry, requester_id, requester_is_admin) {
            debug!(term = %term, requester_id, "removal denied");
            return Ok(RemoveOutcome::PermissionDenied { owner: entry.author.clone(), term });
        }

        let Some(entry) = self.glossary.shift_remove(&term) else {
            return Ok(RemoveOutcome::NotFound { term });
        };
        self.persist(Change::Remove(term.clone()))?;
        Ok(RemoveOutcome::Removed { term, entry })
    }

    /// Page through terms using the configured page size.
    #[must_use]
    pub fn list(&self, page: usize) -> ListOutcome {
        self.list_with_page_size(page, self.config.page_size)
    }

    /// Out-of-range pages are clamped into `[1, total_pages]`.
    #[must_use]
    pub fn list_with_page_size(&self, page: usize, page_size: usize) -> ListOutcome {
        if self.glossary.is_empty() {
            return ListOutcome::Empty;
        }

        let page_size = page_size.max(1);
        let mut terms = self.glossary.keys().collect::<Vec<_>>();
        if self.config.list_order == ListOrder::Alphabetical {
            terms.sort();
        }

        let total_count = terms.len();
        let total_pages = total_count.div_ceil(page_size);
        let page_number = page.clamp(1, total_pages);
        let items = terms
            .into_iter()
            .skip((page_number - 1) * page_size)
            .take(page_size)
            .cloned()
            .collect();

        ListOutcome::Page(Page { items, page_number, total_pages, total_count, page_size })
    }

    #[must_use]
    pub fn stats(&self) -> Stats {
        let mut by_author: BTreeMap<&str, usize> = BTreeMap::new();
        for entry in self.glossary.values() {
            *by_author.entry(entry.author.as_str()).or_default() += 1;
        }

        let mut authors = by_author
            .into_iter()
            .map(|(author, count)| AuthorCount { author: author.to_string(), count })
            .collect::<Vec<_>>();
        // BTreeMap iteration already orders names; a stable sort keeps that for ties.
        authors.sort_by(|left, right| right.count.cmp(&left.count));

        Stats {
            total_count: self.glossary.len(),
            authors,
            most_recent: self.glossary.keys().rev().take(MOST_RECENT_LIMIT).cloned().collect(),
        }
    }

    /// Insert a reference corpus, skipping terms that already exist.
    ///
    /// Items that fail validation are skipped and logged. The backend is written
    /// once for the whole batch, and not at all when nothing was added.
    ///
    /// # Errors
    /// Returns a storage error when the batch could not be persisted.
    pub fn bulk_seed<I>(&mut self, items: I) -> Result<SeedResult, GlossaryError>
    where
        I: IntoIterator<Item = SeedItem>,
    {
        self.reconcile();
        let now = OffsetDateTime::now_utc();
        let mut skipped_count = 0_usize;
        let mut added = Vec::new();

        for item in items {
            let parsed = Term::parse(&item.term)
                .and_then(|term| validate_definition(&item.definition).map(|def| (term, def)));
            let (term, definition) = match parsed {
                Ok(parsed) => parsed,
                Err(err) => {
                    warn!(term = %item.term, error = %err, "skipping invalid seed item");
                    skipped_count += 1;
                    continue;
                }
            };

            if self.glossary.contains_key(&term) {
                skipped_count += 1;
                continue;
            }

            self.glossary.insert(term.clone(), Entry::new(definition, Author::system(), now));
            added.push(term);
        }

        let result = SeedResult { added_count: added.len(), skipped_count };
        if !added.is_empty() {
            self.persist(Change::Batch(added))?;
        }
        info!(
            backend = self.backend.name(),
            added = result.added_count,
            skipped = result.skipped_count,
            "bulk seed finished"
        );
        Ok(result)
    }

    fn persist(&mut self, change: Change) -> Result<(), GlossaryError> {
        let backend = self.backend.name();
        self.pending.extend(change.terms().iter().cloned());

        if self.degraded {
            warn!(
                backend,
                pending = self.pending.len(),
                "glossary storage still unreadable; change kept in memory only"
            );
            return Err(GlossaryError::StorageUnavailable {
                backend,
                reason: "storage has not been readable since startup".to_string(),
            });
        }

        // Earlier failures are retried together with this change.
        let change = if self.pending.len() > change.terms().len() {
            Change::Batch(self.pending.iter().cloned().collect())
        } else {
            change
        };

        match self.backend.persist(&self.glossary, &change) {
            Ok(()) => {
                debug!(backend, ?change, "glossary persisted");
                self.pending.clear();
                Ok(())
            }
            Err(BackendError::Unavailable(reason)) => {
                warn!(
                    backend,
                    %reason,
                    pending = self.pending.len(),
                    "glossary storage unavailable; change kept in memory only"
                );
                Err(GlossaryError::StorageUnavailable { backend, reason })
            }
            Err(BackendError::Write(reason)) => {
                warn!(
                    backend,
                    %reason,
                    pending = self.pending.len(),
                    "glossary persist failed; memory and storage diverge until the next successful write"
                );
                Err(GlossaryError::StorageWrite { backend, reason })
            }
        }
    }

    /// After a degraded start, reload the medium before a mutation looks at the
    /// glossary, so duplicate and ownership checks see the stored entries.
    ///
    /// Stored entries win, except for terms changed in memory while the medium
    /// was unreadable; those keep their in-memory state (including removal)
    /// and stay pending.
    fn reconcile(&mut self) {
        if !self.degraded {
            return;
        }
        let backend = self.backend.name();
        let stored = match self.backend.load() {
            Ok(stored) => stored,
            Err(err) => {
                warn!(backend, error = %err, "glossary storage still unavailable");
                return;
            }
        };

        let mut merged = Glossary::with_capacity(stored.len() + self.glossary.len());
        for (term, entry) in stored {
            if self.pending.contains(&term) {
                if let Some(local) = self.glossary.get(&term) {
                    merged.insert(term, local.clone());
                }
            } else {
                merged.insert(term, entry);
            }
        }
        for (term, entry) in &self.glossary {
            if !merged.contains_key(term) {
                self.pending.insert(term.clone());
                merged.insert(term.clone(), entry.clone());
            }
        }

        self.glossary = merged;
        self.degraded = false;
        info!(
            backend,
            terms = self.glossary.len(),
            pending = self.pending.len(),
            "glossary storage recovered"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::{RemovalPolicy, SYSTEM_AUTHOR};

    /// Backend double whose availability and write outcome can be flipped mid-test.
    #[derive(Clone, Default)]
    struct ScriptedBackend {
        state: Arc<Mutex<ScriptedState>>,
    }

    #[derive(Default)]
    struct ScriptedState {
        stored: Glossary,
        unavailable: bool,
        fail_writes: bool,
        persist_calls: usize,
        changes: Vec<Change>,
    }

    impl ScriptedBackend {
        fn with<R>(&self, f: impl FnOnce(&mut ScriptedState) -> R) -> R {
            let mut guard = match self.state.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            f(&mut guard)
        }
    }

    impl Backend for ScriptedBackend {
        fn name(&self) -> &'static str {
            "scripted"
        }

        fn load(&mut self) -> Result<Glossary, BackendError> {
            self.with(|state| {
                if state.unavailable {
                    return Err(BackendError::Unavailable("medium offline".to_string()));
                }
                Ok(state.stored.clone())
            })
        }

        fn persist(&mut self, glossary: &Glossary, change: &Change) -> Result<(), BackendError> {
            self.with(|state| {
                state.persist_calls += 1;
                state.changes.push(change.clone());
                if state.unavailable {
                    return Err(BackendError::Unavailable("medium offline".to_string()));
                }
                if state.fail_writes {
                    return Err(BackendError::Write("disk full".to_string()));
                }
                state.stored = glossary.clone();
                Ok(())
            })
        }
    }

    fn store_with(config: StoreConfig) -> (GlossaryStore<ScriptedBackend>, ScriptedBackend) {
        let backend = ScriptedBackend::default();
        (GlossaryStore::open(backend.clone(), config), backend)
    }

    fn author(name: &str, id: &str) -> Author {
        Author::new(name, id)
    }

    fn page_of(outcome: ListOutcome) -> Page {
        match outcome {
            ListOutcome::Page(page) => page,
            ListOutcome::Empty => panic!("expected a page, got Empty"),
        }
    }

    fn fixture_corpus() -> Vec<SeedItem> {
        vec![
            SeedItem::new("Ética", "estudo da conduta"),
            SeedItem::new("Lógica", "estudo do raciocínio válido"),
            SeedItem::new("Metafísica", "estudo do ser enquanto ser"),
        ]
    }

    #[test]
    fn define_then_lookup_with_different_case_returns_same_entry() -> Result<(), GlossaryError> {
        let (mut store, _) = store_with(StoreConfig::default());

        let outcome = store.define("Filosofia", "estudo da existência", author("A", "a-1"))?;
        let DefineOutcome::Created { term, entry } = outcome else {
            panic!("expected Created, got {outcome:?}");
        };
        assert_eq!(term.as_str(), "filosofia");

        match store.lookup("  FILOSOFIA ")? {
            LookupOutcome::Found { entry: found, .. } => {
                assert_eq!(found, entry);
                assert_eq!(found.definition, "estudo da existência");
            }
            other @ LookupOutcome::NotFound { .. } => panic!("expected Found, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn lookup_miss_carries_normalized_term() -> Result<(), GlossaryError> {
        let (store, _) = store_with(StoreConfig::default());
        let outcome = store.lookup(" Conatus ")?;
        let LookupOutcome::NotFound { term } = outcome else {
            panic!("expected NotFound, got {outcome:?}");
        };
        assert_eq!(term.as_str(), "conatus");
        Ok(())
    }

    #[test]
    fn define_duplicate_is_rejected_by_default() -> Result<(), GlossaryError> {
        let (mut store, backend) = store_with(StoreConfig::default());
        store.define("conatus", "esforço de perseverar", author("A", "a-1"))?;

        let outcome = store.define("Conatus", "outra coisa", author("B", "b-1"))?;
        let DefineOutcome::AlreadyExists { existing, .. } = outcome else {
            panic!("expected AlreadyExists, got {outcome:?}");
        };
        assert_eq!(existing.definition, "esforço de perseverar");
        assert_eq!(backend.with(|state| state.persist_calls), 1);
        Ok(())
    }

    #[test]
    fn define_duplicate_overwrites_and_preserves_created_at() -> Result<(), GlossaryError> {
        let config =
            StoreConfig { duplicate_policy: DuplicatePolicy::Overwrite, ..StoreConfig::default() };
        let (mut store, _) = store_with(config);
        let DefineOutcome::Created { entry: original, .. } =
            store.define("conatus", "esforço de perseverar", author("A", "a-1"))?
        else {
            panic!("expected Created");
        };

        let outcome = store.define("CONATUS", "tendência a perseverar no ser", author("B", "b-1"))?;
        let DefineOutcome::Updated { previous, entry, .. } = outcome else {
            panic!("expected Updated, got {outcome:?}");
        };
        assert_eq!(previous, original);
        assert_eq!(entry.definition, "tendência a perseverar no ser");
        assert_eq!(entry.author, "B");
        assert_eq!(entry.author_id.as_deref(), Some("b-1"));
        assert_eq!(entry.created_at, original.created_at);
        assert!(entry.updated_at.is_some());
        assert_eq!(store.len(), 1);
        Ok(())
    }

    #[test]
    fn oversized_definition_is_rejected_without_mutation() {
        let (mut store, backend) = store_with(StoreConfig::default());
        let result = store.define("termo", &"x".repeat(1001), author("A", "a-1"));

        assert!(matches!(result, Err(GlossaryError::Validation(_))));
        assert!(store.is_empty());
        assert_eq!(backend.with(|state| state.persist_calls), 0);
    }

    #[test]
    fn oversized_definition_does_not_touch_existing_entry_on_overwrite() -> Result<(), GlossaryError>
    {
        let config =
            StoreConfig { duplicate_policy: DuplicatePolicy::Overwrite, ..StoreConfig::default() };
        let (mut store, _) = store_with(config);
        store.define("termo", "original", author("A", "a-1"))?;

        let result = store.define("termo", &"x".repeat(1001), author("B", "b-1"));
        assert!(matches!(result, Err(GlossaryError::Validation(_))));

        let LookupOutcome::Found { entry, .. } = store.lookup("termo")? else {
            panic!("expected entry to survive");
        };
        assert_eq!(entry.definition, "original");
        assert_eq!(entry.author, "A");
        Ok(())
    }

    #[test]
    fn define_remove_lookup_round_trip() -> Result<(), GlossaryError> {
        let (mut store, backend) = store_with(StoreConfig::default());
        store.define("Dasein", "ser-aí", author("A", "a-1"))?;

        let outcome = store.remove("dasein", "a-1", false)?;
        let RemoveOutcome::Removed { entry, .. } = outcome else {
            panic!("expected Removed, got {outcome:?}");
        };
        assert_eq!(entry.definition, "ser-aí");
        assert!(matches!(store.lookup("DASEIN")?, LookupOutcome::NotFound { .. }));
        assert!(backend.with(|state| state.stored.is_empty()));
        Ok(())
    }

    #[test]
    fn remove_requires_author_or_admin() -> Result<(), GlossaryError> {
        let (mut store, _) = store_with(StoreConfig::default());
        store.define("conatus", "esforço de perseverar", author("Spinoza", "user123"))?;

        let denied = store.remove("conatus", "user456", false)?;
        assert_eq!(
            denied,
            RemoveOutcome::PermissionDenied {
                term: Term::parse("conatus")?,
                owner: "Spinoza".to_string()
            }
        );
        assert!(store.contains("conatus"));

        let removed = store.remove("conatus", "user456", true)?;
        assert!(matches!(removed, RemoveOutcome::Removed { .. }));
        assert!(!store.contains("conatus"));
        Ok(())
    }

    #[test]
    fn seeded_entries_need_admin_under_default_policy() -> Result<(), GlossaryError> {
        let (mut store, _) = store_with(StoreConfig::default());
        store.bulk_seed(fixture_corpus())?;

        assert!(matches!(store.remove("ética", "user1", false)?, RemoveOutcome::PermissionDenied { .. }));

        let config = StoreConfig {
            removal_policy: RemovalPolicy::AuthorAdminOrUnowned,
            ..StoreConfig::default()
        };
        let (mut lenient, _) = store_with(config);
        lenient.bulk_seed(fixture_corpus())?;
        assert!(matches!(lenient.remove("ética", "user1", false)?, RemoveOutcome::Removed { .. }));
        Ok(())
    }

    #[test]
    fn remove_missing_term_is_not_found() -> Result<(), GlossaryError> {
        let (mut store, backend) = store_with(StoreConfig::default());
        assert!(matches!(store.remove("nada", "u", true)?, RemoveOutcome::NotFound { .. }));
        assert_eq!(backend.with(|state| state.persist_calls), 0);
        Ok(())
    }

    #[test]
    fn edit_replaces_definition_but_keeps_author_and_creation_time() -> Result<(), GlossaryError> {
        let (mut store, _) = store_with(StoreConfig::default());
        let DefineOutcome::Created { entry: original, .. } =
            store.define("telos", "finalidade", author("A", "a-1"))?
        else {
            panic!("expected Created");
        };

        let outcome = store.edit("Telos", "causa final")?;
        let EditOutcome::Edited { previous, entry, .. } = outcome else {
            panic!("expected Edited, got {outcome:?}");
        };
        assert_eq!(previous.definition, "finalidade");
        assert_eq!(entry.definition, "causa final");
        assert_eq!(entry.author, original.author);
        assert_eq!(entry.created_at, original.created_at);
        assert!(entry.updated_at.is_some());

        assert!(matches!(store.edit("ausente", "x")?, EditOutcome::NotFound { .. }));
        Ok(())
    }

    #[test]
    fn list_on_empty_store_is_distinguished() {
        let (store, _) = store_with(StoreConfig::default());
        assert_eq!(store.list(1), ListOutcome::Empty);
    }

    #[test]
    fn list_sorts_alphabetically_and_clamps_pages() -> Result<(), GlossaryError> {
        let (mut store, _) = store_with(StoreConfig::default());
        for index in (0..23).rev() {
            store.define(&format!("termo{index:02}"), "definição", author("A", "a-1"))?;
        }

        let first = page_of(store.list(0));
        assert_eq!(first.page_number, 1);
        assert_eq!(first.total_pages, 3);
        assert_eq!(first.total_count, 23);
        assert_eq!(first.items.len(), 10);
        assert_eq!(first.items[0].as_str(), "termo00");

        let last = page_of(store.list(999));
        assert_eq!(last.page_number, 3);
        assert_eq!(last.items.len(), 3);
        assert_eq!(last.items[2].as_str(), "termo22");

        let wide = page_of(store.list_with_page_size(2, 15));
        assert_eq!(wide.total_pages, 2);
        assert_eq!(wide.items.len(), 8);
        Ok(())
    }

    #[test]
    fn list_can_preserve_insertion_order() -> Result<(), GlossaryError> {
        let config = StoreConfig { list_order: ListOrder::Insertion, ..StoreConfig::default() };
        let (mut store, _) = store_with(config);
        for term in ["zeta", "alfa", "mu"] {
            store.define(term, "letra", author("A", "a-1"))?;
        }

        let page = page_of(store.list(1));
        let items = page.items.iter().map(Term::as_str).collect::<Vec<_>>();
        assert_eq!(items, vec!["zeta", "alfa", "mu"]);
        Ok(())
    }

    #[test]
    fn stats_counts_authors_and_most_recent_terms() -> Result<(), GlossaryError> {
        let (mut store, _) = store_with(StoreConfig::default());
        store.define("a", "1", author("Bia", "b"))?;
        store.define("b", "2", author("Ana", "a"))?;
        store.define("c", "3", author("Ana", "a"))?;
        store.define("d", "4", author("Caio", "c"))?;

        let stats = store.stats();
        assert_eq!(stats.total_count, 4);
        assert_eq!(
            stats.authors,
            vec![
                AuthorCount { author: "Ana".to_string(), count: 2 },
                AuthorCount { author: "Bia".to_string(), count: 1 },
                AuthorCount { author: "Caio".to_string(), count: 1 },
            ]
        );
        let recent = stats.most_recent.iter().map(Term::as_str).collect::<Vec<_>>();
        assert_eq!(recent, vec!["d", "c", "b"]);
        Ok(())
    }

    #[test]
    fn bulk_seed_is_idempotent_and_persists_once_per_batch() -> Result<(), GlossaryError> {
        let (mut store, backend) = store_with(StoreConfig::default());

        let first = store.bulk_seed(fixture_corpus())?;
        assert_eq!(first, SeedResult { added_count: 3, skipped_count: 0 });
        assert_eq!(backend.with(|state| state.persist_calls), 1);
        let snapshot = store.glossary().clone();

        let second = store.bulk_seed(fixture_corpus())?;
        assert_eq!(second, SeedResult { added_count: 0, skipped_count: 3 });
        assert_eq!(store.glossary(), &snapshot);
        assert_eq!(backend.with(|state| state.persist_calls), 1);

        let LookupOutcome::Found { entry, .. } = store.lookup("ética")? else {
            panic!("expected seeded entry");
        };
        assert_eq!(entry.author, SYSTEM_AUTHOR);
        assert!(entry.is_system_owned());
        Ok(())
    }

    #[test]
    fn bulk_seed_skips_existing_and_invalid_items() -> Result<(), GlossaryError> {
        let (mut store, _) = store_with(StoreConfig::default());
        store.define("lógica", "minha definição", author("A", "a-1"))?;

        let mut corpus = fixture_corpus();
        corpus.push(SeedItem::new("  ", "sem termo"));
        corpus.push(SeedItem::new("longo", "y".repeat(1001)));

        let result = store.bulk_seed(corpus)?;
        assert_eq!(result, SeedResult { added_count: 2, skipped_count: 3 });

        let LookupOutcome::Found { entry, .. } = store.lookup("Lógica")? else {
            panic!("expected user entry to survive seeding");
        };
        assert_eq!(entry.definition, "minha definição");
        Ok(())
    }

    #[test]
    fn write_failure_is_reported_but_memory_keeps_the_change() -> Result<(), GlossaryError> {
        let (mut store, backend) = store_with(StoreConfig::default());
        backend.with(|state| state.fail_writes = true);

        let result = store.define("aporia", "impasse", author("A", "a-1"));
        assert!(matches!(result, Err(GlossaryError::StorageWrite { backend: "scripted", .. })));

        assert!(matches!(store.lookup("aporia")?, LookupOutcome::Found { .. }));
        assert!(backend.with(|state| state.stored.is_empty()));
        Ok(())
    }

    #[test]
    fn degraded_start_skips_persist_until_medium_recovers() -> Result<(), GlossaryError> {
        let backend = ScriptedBackend::default();
        let persisted_term = Term::parse("arché")?;
        backend.with(|state| {
            state.stored.insert(
                persisted_term.clone(),
                Entry::new("princípio".to_string(), Author::system(), OffsetDateTime::UNIX_EPOCH),
            );
            state.unavailable = true;
        });

        let mut store = GlossaryStore::open(backend.clone(), StoreConfig::default());
        assert!(store.is_degraded());
        assert!(store.is_empty());

        let offline = store.define("logos", "razão", author("A", "a-1"));
        assert!(matches!(offline, Err(GlossaryError::StorageUnavailable { .. })));
        assert_eq!(backend.with(|state| state.persist_calls), 0);

        backend.with(|state| state.unavailable = false);
        store.define("nous", "intelecto", author("A", "a-1"))?;
        assert!(!store.is_degraded());
        assert!(store.contains("arché"));

        let stored = backend.with(|state| state.stored.clone());
        for term in ["arché", "logos", "nous"] {
            assert!(stored.contains_key(&Term::parse(term)?), "missing {term} in storage");
        }
        Ok(())
    }

    #[test]
    fn backend_receives_the_triggering_change() -> Result<(), GlossaryError> {
        let (mut store, backend) = store_with(StoreConfig::default());
        store.define("a", "1", author("A", "a-1"))?;
        store.remove("a", "a-1", false)?;
        store.bulk_seed(vec![SeedItem::new("b", "2")])?;

        let changes = backend.with(|state| state.changes.clone());
        assert_eq!(
            changes,
            vec![
                Change::Upsert(Term::parse("a")?),
                Change::Remove(Term::parse("a")?),
                Change::Batch(vec![Term::parse("b")?]),
            ]
        );
        Ok(())
    }

    #[test]
    fn mutations_after_degraded_start_see_stored_entries() -> Result<(), GlossaryError> {
        let backend = ScriptedBackend::default();
        let conatus = Term::parse("conatus")?;
        backend.with(|state| {
            state.stored.insert(
                conatus.clone(),
                Entry::new(
                    "esforço de perseverar".to_string(),
                    author("Ana", "user123"),
                    OffsetDateTime::UNIX_EPOCH,
                ),
            );
            state.unavailable = true;
        });

        let mut store = GlossaryStore::open(backend.clone(), StoreConfig::default());
        assert!(store.is_degraded());
        backend.with(|state| state.unavailable = false);

        let outcome = store.define("Conatus", "outra coisa", author("Mallory", "user999"))?;
        let DefineOutcome::AlreadyExists { existing, .. } = outcome else {
            panic!("expected AlreadyExists, got {outcome:?}");
        };
        assert_eq!(existing.author_id.as_deref(), Some("user123"));
        assert!(!store.is_degraded());

        let outcome = store.remove("conatus", "user999", false)?;
        assert!(matches!(outcome, RemoveOutcome::PermissionDenied { ref owner, .. } if owner == "Ana"));

        let stored = backend.with(|state| state.stored.clone());
        let Some(entry) = stored.get(&conatus) else {
            panic!("stored entry should survive");
        };
        assert_eq!(entry.definition, "esforço de perseverar");
        assert_eq!(entry.created_at, OffsetDateTime::UNIX_EPOCH);
        assert_eq!(backend.with(|state| state.persist_calls), 0);
        Ok(())
    }

    #[test]
    fn terms_changed_while_medium_was_down_keep_their_memory_state() -> Result<(), GlossaryError> {
        let backend = ScriptedBackend::default();
        backend.with(|state| {
            state.stored.insert(
                Term::parse("arché")?,
                Entry::new("velha".to_string(), Author::system(), OffsetDateTime::UNIX_EPOCH),
            );
            state.unavailable = true;
            Ok::<(), GlossaryError>(())
        })?;

        let mut store = GlossaryStore::open(backend.clone(), StoreConfig::default());
        let offline = store.define("arché", "nova", author("A", "a-1"));
        assert!(matches!(offline, Err(GlossaryError::StorageUnavailable { .. })));
        assert_eq!(store.pending_count(), 1);

        backend.with(|state| state.unavailable = false);
        assert_eq!(store.flush()?, 1);
        assert_eq!(store.pending_count(), 0);

        let stored = backend.with(|state| state.stored.clone());
        let Some(entry) = stored.get(&Term::parse("arché")?) else {
            panic!("arché should be stored");
        };
        assert_eq!(entry.definition, "nova");
        Ok(())
    }

    #[test]
    fn failed_write_is_retried_with_the_next_change() -> Result<(), GlossaryError> {
        let (mut store, backend) = store_with(StoreConfig::default());
        backend.with(|state| state.fail_writes = true);

        let failed = store.define("kairos", "momento oportuno", author("A", "a-1"));
        assert!(matches!(failed, Err(GlossaryError::StorageWrite { .. })));
        assert_eq!(store.pending_count(), 1);

        backend.with(|state| state.fail_writes = false);
        let retry = store.define("kairos", "momento oportuno", author("A", "a-1"))?;
        assert!(matches!(retry, DefineOutcome::AlreadyExists { .. }));
        assert!(backend.with(|state| state.stored.is_empty()));

        store.define("chronos", "tempo sequencial", author("A", "a-1"))?;
        assert_eq!(store.pending_count(), 0);

        let last = backend.with(|state| state.changes.last().cloned());
        assert_eq!(
            last,
            Some(Change::Batch(vec![Term::parse("kairos")?, Term::parse("chronos")?]))
        );
        let stored = backend.with(|state| state.stored.clone());
        assert!(stored.contains_key(&Term::parse("kairos")?));
        assert!(stored.contains_key(&Term::parse("chronos")?));
        Ok(())
    }

    #[test]
    fn flush_writes_a_failed_removal() -> Result<(), GlossaryError> {
        let (mut store, backend) = store_with(StoreConfig::default());
        let aporia = Term::parse("aporia")?;
        store.define("aporia", "impasse", author("A", "a-1"))?;
        backend.with(|state| state.fail_writes = true);

        let failed = store.remove("aporia", "a-1", false);
        assert!(matches!(failed, Err(GlossaryError::StorageWrite { .. })));
        assert!(backend.with(|state| state.stored.contains_key(&aporia)));
        assert!(matches!(store.remove("aporia", "a-1", false)?, RemoveOutcome::NotFound { .. }));

        backend.with(|state| state.fail_writes = false);
        assert_eq!(store.flush()?, 1);
        assert!(backend.with(|state| state.stored.is_empty()));
        assert_eq!(store.flush()?, 0);
        Ok(())
    }
}
