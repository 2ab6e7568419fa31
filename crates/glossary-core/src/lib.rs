use std::fmt::{Display, Formatter};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

mod backend;
mod store;
pub mod timestamp;

pub use backend::{Backend, BackendError, Change, VolatileBackend};
pub use store::GlossaryStore;

/// Display name recorded on entries inserted by [`GlossaryStore::bulk_seed`].
pub const SYSTEM_AUTHOR: &str = "Sistema";

pub const MAX_TERM_CHARS: usize = 50;
pub const MAX_DEFINITION_CHARS: usize = 1000;
pub const DEFAULT_PAGE_SIZE: usize = 10;
pub const MOST_RECENT_LIMIT: usize = 3;

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum GlossaryError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("storage unavailable ({backend}): {reason}")]
    StorageUnavailable { backend: &'static str, reason: String },
    #[error(
        "storage write failed ({backend}): {reason}; the in-memory glossary kept the change and writes it with the next persist"
    )]
    StorageWrite { backend: &'static str, reason: String },
}

/// Normalized glossary key: trimmed, lower-cased, 1..=50 characters.
#[derive(Debug, Clone, Serialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(transparent)]
pub struct Term(String);

impl Term {
    /// Normalize raw user input into a lookup key.
    ///
    /// # Errors
    /// Returns [`GlossaryError::Validation`] when the normalized term is empty or
    /// longer than [`MAX_TERM_CHARS`] characters.
    pub fn parse(raw: &str) -> Result<Self, GlossaryError> {
        let normalized = raw.trim().to_lowercase();
        let chars = normalized.chars().count();
        if chars == 0 {
            return Err(GlossaryError::Validation("term MUST not be empty".to_string()));
        }
        if chars > MAX_TERM_CHARS {
            return Err(GlossaryError::Validation(format!(
                "term MUST be at most {MAX_TERM_CHARS} characters (got {chars})"
            )));
        }
        Ok(Self(normalized))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Term {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Term {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Who is writing an entry.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Author {
    pub display_name: String,
    pub id: Option<String>,
}

impl Author {
    #[must_use]
    pub fn new(display_name: impl Into<String>, id: impl Into<String>) -> Self {
        Self { display_name: display_name.into(), id: Some(id.into()) }
    }

    #[must_use]
    pub fn system() -> Self {
        Self { display_name: SYSTEM_AUTHOR.to_string(), id: None }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct Entry {
    pub definition: String,
    pub author: String,
    pub author_id: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option", default)]
    pub updated_at: Option<OffsetDateTime>,
}

impl Entry {
    #[must_use]
    pub fn new(definition: String, author: Author, created_at: OffsetDateTime) -> Self {
        Self {
            definition,
            author: author.display_name,
            author_id: author.id,
            created_at,
            updated_at: None,
        }
    }

    /// Entries without an author id were seeded or imported from a legacy file.
    #[must_use]
    pub fn is_system_owned(&self) -> bool {
        self.author_id.as_deref().map_or(true, |id| id.trim().is_empty())
    }

    /// Definition cut to `limit` characters for display; storage keeps the full text.
    #[must_use]
    pub fn preview(&self, limit: usize) -> String {
        if self.definition.chars().count() <= limit {
            return self.definition.clone();
        }
        let mut cut = self.definition.chars().take(limit).collect::<String>();
        cut.push_str("...");
        cut
    }
}

/// Check a definition against the size bounds without touching any state.
///
/// # Errors
/// Returns [`GlossaryError::Validation`] when the definition is blank or longer
/// than [`MAX_DEFINITION_CHARS`] characters.
pub fn validate_definition(definition: &str) -> Result<String, GlossaryError> {
    let trimmed = definition.trim();
    if trimmed.is_empty() {
        return Err(GlossaryError::Validation("definition MUST not be empty".to_string()));
    }
    let chars = trimmed.chars().count();
    if chars > MAX_DEFINITION_CHARS {
        return Err(GlossaryError::Validation(format!(
            "definition MUST be at most {MAX_DEFINITION_CHARS} characters (got {chars})"
        )));
    }
    Ok(trimmed.to_string())
}

/// Term to entry mapping in insertion order.
pub type Glossary = IndexMap<Term, Entry>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    #[default]
    Reject,
    Overwrite,
}

impl DuplicatePolicy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Reject => "reject",
            Self::Overwrite => "overwrite",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "reject" => Some(Self::Reject),
            "overwrite" => Some(Self::Overwrite),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum RemovalPolicy {
    /// Anyone may remove any entry.
    Open,
    /// Only the entry's author or an admin; system-owned entries need an admin.
    #[default]
    AuthorOrAdmin,
    /// Author or admin, and anyone for system-owned entries.
    AuthorAdminOrUnowned,
}

impl RemovalPolicy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::AuthorOrAdmin => "author-or-admin",
            Self::AuthorAdminOrUnowned => "author-admin-or-unowned",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "open" => Some(Self::Open),
            "author-or-admin" => Some(Self::AuthorOrAdmin),
            "author-admin-or-unowned" => Some(Self::AuthorAdminOrUnowned),
            _ => None,
        }
    }

    #[must_use]
    pub fn permits(self, entry: &Entry, requester_id: &str, requester_is_admin: bool) -> bool {
        let is_author = !entry.is_system_owned()
            && entry.author_id.as_deref().map(str::trim) == Some(requester_id.trim());
        match self {
            Self::Open => true,
            Self::AuthorOrAdmin => requester_is_admin || is_author,
            Self::AuthorAdminOrUnowned => {
                requester_is_admin || is_author || entry.is_system_owned()
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ListOrder {
    #[default]
    Alphabetical,
    Insertion,
}

impl ListOrder {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Alphabetical => "alphabetical",
            Self::Insertion => "insertion",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "alphabetical" => Some(Self::Alphabetical),
            "insertion" => Some(Self::Insertion),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
pub struct StoreConfig {
    pub duplicate_policy: DuplicatePolicy,
    pub removal_policy: RemovalPolicy,
    pub list_order: ListOrder,
    pub page_size: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            duplicate_policy: DuplicatePolicy::default(),
            removal_policy: RemovalPolicy::default(),
            list_order: ListOrder::default(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DefineOutcome {
    Created { term: Term, entry: Entry },
    Updated { term: Term, previous: Entry, entry: Entry },
    AlreadyExists { term: Term, existing: Entry },
}

#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EditOutcome {
    Edited { term: Term, previous: Entry, entry: Entry },
    NotFound { term: Term },
}

#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum LookupOutcome {
    Found { term: Term, entry: Entry },
    NotFound { term: Term },
}

#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RemoveOutcome {
    Removed { term: Term, entry: Entry },
    NotFound { term: Term },
    PermissionDenied { term: Term, owner: String },
}

#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
pub struct Page {
    pub items: Vec<Term>,
    pub page_number: usize,
    pub total_pages: usize,
    pub total_count: usize,
    pub page_size: usize,
}

#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ListOutcome {
    Empty,
    Page(Page),
}

#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
pub struct AuthorCount {
    pub author: String,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Eq, PartialEq)]
pub struct Stats {
    pub total_count: usize,
    pub authors: Vec<AuthorCount>,
    /// Newest first.
    pub most_recent: Vec<Term>,
}

/// One item of a reference corpus handed to [`GlossaryStore::bulk_seed`].
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct SeedItem {
    pub term: String,
    pub definition: String,
}

impl SeedItem {
    #[must_use]
    pub fn new(term: impl Into<String>, definition: impl Into<String>) -> Self {
        Self { term: term.into(), definition: definition.into() }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Eq, PartialEq, Default)]
pub struct SeedResult {
    pub added_count: usize,
    pub skipped_count: usize,
}
