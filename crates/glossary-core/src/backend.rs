use crate::{Glossary, Term};

#[derive(Debug, Clone, thiserror::Error, Eq, PartialEq)]
pub enum BackendError {
    /// The medium could not be reached or timed out.
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("storage write failed: {0}")]
    Write(String),
}

/// The mutation that triggered a persist call.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Change {
    Upsert(Term),
    Remove(Term),
    Batch(Vec<Term>),
}

impl Change {
    /// Every term whose persisted state must follow the in-memory glossary.
    #[must_use]
    pub fn terms(&self) -> &[Term] {
        match self {
            Self::Upsert(term) | Self::Remove(term) => std::slice::from_ref(term),
            Self::Batch(terms) => terms,
        }
    }
}

/// Durability strategy behind a [`crate::GlossaryStore`].
///
/// `persist` receives the full glossary after the mutation has been applied in
/// memory plus the [`Change`] that caused it. Document-oriented backends rewrite
/// everything; row-oriented backends apply only the change.
pub trait Backend: Send {
    fn name(&self) -> &'static str;

    /// Read the persisted glossary once at startup.
    ///
    /// # Errors
    /// Returns [`BackendError::Unavailable`] when the medium cannot be reached.
    fn load(&mut self) -> Result<Glossary, BackendError>;

    /// Make `change` durable.
    ///
    /// # Errors
    /// Returns [`BackendError::Unavailable`] when the medium cannot be reached and
    /// [`BackendError::Write`] when the write itself fails.
    fn persist(&mut self, glossary: &Glossary, change: &Change) -> Result<(), BackendError>;
}

/// Keeps nothing: state lives only as long as the process.
#[derive(Debug, Clone, Copy, Default)]
pub struct VolatileBackend;

impl Backend for VolatileBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn load(&mut self) -> Result<Glossary, BackendError> {
        Ok(Glossary::new())
    }

    fn persist(&mut self, _glossary: &Glossary, _change: &Change) -> Result<(), BackendError> {
        Ok(())
    }
}
