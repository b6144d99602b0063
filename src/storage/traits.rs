//! Storage trait definitions.

use crate::core::SessionState;
use crate::error::Result;
use chrono::{DateTime, Utc};

/// Durable store for session state.
///
/// `mutate` is the only write path. Implementations serialise concurrent
/// mutators of one session and re-read the stored document under that
/// serialisation, so every mutation sees all previously committed ones.
pub trait SessionStore: Send + Sync {
    /// Load session state by ID.
    ///
    /// Returns `Ok(None)` if the session has never been persisted, or if the
    /// stored document cannot be parsed.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn load(&self, session_id: &str) -> Result<Option<SessionState>>;

    /// Load session state, or a fresh state if none is stored.
    ///
    /// Fresh state is not persisted until the first `mutate`.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn get_or_create(&self, session_id: &str) -> Result<SessionState> {
        Ok(self
            .load(session_id)?
            .unwrap_or_else(|| SessionState::new(session_id)))
    }

    /// Atomically apply `apply` to the latest stored state and persist it.
    ///
    /// Returns the committed state.
    ///
    /// # Errors
    ///
    /// Returns `Error::LockTimeout` if the session is held by another writer
    /// for longer than the configured timeout, or a storage error if the
    /// document cannot be written.
    fn mutate(
        &self,
        session_id: &str,
        apply: &mut dyn FnMut(&mut SessionState),
    ) -> Result<SessionState>;

    /// List recent sessions, most recently updated first.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn list_sessions(&self, limit: usize) -> Result<Vec<SessionSummary>>;

    /// Delete a session.
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn delete_session(&self, session_id: &str) -> Result<()>;
}

/// Summary information for a session.
#[derive(Debug, Clone)]
pub struct SessionSummary {
    /// Session identifier.
    pub session_id: String,

    /// First user prompt (if any).
    pub first_prompt: Option<String>,

    /// When the session was created.
    pub created_at: DateTime<Utc>,

    /// When the session was last mutated.
    pub updated_at: DateTime<Utc>,

    /// Committed mutation count.
    pub revision: u64,

    /// Whether a compliance block is active.
    pub blocked: bool,

    /// Number of trace events.
    pub event_count: usize,
}

impl From<&SessionState> for SessionSummary {
    fn from(state: &SessionState) -> Self {
        Self {
            session_id: state.session_id().to_string(),
            first_prompt: state.original_prompt().map(str::to_string),
            created_at: state.created_at(),
            updated_at: state.updated_at(),
            revision: state.revision(),
            blocked: state.is_blocked(),
            event_count: state.trace().len(),
        }
    }
}
