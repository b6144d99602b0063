//! In-memory storage backend for testing.

use crate::core::SessionState;
use crate::error::{Error, Result};
use crate::storage::traits::{SessionStore, SessionSummary};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// In-memory storage backend for testing.
///
/// The map mutex plays the role of the file lock: a mutation holds it from
/// read to write.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    sessions: Mutex<HashMap<String, SessionState>>,
}

impl MemoryBackend {
    /// Create a new in-memory backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a state as-is, without a mutation.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend lock is poisoned.
    pub fn seed(&self, state: SessionState) -> Result<()> {
        self.sessions()?
            .insert(state.session_id().to_string(), state);
        Ok(())
    }

    fn sessions(&self) -> Result<MutexGuard<'_, HashMap<String, SessionState>>> {
        self.sessions
            .lock()
            .map_err(|_| Error::InvalidState("memory backend lock poisoned".to_string()))
    }
}

impl SessionStore for MemoryBackend {
    fn load(&self, session_id: &str) -> Result<Option<SessionState>> {
        Ok(self.sessions()?.get(session_id).cloned())
    }

    fn mutate(
        &self,
        session_id: &str,
        apply: &mut dyn FnMut(&mut SessionState),
    ) -> Result<SessionState> {
        let mut sessions = self.sessions()?;
        let mut state = sessions
            .get(session_id)
            .cloned()
            .unwrap_or_else(|| SessionState::new(session_id));
        apply(&mut state);
        state.commit();
        sessions.insert(session_id.to_string(), state.clone());
        Ok(state)
    }

    fn list_sessions(&self, limit: usize) -> Result<Vec<SessionSummary>> {
        let mut summaries: Vec<SessionSummary> =
            self.sessions()?.values().map(SessionSummary::from).collect();

        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        summaries.truncate(limit);
        Ok(summaries)
    }

    fn delete_session(&self, session_id: &str) -> Result<()> {
        self.sessions()?.remove(session_id);
        Ok(())
    }
}
