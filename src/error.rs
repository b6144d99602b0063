//! Error types for turnstile.

use std::io;
use thiserror::Error;

/// Result type alias for turnstile operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in turnstile operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage I/O error.
    #[error("Storage error: {0}")]
    Storage(#[from] io::Error),

    /// The session lock could not be acquired in time.
    #[error("Storage error: lock for session {session_id} not acquired after {waited_ms}ms")]
    LockTimeout {
        /// Session whose lock was contended.
        session_id: String,

        /// How long we waited before giving up.
        waited_ms: u64,
    },

    /// JSON serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Invalid state encountered.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Session not found.
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// Missing required field in hook input.
    #[error("Missing required field: {0}")]
    MissingField(String),

    /// Hook event name not understood by the adapter.
    #[error("Unknown hook event: {0}")]
    UnknownEvent(String),

    /// Configuration error. Fatal at startup.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Whether this error came from the session store.
    ///
    /// Storage errors are recovered locally by failing open.
    #[must_use]
    pub fn is_storage(&self) -> bool {
        matches!(
            self,
            Self::Storage(_) | Self::LockTimeout { .. } | Self::Serde(_)
        )
    }
}
