//! `turnstile debug` command implementation.

use crate::cli::{open_store, project_root};
use crate::config::Config;
use crate::core::SessionState;
use crate::error::{Error, Result};
use crate::storage::SessionStore;
use std::path::Path;

/// Run the debug command.
///
/// Shows full session state dump for debugging.
///
/// # Errors
///
/// Returns an error if the storage backend fails or the session is not found.
pub fn run(config: &Config, project: Option<&Path>, session_id: &str) -> Result<()> {
    let store = open_store(config, &project_root(project))?;
    let state = load_existing(&store, session_id)?;

    let json = serde_json::to_string_pretty(&state)?;
    println!("{json}");

    Ok(())
}

fn load_existing(store: &dyn SessionStore, session_id: &str) -> Result<SessionState> {
    store
        .load(session_id)?
        .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{BlockReason, Transition};
    use crate::storage::MemoryBackend;

    #[test]
    fn debug_includes_state_sections() {
        let store = MemoryBackend::new();
        store
            .mutate("test-debug", &mut |s| {
                s.apply_all(
                    &[
                        Transition::RecordPrompt {
                            prompt: "add caching".to_string(),
                            bypass: false,
                        },
                        Transition::ResetHydration {
                            intent: Some("add caching".to_string()),
                            workflow: Some("feature".to_string()),
                        },
                        Transition::RecordBlock(BlockReason::new("drift").unwrap()),
                    ],
                    100,
                );
            })
            .unwrap();

        let state = load_existing(&store, "test-debug").unwrap();
        let json = serde_json::to_string_pretty(&state).unwrap();

        assert!(json.contains("\"session_id\": \"test-debug\""));
        assert!(json.contains("\"turns_since_hydration\": 0"));
        assert!(json.contains("\"current_workflow\": \"feature\""));
        assert!(json.contains("\"custodiet_blocked\": true"));
        assert!(json.contains("hydration_completed"));
    }

    #[test]
    fn missing_session_is_an_error() {
        let store = MemoryBackend::new();
        let err = load_existing(&store, "nonexistent").unwrap_err();
        assert!(matches!(err, Error::SessionNotFound(_)));
        assert!(err.to_string().contains("nonexistent"));
    }
}
