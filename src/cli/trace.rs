//! `turnstile trace` command implementation.

use crate::cli::{open_store, project_root};
use crate::config::Config;
use crate::core::SessionState;
use crate::error::{Error, Result};
use crate::storage::SessionStore;
use std::fmt::Write as _;
use std::path::Path;

/// Run the trace command.
///
/// Shows trace events for a session.
///
/// # Errors
///
/// Returns an error if the storage backend fails or the session is not found.
pub fn run(config: &Config, project: Option<&Path>, session_id: &str, verbose: bool) -> Result<()> {
    let store = open_store(config, &project_root(project))?;

    let state = store
        .load(session_id)?
        .ok_or_else(|| Error::SessionNotFound(session_id.to_string()))?;

    print!("{}", render(&state, verbose)?);
    Ok(())
}

fn render(state: &SessionState, verbose: bool) -> Result<String> {
    let mut out = String::new();
    let _ = writeln!(out, "Session: {}", state.session_id());
    let _ = writeln!(out, "Created: {}", state.created_at().format("%Y-%m-%dT%H:%M:%SZ"));
    let _ = writeln!(out, "Revision: {}", state.revision());
    let _ = writeln!(out, "Events: {}", state.trace().len());
    let _ = writeln!(out);

    if state.trace().is_empty() {
        let _ = writeln!(out, "(no trace events)");
        return Ok(out);
    }

    for (i, event) in state.trace().iter().enumerate() {
        let _ = writeln!(
            out,
            "[{:>3}] {} {:?}",
            i + 1,
            event.timestamp.format("%H:%M:%S"),
            event.event_type
        );

        if verbose {
            let payload = serde_json::to_string_pretty(&event.payload)?;
            for line in payload.lines() {
                let _ = writeln!(out, "      {line}");
            }
            let _ = writeln!(out);
        }
    }

    Ok(out)
}
