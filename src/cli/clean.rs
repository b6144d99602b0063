//! `turnstile clean` command implementation.

use crate::cli::{open_store, project_root};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::storage::SessionStore;
use chrono::{Duration, Utc};
use std::path::Path;

/// Upper bound on sessions examined in one pass.
const SCAN_LIMIT: usize = 10_000;

/// Run the clean command.
///
/// Removes this project's sessions that have been idle longer than `before`.
/// Blocked sessions are kept unless `all` is set.
///
/// # Errors
///
/// Returns an error if the duration is invalid or the storage backend fails.
pub fn run(config: &Config, project: Option<&Path>, before: &str, all: bool) -> Result<()> {
    let store = open_store(config, &project_root(project))?;

    let duration = if all {
        Duration::zero()
    } else {
        parse_duration(before)?
    };

    let removed = clean_sessions(&store, duration, all)?;

    if removed == 0 {
        println!("No sessions to clean.");
    } else {
        println!("Cleaned {removed} session(s).");
    }

    Ok(())
}

/// Parse a duration string like "7d", "24h" or "30m". A bare number is days.
fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();

    if s.is_empty() {
        return Ok(Duration::days(7));
    }

    let parse_err = |_| Error::InvalidState(format!("Invalid duration: {s}"));

    let (digits, unit): (&str, fn(i64) -> Duration) = if let Some(n) = s.strip_suffix('d') {
        (n, Duration::days)
    } else if let Some(n) = s.strip_suffix('h') {
        (n, Duration::hours)
    } else if let Some(n) = s.strip_suffix('m') {
        (n, Duration::minutes)
    } else {
        (s, Duration::days)
    };

    let num: i64 = digits.parse().map_err(parse_err)?;
    if num < 0 {
        return Err(Error::InvalidState(format!("Invalid duration: {s}")));
    }
    Ok(unit(num))
}

fn clean_sessions(store: &dyn SessionStore, idle: Duration, include_blocked: bool) -> Result<usize> {
    let cutoff = Utc::now() - idle;
    let mut removed = 0;

    for summary in store.list_sessions(SCAN_LIMIT)? {
        if summary.updated_at > cutoff {
            continue;
        }
        if summary.blocked && !include_blocked {
            tracing::debug!(session = %summary.session_id, "keeping blocked session");
            continue;
        }

        store.delete_session(&summary.session_id)?;
        removed += 1;
    }

    if removed > 0 {
        tracing::info!(removed, "sessions cleaned");
    }
    Ok(removed)
}
