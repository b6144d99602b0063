//! `turnstile list` command implementation.

use crate::cli::{open_store, project_root};
use crate::config::Config;
use crate::error::Result;
use crate::storage::{SessionStore, SessionSummary};
use chrono::{DateTime, Local, Utc};
use std::path::Path;

/// Default number of sessions to show.
const DEFAULT_LIMIT: usize = 20;

/// Maximum length for prompt preview.
const PROMPT_PREVIEW_LEN: usize = 50;

/// Run the list command.
///
/// Shows this project's recent sessions, most recently active first.
///
/// # Errors
///
/// Returns an error if the storage backend fails.
pub fn run(config: &Config, project: Option<&Path>, limit: Option<usize>) -> Result<()> {
    let store = open_store(config, &project_root(project))?;
    let sessions = store.list_sessions(limit.unwrap_or(DEFAULT_LIMIT))?;

    if sessions.is_empty() {
        println!("No sessions found.");
        println!("\nSessions are stored in: {}", store.sessions_dir().display());
        return Ok(());
    }

    println!(
        "{:<38} {:<17} {:>5} {:<8} First Prompt",
        "Session ID", "Updated", "Rev", "Status"
    );
    println!("{}", "─".repeat(100));
    for summary in &sessions {
        println!("{}", format_row(summary));
    }
    println!("{}", "─".repeat(100));
    println!("Showing {} session(s)", sessions.len());

    Ok(())
}

fn format_row(summary: &SessionSummary) -> String {
    format!(
        "{:<38} {:<17} {:>5} {:<8} {}",
        summary.session_id,
        format_local_time(summary.updated_at),
        summary.revision,
        if summary.blocked { "BLOCKED" } else { "ok" },
        format_prompt_preview(summary.first_prompt.as_deref())
    )
}

/// Format UTC time as local time for display.
fn format_local_time(utc: DateTime<Utc>) -> String {
    let local: DateTime<Local> = utc.into();
    local.format("%Y-%m-%d %H:%M").to_string()
}

/// First line of the prompt, truncated on a character boundary.
fn format_prompt_preview(prompt: Option<&str>) -> String {
    match prompt {
        Some(p) => {
            let first_line = p.lines().next().unwrap_or(p);
            if first_line.chars().count() > PROMPT_PREVIEW_LEN {
                let head: String = first_line.chars().take(PROMPT_PREVIEW_LEN).collect();
                format!("{head}...")
            } else {
                first_line.to_string()
            }
        }
        None => "(no prompt)".to_string(),
    }
}
