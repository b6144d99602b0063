//! `turnstile block` / `turnstile unblock` command implementations.
//!
//! The compliance agent calls `block` when it finds a violation; the block
//! stays until the agent completes a clean check or someone runs `unblock`.

use crate::cli::{open_store, project_root};
use crate::config::Config;
use crate::core::{BlockReason, Transition};
use crate::error::Result;
use crate::storage::SessionStore;
use std::path::Path;

/// Record a compliance block on a session.
///
/// # Errors
///
/// Returns `Error::InvalidState` for an empty reason, or a storage error.
pub fn run_block(config: &Config, project: Option<&Path>, session_id: &str, reason: &str) -> Result<()> {
    let store = open_store(config, &project_root(project))?;
    block(&store, session_id, reason, config.trace.max_events)?;
    println!("Session {session_id} blocked: {}", reason.trim());
    Ok(())
}

/// Clear a compliance block.
///
/// # Errors
///
/// Returns an error if the storage backend fails.
pub fn run_unblock(config: &Config, project: Option<&Path>, session_id: &str) -> Result<()> {
    let store = open_store(config, &project_root(project))?;
    let was_blocked = unblock(&store, session_id, config.trace.max_events)?;
    if was_blocked {
        println!("Session {session_id} unblocked.");
    } else {
        println!("Session {session_id} was not blocked.");
    }
    Ok(())
}

fn block(store: &dyn SessionStore, session_id: &str, reason: &str, max_events: usize) -> Result<()> {
    let transition = Transition::RecordBlock(BlockReason::new(reason)?);
    store.mutate(session_id, &mut |state| state.apply(&transition, max_events))?;
    tracing::info!(session = %session_id, reason = %reason.trim(), "compliance block recorded");
    Ok(())
}

/// Returns whether a block was active.
fn unblock(store: &dyn SessionStore, session_id: &str, max_events: usize) -> Result<bool> {
    let mut was_blocked = false;
    store.mutate(session_id, &mut |state| {
        was_blocked = state.is_blocked();
        state.apply(&Transition::Unblock, max_events);
    })?;
    if was_blocked {
        tracing::info!(session = %session_id, "compliance block cleared");
    }
    Ok(was_blocked)
}
