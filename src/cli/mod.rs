//! CLI command implementations.

pub mod block;
pub mod check_config;
pub mod clean;
pub mod debug;
pub mod hook;
pub mod list;
pub mod trace;

use crate::config::Config;
use crate::error::Result;
use crate::hooks::AmbientEnv;
use crate::storage::FileBackend;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Project root for commands run by hand or by an agent.
///
/// Explicit `--project`, then the host's project directory, then the
/// current directory.
#[must_use]
pub fn project_root(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .or(AmbientEnv::capture().project_dir)
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_default()
}

/// Open the session store for a project.
///
/// # Errors
///
/// Returns an error if the sessions directory cannot be created.
pub fn open_store(config: &Config, project_root: &Path) -> Result<FileBackend> {
    Ok(FileBackend::new(&config.storage.path, project_root)?
        .with_lock_timeout(Duration::from_millis(config.storage.lock_timeout_ms)))
}
