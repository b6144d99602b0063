//! File-based storage backend.
//!
//! One JSON document per session under
//! `<home>/sessions/<project-hash>/<session>.json`. Mutations take an
//! exclusive advisory lock on a sibling `.lock` file, re-read the document,
//! apply the change and replace the document by atomic rename.

use crate::core::SessionState;
use crate::error::{Error, Result};
use crate::storage::traits::{SessionStore, SessionSummary};
use fs2::FileExt;
use fs_err as fs;
use sha2::{Digest, Sha256};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;

/// Default time a mutation waits for the session lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(300);

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Length of the project hash used as a directory name.
const PROJECT_HASH_LEN: usize = 16;

/// Stable short hash of a project root, used to scope sessions per project.
#[must_use]
pub fn project_hash(project_root: &Path) -> String {
    let digest = Sha256::digest(project_root.to_string_lossy().as_bytes());
    let mut hash = hex::encode(digest);
    hash.truncate(PROJECT_HASH_LEN);
    hash
}

/// File-based storage backend with locked, atomic writes.
#[derive(Debug)]
pub struct FileBackend {
    sessions_dir: PathBuf,
    lock_timeout: Duration,
}

/// Holds the session lock until dropped.
struct SessionLock {
    file: fs::File,
}

impl Drop for SessionLock {
    fn drop(&mut self) {
        // Closing the descriptor releases the lock too
        let _ = FileExt::unlock(self.file.file());
    }
}

impl FileBackend {
    /// Create a backend for one project.
    ///
    /// Creates the sessions directory if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the sessions directory cannot be created.
    pub fn new(home: &Path, project_root: &Path) -> Result<Self> {
        let sessions_dir = home.join("sessions").join(project_hash(project_root));
        fs::create_dir_all(&sessions_dir)?;
        Ok(Self {
            sessions_dir,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        })
    }

    #[must_use]
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Directory holding this project's session documents.
    #[must_use]
    pub fn sessions_dir(&self) -> &Path {
        &self.sessions_dir
    }

    /// Session ids come from hosts; keep them inside the sessions directory.
    fn file_stem(session_id: &str) -> String {
        session_id
            .chars()
            .map(|c| match c {
                '/' | '\\' | ':' | '\0' => '_',
                c => c,
            })
            .collect::<String>()
            .trim_start_matches('.')
            .to_string()
    }

    /// Get the path to a session file.
    fn session_path(&self, session_id: &str) -> PathBuf {
        self.sessions_dir
            .join(format!("{}.json", Self::file_stem(session_id)))
    }

    fn lock_path(&self, session_id: &str) -> PathBuf {
        self.sessions_dir
            .join(format!("{}.lock", Self::file_stem(session_id)))
    }

    /// Poll for the exclusive lock until the timeout elapses.
    fn acquire_lock(&self, session_id: &str) -> Result<SessionLock> {
        let file = fs::OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(self.lock_path(session_id))?;

        let started = Instant::now();
        loop {
            match FileExt::try_lock_exclusive(file.file()) {
                Ok(()) => return Ok(SessionLock { file }),
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    if started.elapsed() >= self.lock_timeout {
                        let waited_ms =
                            u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                        return Err(Error::LockTimeout {
                            session_id: session_id.to_string(),
                            waited_ms,
                        });
                    }
                    thread::sleep(LOCK_POLL_INTERVAL);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Read a stored document. Unparseable documents count as absent.
    fn read_document(&self, session_id: &str) -> Result<Option<SessionState>> {
        let path = self.session_path(session_id);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str::<SessionState>(&contents) {
            Ok(state) => Ok(Some(state)),
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    session = %session_id,
                    path = %path.display(),
                    "corrupt session document, starting fresh"
                );
                Ok(None)
            }
        }
    }

    /// Write to a temp file in the same directory, then rename over the document.
    fn write_document(&self, session_id: &str, state: &SessionState) -> Result<()> {
        let contents = serde_json::to_vec_pretty(state)?;
        let mut temp = NamedTempFile::new_in(&self.sessions_dir)?;
        temp.write_all(&contents)?;
        temp.as_file().sync_all()?;
        temp.persist(self.session_path(session_id))
            .map_err(|e| Error::Storage(e.error))?;
        Ok(())
    }
}

impl SessionStore for FileBackend {
    fn load(&self, session_id: &str) -> Result<Option<SessionState>> {
        self.read_document(session_id)
    }

    fn mutate(
        &self,
        session_id: &str,
        apply: &mut dyn FnMut(&mut SessionState),
    ) -> Result<SessionState> {
        let _lock = self.acquire_lock(session_id)?;

        let mut state = self
            .read_document(session_id)?
            .unwrap_or_else(|| SessionState::new(session_id));
        apply(&mut state);
        state.commit();
        self.write_document(session_id, &state)?;

        tracing::debug!(
            session = %session_id,
            revision = state.revision(),
            "session state committed"
        );
        Ok(state)
    }

    fn list_sessions(&self, limit: usize) -> Result<Vec<SessionSummary>> {
        let mut sessions = Vec::new();

        for entry in fs::read_dir(&self.sessions_dir)? {
            let path = entry?.path();

            // Only process .json files (skip locks and temp files)
            if path.extension().is_none_or(|e| e != "json") {
                continue;
            }
            let Ok(contents) = fs::read_to_string(&path) else {
                continue;
            };
            if let Ok(state) = serde_json::from_str::<SessionState>(&contents) {
                sessions.push(SessionSummary::from(&state));
            }
        }

        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        sessions.truncate(limit);
        Ok(sessions)
    }

    fn delete_session(&self, session_id: &str) -> Result<()> {
        for path in [self.session_path(session_id), self.lock_path(session_id)] {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Transition;
    use tempfile::TempDir;

    fn create_test_backend() -> (FileBackend, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let backend = FileBackend::new(temp_dir.path(), Path::new("/work/project")).unwrap();
        (backend, temp_dir)
    }

    fn bump(store: &FileBackend, id: &str) -> SessionState {
        store
            .mutate(id, &mut |s| s.apply(&Transition::IncrementOps, 100))
            .unwrap()
    }

    #[test]
    fn creates_project_directory() {
        let (store, temp_dir) = create_test_backend();
        assert!(store.sessions_dir().starts_with(temp_dir.path().join("sessions")));
        assert!(store.sessions_dir().is_dir());
    }

    #[test]
    fn projects_are_isolated() {
        let temp_dir = TempDir::new().unwrap();
        let a = FileBackend::new(temp_dir.path(), Path::new("/work/a")).unwrap();
        let b = FileBackend::new(temp_dir.path(), Path::new("/work/b")).unwrap();
        bump(&a, "s");
        assert!(b.load("s").unwrap().is_none());
        assert_eq!(project_hash(Path::new("/work/a")).len(), 16);
    }

    #[test]
    fn load_missing_session() {
        let (store, _temp) = create_test_backend();
        assert!(store.load("nonexistent").unwrap().is_none());
    }

    #[test]
    fn get_or_create_does_not_persist() {
        let (store, _temp) = create_test_backend();
        let state = store.get_or_create("fresh").unwrap();
        assert_eq!(state.revision(), 0);
        assert!(store.load("fresh").unwrap().is_none());
    }

    #[test]
    fn mutate_persists_and_bumps_revision() {
        let (store, _temp) = create_test_backend();
        bump(&store, "test-123");
        let state = bump(&store, "test-123");
        assert_eq!(state.revision(), 2);

        let loaded = store.load("test-123").unwrap().unwrap();
        assert_eq!(loaded.ops_since_compliance(), 2);
        assert_eq!(loaded.revision(), 2);
    }

    #[test]
    fn atomic_write_leaves_no_temp_files() {
        let (store, _temp) = create_test_backend();
        bump(&store, "test-123");

        let mut names: Vec<String> = std::fs::read_dir(store.sessions_dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["test-123.json", "test-123.lock"]);
    }

    #[test]
    fn corrupt_document_is_treated_as_absent() {
        let (store, _temp) = create_test_backend();
        std::fs::write(store.sessions_dir().join("broken.json"), "{ not json").unwrap();

        assert!(store.load("broken").unwrap().is_none());
        let state = bump(&store, "broken");
        assert_eq!(state.revision(), 1);
        assert_eq!(state.ops_since_compliance(), 1);
    }

    #[test]
    fn lock_timeout_when_held() {
        let (store, _temp) = create_test_backend();
        let store = store.with_lock_timeout(Duration::from_millis(30));
        let held = store.acquire_lock("busy").unwrap();

        // A second descriptor on the same file conflicts with the first
        let other = FileBackend {
            sessions_dir: store.sessions_dir().to_path_buf(),
            lock_timeout: Duration::from_millis(30),
        };
        let err = other
            .mutate("busy", &mut |s| s.apply(&Transition::IncrementOps, 100))
            .unwrap_err();
        assert!(matches!(err, Error::LockTimeout { .. }));
        assert!(err.is_storage());

        drop(held);
        assert!(other.mutate("busy", &mut |_| {}).is_ok());
    }

    #[test]
    fn session_ids_cannot_escape_directory() {
        let (store, temp_dir) = create_test_backend();
        bump(&store, "../../etc/passwd");
        assert!(!temp_dir.path().join("etc").exists());
        assert!(store.load("../../etc/passwd").unwrap().is_some());
    }

    #[test]
    fn list_sessions_skips_unreadable_documents() {
        let (store, _temp) = create_test_backend();
        bump(&store, "valid-1");
        bump(&store, "valid-2");

        let dir = store.sessions_dir();
        std::fs::write(dir.join("corrupted.json"), "not json").unwrap();
        std::fs::write(dir.join("empty.json"), "").unwrap();
        std::fs::write(dir.join("wrong-schema.json"), r#"{"name": "x"}"#).unwrap();
        std::fs::write(dir.join("orphan.tmp"), "{}").unwrap();

        let sessions = store.list_sessions(10).unwrap();
        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions[0].session_id, "valid-2");
        assert_eq!(store.list_sessions(1).unwrap().len(), 1);
    }

    #[test]
    fn delete_session_removes_document_and_lock() {
        let (store, _temp) = create_test_backend();
        bump(&store, "test-123");
        store.delete_session("test-123").unwrap();
        assert!(store.load("test-123").unwrap().is_none());
        assert!(!store.sessions_dir().join("test-123.lock").exists());

        // Deleting again is fine
        store.delete_session("test-123").unwrap();
    }
}
