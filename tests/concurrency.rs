//! Concurrent writers to one session must not lose updates.

use std::path::Path;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use tempfile::TempDir;
use turnstile::core::Transition;
use turnstile::storage::{FileBackend, SessionStore};

const THREADS: usize = 8;
const ROUNDS: usize = 20;

#[test]
fn parallel_mutations_are_serialised() {
    let home = TempDir::new().unwrap();
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let home = home.path().to_path_buf();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                // Each writer opens its own lock file description, like
                // separate hook processes do.
                let store = FileBackend::new(&home, Path::new("/work/project"))
                    .unwrap()
                    .with_lock_timeout(Duration::from_secs(30));
                barrier.wait();
                for _ in 0..ROUNDS {
                    store
                        .mutate("shared", &mut |s| s.apply(&Transition::IncrementOps, 1000))
                        .unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let store = FileBackend::new(home.path(), Path::new("/work/project")).unwrap();
    let state = store.load("shared").unwrap().unwrap();
    let expected = THREADS * ROUNDS;
    assert_eq!(state.ops_since_compliance() as usize, expected);
    assert_eq!(state.revision() as usize, expected);
}

#[test]
fn sessions_do_not_contend() {
    let home = TempDir::new().unwrap();

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let home = home.path().to_path_buf();
            thread::spawn(move || {
                let store = FileBackend::new(&home, Path::new("/work/project")).unwrap();
                let id = format!("session-{i}");
                for _ in 0..10 {
                    store
                        .mutate(&id, &mut |s| s.apply(&Transition::IncrementOps, 1000))
                        .unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let store = FileBackend::new(home.path(), Path::new("/work/project")).unwrap();
    let sessions = store.list_sessions(10).unwrap();
    assert_eq!(sessions.len(), 4);
    for summary in sessions {
        assert_eq!(summary.revision, 10);
    }
}
