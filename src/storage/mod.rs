//! Storage backends for session state.

pub mod file;
pub mod memory;
pub mod traits;

pub use file::{FileBackend, project_hash};
pub use memory::MemoryBackend;
pub use traits::{SessionStore, SessionSummary};
