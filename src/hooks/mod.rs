//! Host adapter: hook input parsing, output rendering and dispatch.

pub mod input;
pub mod output;
pub mod runner;
pub mod session_id;

pub use input::{AmbientEnv, HookInput};
pub use output::{Host, HookResponse};
pub use runner::run_gate;
pub use session_id::resolve_session_id;
