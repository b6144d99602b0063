//! Core types and gate logic.

pub mod detect;
pub mod gate;
pub mod gates;
pub mod policy;
pub mod registry;
pub mod state;
pub mod taxonomy;
pub mod transition;
pub mod triggers;

pub use gate::{Caller, GateContext, GateResult, HookEvent, ToolCall, Verdict, reduce};
pub use policy::Policy;
pub use registry::{Evaluation, GateKind, GateRegistry};
pub use state::{
    BlockReason, CriticStatus, EventType, SessionState, SubagentRecord, TaskBinding, TraceEvent,
};
pub use taxonomy::{ToolCategory, ToolTaxonomy};
pub use transition::Transition;
