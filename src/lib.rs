//! turnstile - Gate engine for LLM coding agents.
//!
//! Hooks into the host agent's tool lifecycle, keeps per-session state on
//! disk and denies tool calls until the session has been hydrated, bound to
//! a task and kept under its compliance threshold.

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod hooks;
pub mod logging;
pub mod storage;

pub use config::Config;
pub use error::{Error, Result};
