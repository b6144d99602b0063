//! Gate model: what a gate sees and what it returns.

use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::path::{Path, PathBuf};

/// Separator between context blocks from different sources.
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Lifecycle event that triggered an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum HookEvent {
    SessionStart,
    UserPromptSubmit,
    PreToolUse,
    PostToolUse,
    Stop,
}

impl HookEvent {
    /// Parse a host event name or a CLI hook name.
    ///
    /// Accepts Claude Code names (`PreToolUse`), Gemini CLI names
    /// (`BeforeTool`) and kebab-case CLI names (`pre-tool-use`).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim() {
            "SessionStart" | "session-start" => Some(Self::SessionStart),
            "UserPromptSubmit" | "BeforeAgent" | "user-prompt" | "user-prompt-submit" => {
                Some(Self::UserPromptSubmit)
            }
            "PreToolUse" | "BeforeTool" | "pre-tool-use" => Some(Self::PreToolUse),
            "PostToolUse" | "AfterTool" | "post-tool-use" => Some(Self::PostToolUse),
            "Stop" | "AfterAgent" | "stop" => Some(Self::Stop),
            _ => None,
        }
    }

    /// Canonical (Claude Code) event name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SessionStart => "SessionStart",
            Self::UserPromptSubmit => "UserPromptSubmit",
            Self::PreToolUse => "PreToolUse",
            Self::PostToolUse => "PostToolUse",
            Self::Stop => "Stop",
        }
    }
}

impl fmt::Display for HookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tool invocation, normalised at the adapter boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    /// Tool name as the host reports it.
    pub name: String,

    /// Tool arguments.
    pub input: Value,

    /// Tool result (`PostToolUse` only).
    pub response: Option<Value>,

    /// Host id of this tool call.
    pub use_id: Option<String>,
}

impl ToolCall {
    #[must_use]
    pub fn new(name: &str, input: Value) -> Self {
        Self {
            name: name.to_string(),
            input,
            response: None,
            use_id: None,
        }
    }

    #[must_use]
    pub fn with_response(mut self, response: Value) -> Self {
        self.response = Some(response);
        self
    }

    #[must_use]
    pub fn with_use_id(mut self, use_id: &str) -> Self {
        self.use_id = Some(use_id.to_string());
        self
    }

    /// A string argument by key.
    #[must_use]
    pub fn str_arg(&self, key: &str) -> Option<&str> {
        self.input.get(key).and_then(Value::as_str)
    }

    /// Shell command line, if the tool takes one.
    #[must_use]
    pub fn command(&self) -> Option<&str> {
        self.str_arg("command")
    }

    /// File the tool targets, across the argument names hosts use.
    #[must_use]
    pub fn target_path(&self) -> Option<&Path> {
        ["file_path", "notebook_path", "absolute_path", "path"]
            .iter()
            .find_map(|key| self.str_arg(key))
            .map(Path::new)
    }

    /// Tool response as text, for scanning sub-agent output.
    ///
    /// Claude reports `Task` results as a list of content blocks; other hosts
    /// send a plain string or an object with an `output` or `result` field.
    #[must_use]
    pub fn response_text(&self) -> Option<String> {
        let response = self.response.as_ref()?;
        let text = match response {
            Value::String(s) => s.clone(),
            Value::Array(blocks) => blocks
                .iter()
                .filter_map(|b| b.get("text").and_then(Value::as_str).or_else(|| b.as_str()))
                .collect::<Vec<_>>()
                .join("\n"),
            Value::Object(map) => ["content", "output", "result", "text"]
                .iter()
                .find_map(|key| map.get(*key))
                .map(|v| match v {
                    Value::String(s) => s.clone(),
                    Value::Array(blocks) => blocks
                        .iter()
                        .filter_map(|b| b.get("text").and_then(Value::as_str))
                        .collect::<Vec<_>>()
                        .join("\n"),
                    other => other.to_string(),
                })
                .unwrap_or_else(|| response.to_string()),
            other => other.to_string(),
        };
        Some(text)
    }
}

/// Who issued the tool call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Caller {
    /// The top-level agent.
    #[default]
    Main,

    /// A spawned sub-agent. The type may only be known via `agent_id`.
    Subagent {
        agent_type: Option<String>,
        agent_id: Option<String>,
    },
}

/// Everything a gate may look at. Built once per invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct GateContext {
    pub session_id: String,
    pub event: HookEvent,
    pub tool: Option<ToolCall>,
    pub prompt: Option<String>,
    pub caller: Caller,
    pub cwd: PathBuf,
    pub transcript_path: Option<PathBuf>,
}

impl GateContext {
    #[must_use]
    pub fn new(session_id: &str, event: HookEvent) -> Self {
        Self {
            session_id: session_id.to_string(),
            event,
            tool: None,
            prompt: None,
            caller: Caller::Main,
            cwd: PathBuf::new(),
            transcript_path: None,
        }
    }

    #[must_use]
    pub fn with_tool(mut self, tool: ToolCall) -> Self {
        self.tool = Some(tool);
        self
    }

    #[must_use]
    pub fn with_prompt(mut self, prompt: &str) -> Self {
        self.prompt = Some(prompt.to_string());
        self
    }

    #[must_use]
    pub fn with_caller(mut self, caller: Caller) -> Self {
        self.caller = caller;
        self
    }

    #[must_use]
    pub fn with_cwd(mut self, cwd: PathBuf) -> Self {
        self.cwd = cwd;
        self
    }

    /// Tool name, if this event concerns a tool.
    #[must_use]
    pub fn tool_name(&self) -> Option<&str> {
        self.tool.as_ref().map(|t| t.name.as_str())
    }
}

/// Gate verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Allow,
    Deny,
    Warn,
}

/// Outcome of one gate or of a whole evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GateResult {
    pub verdict: Verdict,

    /// Message shown to the agent. Required for `Deny`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_message: Option<String>,

    /// Extra context injected into the conversation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_injection: Option<String>,

    #[serde(skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl GateResult {
    #[must_use]
    pub fn allow() -> Self {
        Self {
            verdict: Verdict::Allow,
            system_message: None,
            context_injection: None,
            metadata: Map::new(),
        }
    }

    /// Deny with a message naming the policy and how to clear it.
    #[must_use]
    pub fn deny(message: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Deny,
            system_message: Some(message.into()),
            ..Self::allow()
        }
    }

    #[must_use]
    pub fn warn(message: impl Into<String>) -> Self {
        Self {
            verdict: Verdict::Warn,
            system_message: Some(message.into()),
            ..Self::allow()
        }
    }

    /// Let the call through, but flag that state could not be persisted.
    #[must_use]
    pub fn degraded(error: &crate::Error) -> Self {
        Self::allow()
            .with_message(format!(
                "[turnstile] degraded mode: session state unavailable ({error}); gates were not enforced for this call"
            ))
            .with_meta("degraded", Value::Bool(true))
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.system_message = Some(message.into());
        self
    }

    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context_injection = Some(context.into());
        self
    }

    #[must_use]
    pub fn with_meta(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    #[must_use]
    pub fn is_deny(&self) -> bool {
        self.verdict == Verdict::Deny
    }

    /// Name of the gate that produced this result, if recorded.
    #[must_use]
    pub fn gate(&self) -> Option<&str> {
        self.metadata.get("gate").and_then(Value::as_str)
    }
}

impl Default for GateResult {
    fn default() -> Self {
        Self::allow()
    }
}

/// Combine gate results in evaluation order.
///
/// The first `Deny` wins and stops evaluation; the iterator is not polled
/// further. Otherwise the first `Warn` wins, else `Allow`. Context injections
/// of non-denying results are concatenated.
pub fn reduce<I>(results: I) -> GateResult
where
    I: IntoIterator<Item = GateResult>,
{
    let mut first_warn: Option<GateResult> = None;
    let mut allow_message: Option<String> = None;
    let mut contexts: Vec<String> = Vec::new();

    for result in results {
        match result.verdict {
            Verdict::Deny => return result,
            Verdict::Warn => {
                if let Some(ctx) = &result.context_injection {
                    contexts.push(ctx.clone());
                }
                if first_warn.is_none() {
                    first_warn = Some(result);
                }
            }
            Verdict::Allow => {
                if let Some(ctx) = result.context_injection {
                    contexts.push(ctx);
                }
                if allow_message.is_none() {
                    allow_message = result.system_message;
                }
            }
        }
    }

    let mut combined = match first_warn {
        Some(warn) => warn,
        None => {
            let mut allow = GateResult::allow();
            allow.system_message = allow_message;
            allow
        }
    };
    combined.context_injection = if contexts.is_empty() {
        None
    } else {
        Some(contexts.join(CONTEXT_SEPARATOR))
    };
    combined
}
