//! Hook input parsing.
//!
//! Claude Code and Gemini CLI send similar payloads with different field
//! spellings. Everything is normalised here, once, into a [`GateContext`].

use crate::core::{Caller, GateContext, HookEvent, ToolCall};
use crate::error::{Error, Result};
use serde::Deserialize;
use serde_json::Value;
use std::env;
use std::path::PathBuf;

/// Input received from host hooks.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HookInput {
    /// Session identifier. Some hosts omit it.
    #[serde(default, alias = "sessionId")]
    pub session_id: Option<String>,

    /// Current working directory.
    #[serde(default)]
    pub cwd: Option<PathBuf>,

    /// Event name as the host spells it.
    #[serde(default, alias = "hookEventName")]
    pub hook_event_name: Option<String>,

    /// Path to the session transcript.
    #[serde(default, alias = "transcriptPath")]
    pub transcript_path: Option<PathBuf>,

    /// User prompt (for prompt hooks).
    #[serde(default)]
    pub prompt: Option<String>,

    /// Tool name (for tool hooks).
    #[serde(default, alias = "toolName")]
    pub tool_name: Option<String>,

    /// Tool arguments.
    #[serde(default, alias = "toolInput", alias = "tool_args")]
    pub tool_input: Option<Value>,

    /// Tool result (post-tool hooks).
    #[serde(
        default,
        alias = "toolResponse",
        alias = "tool_result",
        alias = "toolResult"
    )]
    pub tool_response: Option<Value>,

    /// Host id of the tool call.
    #[serde(default, alias = "toolUseId")]
    pub tool_use_id: Option<String>,

    /// Set when a sub-agent issued the call.
    #[serde(default, alias = "isSubagent")]
    pub is_subagent: Option<bool>,

    /// Sub-agent type, when the host reports it.
    #[serde(default, alias = "agentType", alias = "subagent_type")]
    pub agent_type: Option<String>,

    /// Id of the calling sub-agent.
    #[serde(default, alias = "agentId")]
    pub agent_id: Option<String>,
}

/// Process environment relevant to a hook, read once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AmbientEnv {
    /// Session id exported by the host.
    pub session_id: Option<String>,

    /// Sub-agent type exported by the host into sub-agent processes.
    pub subagent_type: Option<String>,

    /// Project root exported by the host. Sessions are scoped to it.
    pub project_dir: Option<PathBuf>,
}

impl AmbientEnv {
    /// Read the host's environment variables.
    #[must_use]
    pub fn capture() -> Self {
        let var = |names: &[&str]| {
            names
                .iter()
                .find_map(|name| env::var(name).ok())
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        Self {
            session_id: var(&["CLAUDE_SESSION_ID", "GEMINI_SESSION_ID"]),
            subagent_type: var(&["CLAUDE_SUBAGENT_TYPE", "CLAUDE_AGENT_TYPE"]),
            project_dir: var(&["CLAUDE_PROJECT_DIR", "GEMINI_PROJECT_DIR"]).map(PathBuf::from),
        }
    }
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

impl HookInput {
    /// Resolve the event from the CLI argument, else the payload.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnknownEvent` if neither names a known event.
    pub fn resolve_event(&self, cli_name: Option<&str>) -> Result<HookEvent> {
        let name = cli_name
            .or(self.hook_event_name.as_deref())
            .ok_or_else(|| Error::MissingField("hook_event_name".to_string()))?;
        HookEvent::from_name(name).ok_or_else(|| Error::UnknownEvent(name.to_string()))
    }

    /// Who issued the call. Payload fields win over the environment.
    #[must_use]
    pub fn caller(&self, env: &AmbientEnv) -> Caller {
        let agent_type = non_empty(self.agent_type.as_ref());
        let agent_id = non_empty(self.agent_id.as_ref());

        if agent_type.is_some() || agent_id.is_some() || self.is_subagent == Some(true) {
            return Caller::Subagent {
                agent_type: agent_type.or_else(|| env.subagent_type.clone()),
                agent_id,
            };
        }
        match &env.subagent_type {
            Some(agent_type) => Caller::Subagent {
                agent_type: Some(agent_type.clone()),
                agent_id: None,
            },
            None => Caller::Main,
        }
    }

    /// Project root used to scope session storage.
    ///
    /// The host's project directory is stable for a whole session, unlike
    /// the payload `cwd`, which follows the agent around.
    #[must_use]
    pub fn project_root(&self, env: &AmbientEnv) -> PathBuf {
        env.project_dir
            .clone()
            .or_else(|| self.cwd.clone())
            .or_else(|| env::current_dir().ok())
            .unwrap_or_default()
    }

    /// Build the gate context for one invocation.
    #[must_use]
    pub fn into_context(self, session_id: &str, event: HookEvent, env: &AmbientEnv) -> GateContext {
        let caller = self.caller(env);
        let tool = self.tool_name.as_deref().map(|name| ToolCall {
            name: name.to_string(),
            input: self.tool_input.clone().unwrap_or(Value::Null),
            response: self.tool_response.clone(),
            use_id: non_empty(self.tool_use_id.as_ref()),
        });

        GateContext {
            session_id: session_id.to_string(),
            event,
            tool,
            prompt: self.prompt,
            caller,
            cwd: self.cwd.unwrap_or_default(),
            transcript_path: self.transcript_path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(json: &str) -> HookInput {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn parse_minimal_input() {
        let input = parse(r#"{"session_id": "test-123", "cwd": "/tmp"}"#);
        assert_eq!(input.session_id.as_deref(), Some("test-123"));
        assert_eq!(input.cwd, Some(PathBuf::from("/tmp")));
        assert!(input.prompt.is_none());
    }

    #[test]
    fn empty_object_parses() {
        let input = parse("{}");
        assert!(input.session_id.is_none());
        assert!(input.tool_name.is_none());
    }

    #[test]
    fn gemini_spellings() {
        let input = parse(
            r#"{
                "hookEventName": "BeforeTool",
                "toolName": "write_file",
                "toolInput": {"file_path": "/x"},
                "toolResult": "ok"
            }"#,
        );
        assert_eq!(input.resolve_event(None).unwrap(), HookEvent::PreToolUse);
        assert_eq!(input.tool_name.as_deref(), Some("write_file"));
        assert_eq!(input.tool_input, Some(json!({"file_path": "/x"})));
        assert_eq!(input.tool_response, Some(json!("ok")));
    }

    #[test]
    fn cli_event_wins_over_payload() {
        let input = parse(r#"{"hook_event_name": "Stop"}"#);
        assert_eq!(
            input.resolve_event(Some("pre-tool-use")).unwrap(),
            HookEvent::PreToolUse
        );
    }

    #[test]
    fn unknown_or_missing_event() {
        let input = parse(r#"{"hook_event_name": "Notification"}"#);
        assert!(matches!(
            input.resolve_event(None),
            Err(Error::UnknownEvent(_))
        ));
        assert!(matches!(
            HookInput::default().resolve_event(None),
            Err(Error::MissingField(_))
        ));
    }

    #[test]
    fn extra_fields_ignored() {
        let result: std::result::Result<HookInput, _> =
            serde_json::from_str(r#"{"session_id": "test-123", "unknown_field": "ignored"}"#);
        assert!(result.is_ok());
    }

    #[test]
    fn malformed_json_fails() {
        let result: std::result::Result<HookInput, _> =
            serde_json::from_str(r#"{"session_id": "test-123", cwd: /tmp}"#);
        assert!(result.is_err());
    }

    #[test]
    fn caller_from_payload() {
        let input = parse(r#"{"agent_type": "prompt-hydrator", "agent_id": "a1"}"#);
        assert_eq!(
            input.caller(&AmbientEnv::default()),
            Caller::Subagent {
                agent_type: Some("prompt-hydrator".to_string()),
                agent_id: Some("a1".to_string()),
            }
        );
    }

    #[test]
    fn caller_from_environment() {
        let env = AmbientEnv {
            subagent_type: Some("critic".to_string()),
            ..AmbientEnv::default()
        };
        assert_eq!(
            HookInput::default().caller(&env),
            Caller::Subagent {
                agent_type: Some("critic".to_string()),
                agent_id: None,
            }
        );
        assert_eq!(HookInput::default().caller(&AmbientEnv::default()), Caller::Main);
    }

    #[test]
    fn is_subagent_flag_without_type() {
        let input = parse(r#"{"is_subagent": true}"#);
        assert_eq!(
            input.caller(&AmbientEnv::default()),
            Caller::Subagent {
                agent_type: None,
                agent_id: None,
            }
        );
    }

    #[test]
    fn into_context_builds_tool_call() {
        let input = parse(
            r#"{
                "cwd": "/work",
                "tool_name": "Task",
                "tool_input": {"subagent_type": "critic"},
                "tool_use_id": "toolu_1"
            }"#,
        );
        let ctx = input.into_context("s", HookEvent::PreToolUse, &AmbientEnv::default());
        let tool = ctx.tool.unwrap();
        assert_eq!(tool.name, "Task");
        assert_eq!(tool.use_id.as_deref(), Some("toolu_1"));
        assert_eq!(ctx.cwd, PathBuf::from("/work"));
        assert_eq!(ctx.caller, Caller::Main);
    }

    #[test]
    fn project_root_prefers_host_project_dir() {
        let input = parse(r#"{"cwd": "/work/project/src"}"#);
        assert_eq!(
            input.project_root(&AmbientEnv::default()),
            PathBuf::from("/work/project/src")
        );
        let env = AmbientEnv {
            project_dir: Some(PathBuf::from("/work/project")),
            ..AmbientEnv::default()
        };
        assert_eq!(input.project_root(&env), PathBuf::from("/work/project"));
    }
}
