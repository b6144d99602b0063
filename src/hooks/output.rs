//! Hook output rendering.
//!
//! The decision is host-neutral ([`GateResult`]); this module renders it in
//! each host's envelope and picks the exit code.

use crate::core::{GateResult, HookEvent, Verdict};
use serde::Serialize;

/// Agent host that invoked the hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Host {
    #[default]
    Claude,
    Gemini,
}

/// Exit code Gemini CLI treats as a blocking hook decision.
pub const GEMINI_BLOCK_EXIT: u8 = 2;

/// Rendered hook response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookResponse {
    /// JSON body for stdout.
    pub body: String,

    /// Text for stderr, if any.
    pub stderr: Option<String>,

    /// Process exit code.
    pub exit_code: u8,
}

/// Claude Code envelope.
#[derive(Debug, Clone, Serialize, Default)]
#[serde(rename_all = "camelCase")]
struct ClaudeOutput {
    /// `"block"` for a denied stop.
    #[serde(skip_serializing_if = "Option::is_none")]
    decision: Option<&'static str>,

    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    system_message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    hook_specific_output: Option<ClaudeSpecific>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct ClaudeSpecific {
    hook_event_name: &'static str,

    #[serde(skip_serializing_if = "Option::is_none")]
    permission_decision: Option<&'static str>,

    #[serde(skip_serializing_if = "Option::is_none")]
    permission_decision_reason: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    additional_context: Option<String>,
}

/// Gemini CLI envelope.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiOutput {
    decision: &'static str,

    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    system_message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    hook_specific_output: Option<GeminiSpecific>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiSpecific {
    hook_event_name: &'static str,
    additional_context: String,
}

fn gemini_event_name(event: HookEvent) -> &'static str {
    match event {
        HookEvent::SessionStart => "SessionStart",
        HookEvent::UserPromptSubmit => "BeforeAgent",
        HookEvent::PreToolUse => "BeforeTool",
        HookEvent::PostToolUse => "AfterTool",
        HookEvent::Stop => "AfterAgent",
    }
}

impl HookResponse {
    /// Render a result for a host.
    #[must_use]
    pub fn render(host: Host, event: HookEvent, result: &GateResult) -> Self {
        match host {
            Host::Claude => Self::claude(event, result),
            Host::Gemini => Self::gemini(event, result),
        }
    }

    /// Pass-through response, used when nothing could be evaluated.
    #[must_use]
    pub fn allow(host: Host, event: HookEvent) -> Self {
        Self::render(host, event, &GateResult::allow())
    }

    fn claude(event: HookEvent, result: &GateResult) -> Self {
        let deny = result.verdict == Verdict::Deny;
        let mut output = ClaudeOutput::default();

        match event {
            HookEvent::PreToolUse => {
                output.hook_specific_output = Some(ClaudeSpecific {
                    hook_event_name: event.as_str(),
                    permission_decision: Some(if deny { "deny" } else { "allow" }),
                    permission_decision_reason: result.system_message.clone(),
                    additional_context: result.context_injection.clone(),
                });
                if !deny {
                    output.system_message = result.system_message.clone();
                }
            }
            HookEvent::Stop => {
                if deny {
                    output.decision = Some("block");
                    output.reason = result.system_message.clone();
                } else {
                    output.system_message = result.system_message.clone();
                }
            }
            HookEvent::SessionStart | HookEvent::UserPromptSubmit | HookEvent::PostToolUse => {
                output.system_message = result.system_message.clone();
                output.hook_specific_output =
                    result
                        .context_injection
                        .clone()
                        .map(|context| ClaudeSpecific {
                            hook_event_name: event.as_str(),
                            permission_decision: None,
                            permission_decision_reason: None,
                            additional_context: Some(context),
                        });
            }
        }

        Self {
            body: to_json(&output),
            stderr: None,
            exit_code: 0,
        }
    }

    fn gemini(event: HookEvent, result: &GateResult) -> Self {
        let deny = result.verdict == Verdict::Deny;
        let output = GeminiOutput {
            decision: if deny { "deny" } else { "allow" },
            reason: result.system_message.clone().filter(|_| deny),
            system_message: result.system_message.clone().filter(|_| !deny),
            hook_specific_output: result.context_injection.clone().map(|context| {
                GeminiSpecific {
                    hook_event_name: gemini_event_name(event),
                    additional_context: context,
                }
            }),
        };

        Self {
            body: to_json(&output),
            stderr: if deny {
                result.system_message.clone()
            } else {
                None
            },
            exit_code: if deny { GEMINI_BLOCK_EXIT } else { 0 },
        }
    }
}

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn body(response: &HookResponse) -> Value {
        serde_json::from_str(&response.body).unwrap()
    }

    #[test]
    fn claude_pre_tool_deny() {
        let response = HookResponse::render(
            Host::Claude,
            HookEvent::PreToolUse,
            &GateResult::deny("hydrate first"),
        );
        let json = body(&response);
        assert_eq!(response.exit_code, 0);
        assert_eq!(json["hookSpecificOutput"]["permissionDecision"], "deny");
        assert_eq!(
            json["hookSpecificOutput"]["permissionDecisionReason"],
            "hydrate first"
        );
        assert_eq!(json["hookSpecificOutput"]["hookEventName"], "PreToolUse");
        assert!(json.get("systemMessage").is_none());
    }

    #[test]
    fn claude_pre_tool_warn_allows_with_message() {
        let response = HookResponse::render(
            Host::Claude,
            HookEvent::PreToolUse,
            &GateResult::warn("check due soon"),
        );
        let json = body(&response);
        assert_eq!(json["hookSpecificOutput"]["permissionDecision"], "allow");
        assert_eq!(json["systemMessage"], "check due soon");
    }

    #[test]
    fn claude_stop_block() {
        let response = HookResponse::render(
            Host::Claude,
            HookEvent::Stop,
            &GateResult::deny("execute the plan"),
        );
        let json = body(&response);
        assert_eq!(json["decision"], "block");
        assert_eq!(json["reason"], "execute the plan");
    }

    #[test]
    fn claude_plain_allow_is_empty_object() {
        let response = HookResponse::allow(Host::Claude, HookEvent::PostToolUse);
        assert_eq!(response.body, "{}");
        let stop = HookResponse::allow(Host::Claude, HookEvent::Stop);
        assert_eq!(stop.body, "{}");
    }

    #[test]
    fn claude_prompt_context() {
        let response = HookResponse::render(
            Host::Claude,
            HookEvent::UserPromptSubmit,
            &GateResult::allow().with_context("invoke the hydrator"),
        );
        let json = body(&response);
        assert_eq!(
            json["hookSpecificOutput"]["additionalContext"],
            "invoke the hydrator"
        );
        assert_eq!(json["hookSpecificOutput"]["hookEventName"], "UserPromptSubmit");
        assert!(json["hookSpecificOutput"].get("permissionDecision").is_none());
    }

    #[test]
    fn gemini_deny_exits_two() {
        let response = HookResponse::render(
            Host::Gemini,
            HookEvent::PreToolUse,
            &GateResult::deny("task required"),
        );
        let json = body(&response);
        assert_eq!(response.exit_code, GEMINI_BLOCK_EXIT);
        assert_eq!(response.stderr.as_deref(), Some("task required"));
        assert_eq!(json["decision"], "deny");
        assert_eq!(json["reason"], "task required");
    }

    #[test]
    fn gemini_allow_with_context() {
        let response = HookResponse::render(
            Host::Gemini,
            HookEvent::UserPromptSubmit,
            &GateResult::allow().with_context("ctx"),
        );
        let json = body(&response);
        assert_eq!(response.exit_code, 0);
        assert!(response.stderr.is_none());
        assert_eq!(json["decision"], "allow");
        assert_eq!(json["hookSpecificOutput"]["hookEventName"], "BeforeAgent");
        assert_eq!(json["hookSpecificOutput"]["additionalContext"], "ctx");
    }
}
