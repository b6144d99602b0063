//! Triggers: observe an event and propose state transitions.
//!
//! Triggers never block. They return the transitions to apply and, at most,
//! some context for the agent.

use crate::core::detect::{
    SubagentRole, critic_approves, extract_intent, extract_subagent_type, extract_workflow,
    is_compliance_subagent, spawn_target,
};
use crate::core::gate::GateContext;
use crate::core::gates::caller_type;
use crate::core::policy::Policy;
use crate::core::state::{EventType, SessionState};
use crate::core::taxonomy::ToolCategory;
use crate::core::transition::Transition;
use serde_json::{Value, json};

/// What a trigger wants done.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriggerOutput {
    pub transitions: Vec<Transition>,
    pub context: Option<String>,
}

impl TriggerOutput {
    fn push(&mut self, transition: Transition) {
        self.transitions.push(transition);
    }
}

/// `SessionStart`: note where the session began.
#[must_use]
pub fn on_session_start(ctx: &GateContext, state: &SessionState, _policy: &Policy) -> TriggerOutput {
    let mut out = TriggerOutput::default();
    out.push(Transition::Note {
        event_type: EventType::SessionStart,
        payload: json!({
            "cwd": ctx.cwd,
            "resumed": state.revision() > 0,
        }),
    });
    if state.is_blocked() {
        out.context = Some(block_reminder(state));
    }
    out
}

/// `UserPromptSubmit`: remember the prompt and whether it opted out.
#[must_use]
pub fn on_prompt(ctx: &GateContext, state: &SessionState, policy: &Policy) -> TriggerOutput {
    let mut out = TriggerOutput::default();
    let prompt = ctx.prompt.as_deref().unwrap_or("");
    let bypass = policy.is_bypass_prompt(prompt);
    out.push(Transition::RecordPrompt {
        prompt: prompt.to_string(),
        bypass,
    });

    let mut context = Vec::new();
    if !bypass && !state.is_hydrated() {
        context.push(
            "Before changing anything, invoke the prompt-hydrator sub-agent with this request \
             and follow the plan it returns."
                .to_string(),
        );
    }
    if state.is_blocked() {
        context.push(block_reminder(state));
    }
    if !context.is_empty() {
        out.context = Some(context.join("\n\n"));
    }
    out
}

/// `PreToolUse`, after admission: remember which sub-agent a spawn starts,
/// so the sub-agent's own calls can be attributed to its type.
#[must_use]
pub fn on_pre_tool_admitted(
    ctx: &GateContext,
    _state: &SessionState,
    policy: &Policy,
) -> TriggerOutput {
    let mut out = TriggerOutput::default();
    let Some(tool) = &ctx.tool else {
        return out;
    };
    if policy.taxonomy.classify(&tool.name) != ToolCategory::Spawn {
        return out;
    }
    let (Some(target), Some(use_id)) = (
        extract_subagent_type(&tool.name, &tool.input),
        tool.use_id.as_deref(),
    ) else {
        return out;
    };

    out.push(Transition::RecordSubagent {
        agent_id: use_id.to_string(),
        subagent_type: target.subagent_type,
        is_skill: target.is_skill,
    });
    out
}

/// `PostToolUse`: sub-agent completions reset their counters, everything
/// else advances them.
#[must_use]
pub fn on_post_tool(ctx: &GateContext, state: &SessionState, policy: &Policy) -> TriggerOutput {
    let mut out = TriggerOutput::default();
    let Some(tool) = &ctx.tool else {
        return out;
    };
    let category = policy.taxonomy.classify(&tool.name);

    let role = spawn_target(tool, category)
        .and_then(|t| SubagentRole::from_type(&t.subagent_type).map(|role| (role, t)));

    match role {
        Some((SubagentRole::Hydrator, _)) => {
            let text = tool.response_text().unwrap_or_default();
            out.push(Transition::ResetHydration {
                intent: extract_intent(&text),
                workflow: extract_workflow(&text),
            });
            return out;
        }
        Some((SubagentRole::Critic, _)) => {
            let text = tool.response_text().unwrap_or_default();
            out.push(Transition::ResetCritic {
                verified: critic_approves(&text),
            });
            return out;
        }
        Some((role, target)) if role.resets_compliance() => {
            out.push(Transition::ResetCompliance {
                agent: target.subagent_type,
            });
            out.context = Some("Compliance check recorded.".to_string());
            return out;
        }
        _ => {}
    }

    out.push(Transition::IncrementTurns);

    let by_compliance_agent = caller_type(ctx, state).is_some_and(is_compliance_subagent);
    if category == ToolCategory::Mutating && !by_compliance_agent {
        out.push(Transition::IncrementOps);
    }

    if policy.taxonomy.is_task_binding(&tool.name) {
        if let Some(transition) = task_transition(&tool.name, &tool.input, tool.response.as_ref())
        {
            if let Transition::BindTask { task_id } = &transition {
                out.context = Some(format!("Task {task_id} is now bound to this session."));
            }
            out.push(transition);
        }
    }

    out
}

fn block_reminder(state: &SessionState) -> String {
    format!(
        "Compliance block active: {}. Invoke the custodiet sub-agent before making further changes.",
        state.block_reason().unwrap_or("no reason recorded")
    )
}

/// Task manager responses are sometimes JSON encoded in a string.
fn decode_response(response: Option<&Value>) -> Value {
    match response {
        Some(Value::String(s)) => serde_json::from_str(s).unwrap_or(Value::String(s.clone())),
        Some(Value::Array(blocks)) => blocks
            .iter()
            .find_map(|b| b.get("text").and_then(Value::as_str))
            .and_then(|t| serde_json::from_str(t).ok())
            .unwrap_or(Value::Null),
        Some(other) => other.clone(),
        None => Value::Null,
    }
}

fn task_id_from(value: &Value) -> Option<String> {
    let id = value
        .pointer("/task/id")
        .or_else(|| value.get("task_id"))
        .or_else(|| value.get("id"))?;
    match id {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Bind or release a task based on a task manager call and its result.
fn task_transition(tool_name: &str, input: &Value, response: Option<&Value>) -> Option<Transition> {
    let response = decode_response(response);
    if response.get("success").and_then(Value::as_bool) == Some(false) {
        return None;
    }

    if tool_name.ends_with("create_task") || tool_name.ends_with("claim_next_task") {
        let task_id = task_id_from(&response)?;
        return Some(Transition::BindTask { task_id });
    }

    if tool_name.ends_with("update_task") {
        let status = input
            .get("status")
            .and_then(Value::as_str)
            .map(str::to_lowercase);
        let task_id = task_id_from(input).or_else(|| task_id_from(&response));
        return match status.as_deref() {
            Some("active" | "in_progress") => task_id.map(|task_id| Transition::BindTask { task_id }),
            Some("done" | "completed" | "cancelled") => {
                Some(Transition::UnbindTask { task_id })
            }
            _ => None,
        };
    }

    if tool_name.ends_with("complete_task") || tool_name.ends_with("complete_tasks") {
        let task_id = task_id_from(input).or_else(|| task_id_from(&response));
        return Some(Transition::UnbindTask { task_id });
    }

    None
}
