//! Gate registry: which checks run for which event, in which order.

use crate::config::Config;
use crate::core::gate::{GateContext, GateResult, HookEvent, Verdict, reduce};
use crate::core::gates::{
    check_compliance_threshold, check_critic_approval, check_hydration_pending,
    check_hydration_recency, check_subagent_restriction, check_task_binding,
};
use crate::core::policy::Policy;
use crate::core::state::{EventType, SessionState};
use crate::core::taxonomy::ToolCategory;
use crate::core::transition::Transition;
use crate::core::triggers::{
    TriggerOutput, on_post_tool, on_pre_tool_admitted, on_prompt, on_session_start,
};
use crate::error::Result;
use serde_json::{Value, json};

/// A gate check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateKind {
    SubagentRestriction,
    HydrationPending,
    CriticApproval,
    TaskBinding,
    ComplianceThreshold,
    HydrationRecency,
}

impl GateKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SubagentRestriction => "subagent_restriction",
            Self::HydrationPending => "hydration_pending",
            Self::CriticApproval => "critic_approval",
            Self::TaskBinding => "task_binding",
            Self::ComplianceThreshold => "compliance_threshold",
            Self::HydrationRecency => "hydration_recency",
        }
    }

    fn check(self, ctx: &GateContext, state: &SessionState, policy: &Policy) -> Option<GateResult> {
        match self {
            Self::SubagentRestriction => check_subagent_restriction(ctx, state, policy),
            Self::HydrationPending => check_hydration_pending(ctx, state, policy),
            Self::CriticApproval => check_critic_approval(ctx, state, policy),
            Self::TaskBinding => check_task_binding(ctx, state, policy),
            Self::ComplianceThreshold => check_compliance_threshold(ctx, state, policy),
            Self::HydrationRecency => check_hydration_recency(ctx, state, policy),
        }
    }
}

/// One row of the gate table.
struct GateEntry {
    gate: GateKind,
    event: HookEvent,
    /// Tool categories the gate applies to. Empty for tool-less events.
    categories: &'static [ToolCategory],
}

const ANY_TOOL: &[ToolCategory] = &ToolCategory::ALL;
const MUTATING: &[ToolCategory] = &[ToolCategory::Mutating];
const MUTATING_OR_SPAWN: &[ToolCategory] = &[ToolCategory::Mutating, ToolCategory::Spawn];

/// Evaluation order. Earlier rows win when several deny.
static GATES: &[GateEntry] = &[
    GateEntry {
        gate: GateKind::SubagentRestriction,
        event: HookEvent::PreToolUse,
        categories: ANY_TOOL,
    },
    GateEntry {
        gate: GateKind::HydrationPending,
        event: HookEvent::PreToolUse,
        categories: MUTATING_OR_SPAWN,
    },
    GateEntry {
        gate: GateKind::CriticApproval,
        event: HookEvent::PreToolUse,
        categories: MUTATING,
    },
    GateEntry {
        gate: GateKind::TaskBinding,
        event: HookEvent::PreToolUse,
        categories: MUTATING,
    },
    GateEntry {
        gate: GateKind::ComplianceThreshold,
        event: HookEvent::PreToolUse,
        categories: MUTATING,
    },
    GateEntry {
        gate: GateKind::HydrationRecency,
        event: HookEvent::Stop,
        categories: &[],
    },
];

/// Outcome of evaluating one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    /// Reduced verdict for the host.
    pub result: GateResult,
    /// State changes to apply inside `SessionStore::mutate`.
    pub transitions: Vec<Transition>,
}

impl Evaluation {
    /// Whether every pending transition is trace bookkeeping.
    #[must_use]
    pub fn is_bookkeeping_only(&self) -> bool {
        self.transitions.iter().all(Transition::is_bookkeeping)
    }
}

/// Runs gates and triggers against a policy.
#[derive(Debug, Clone)]
pub struct GateRegistry {
    policy: Policy,
}

impl GateRegistry {
    /// Build a registry from configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` if the policy does not validate.
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self::from_policy(Policy::from_config(config)?))
    }

    #[must_use]
    pub fn from_policy(policy: Policy) -> Self {
        Self { policy }
    }

    #[must_use]
    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Gates that apply to this invocation, in evaluation order.
    #[must_use]
    pub fn applicable_gates(&self, ctx: &GateContext) -> Vec<GateKind> {
        let category = ctx.tool_name().map(|name| self.policy.taxonomy.classify(name));
        GATES
            .iter()
            .filter(|entry| entry.event == ctx.event)
            .filter(|entry| match category {
                Some(category) => entry.categories.contains(&category),
                None => entry.categories.is_empty(),
            })
            .map(|entry| entry.gate)
            .collect()
    }

    /// Run the applicable gates and reduce their results.
    ///
    /// Gates after the first deny are not run.
    #[must_use]
    pub fn check(&self, ctx: &GateContext, state: &SessionState) -> GateResult {
        let results = self.applicable_gates(ctx).into_iter().filter_map(|gate| {
            gate.check(ctx, state, &self.policy)
                .map(|result| result.with_meta("gate", Value::String(gate.as_str().to_string())))
        });
        reduce(results)
    }

    /// Decide an invocation and collect the state changes it implies.
    ///
    /// Pure: the same context and state always give the same evaluation.
    #[must_use]
    pub fn evaluate(&self, ctx: &GateContext, state: &SessionState) -> Evaluation {
        let policy = &self.policy;
        let (result, trigger) = match ctx.event {
            HookEvent::SessionStart => (GateResult::allow(), on_session_start(ctx, state, policy)),
            HookEvent::UserPromptSubmit => (GateResult::allow(), on_prompt(ctx, state, policy)),
            HookEvent::PostToolUse => (GateResult::allow(), on_post_tool(ctx, state, policy)),
            HookEvent::PreToolUse => {
                let result = self.check(ctx, state);
                let trigger = if result.is_deny() {
                    TriggerOutput::default()
                } else {
                    on_pre_tool_admitted(ctx, state, policy)
                };
                (result, trigger)
            }
            HookEvent::Stop => (self.check(ctx, state), TriggerOutput::default()),
        };

        let mut transitions = trigger.transitions;
        let recorded = match result.verdict {
            Verdict::Deny => Some(EventType::GateDenied),
            Verdict::Warn => Some(EventType::GateWarned),
            Verdict::Allow => None,
        };
        if let Some(event_type) = recorded {
            transitions.push(Transition::Note {
                event_type,
                payload: json!({
                    "event": ctx.event.as_str(),
                    "gate": result.gate(),
                    "tool": ctx.tool_name(),
                }),
            });
        }

        let result = match trigger.context {
            Some(context) if !result.is_deny() => {
                reduce([result, GateResult::allow().with_context(context)])
            }
            _ => result,
        };

        Evaluation {
            result,
            transitions,
        }
    }
}
