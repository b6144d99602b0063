//! State transitions produced by triggers and the CLI.
//!
//! Gate evaluation never writes state. It returns a list of `Transition`
//! values which the caller applies inside `SessionStore::mutate`, against the
//! freshly re-read document, so relative updates like increments are never
//! lost to a concurrent writer.

use crate::core::state::{BlockReason, EventType, SessionState};
use serde_json::{Value, json};

/// Longest prompt excerpt kept in trace payloads.
const PROMPT_PREVIEW_LEN: usize = 120;

/// A named change to session state.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Hydrator completed.
    ResetHydration {
        intent: Option<String>,
        workflow: Option<String>,
    },

    /// Critic completed.
    ResetCritic { verified: bool },

    /// A compliance agent (custodiet or audit) completed.
    ResetCompliance { agent: String },

    /// A tool call completed.
    IncrementTurns,

    /// A mutating tool call completed.
    IncrementOps,

    /// User prompt received.
    RecordPrompt { prompt: String, bypass: bool },

    /// Sub-agent spawn admitted.
    RecordSubagent {
        agent_id: String,
        subagent_type: String,
        is_skill: bool,
    },

    BindTask { task_id: String },

    UnbindTask { task_id: Option<String> },

    RecordBlock(BlockReason),

    Unblock,

    /// Trace-only record of a decision.
    Note { event_type: EventType, payload: Value },
}

impl Transition {
    /// Whether this transition only records history.
    ///
    /// Losing a bookkeeping write never changes a policy outcome.
    #[must_use]
    pub fn is_bookkeeping(&self) -> bool {
        matches!(self, Self::Note { .. })
    }

    /// Short stable name, used in logs.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::ResetHydration { .. } => "reset_hydration",
            Self::ResetCritic { .. } => "reset_critic",
            Self::ResetCompliance { .. } => "reset_compliance",
            Self::IncrementTurns => "increment_turns",
            Self::IncrementOps => "increment_ops",
            Self::RecordPrompt { .. } => "record_prompt",
            Self::RecordSubagent { .. } => "record_subagent",
            Self::BindTask { .. } => "bind_task",
            Self::UnbindTask { .. } => "unbind_task",
            Self::RecordBlock(_) => "record_block",
            Self::Unblock => "unblock",
            Self::Note { .. } => "note",
        }
    }
}

impl SessionState {
    /// Apply one transition, recording notable ones in the trace.
    pub fn apply(&mut self, transition: &Transition, max_events: usize) {
        match transition {
            Transition::ResetHydration { intent, workflow } => {
                self.reset_hydration(intent.as_deref(), workflow.as_deref());
                self.record_event(
                    EventType::HydrationCompleted,
                    json!({ "workflow": workflow }),
                    max_events,
                );
            }
            Transition::ResetCritic { verified } => {
                self.reset_critic(*verified);
                self.record_event(
                    EventType::CriticCompleted,
                    json!({ "verified": verified }),
                    max_events,
                );
            }
            Transition::ResetCompliance { agent } => {
                let was_blocked = self.is_blocked();
                let ops = self.ops_since_compliance();
                self.reset_compliance();
                self.record_event(
                    EventType::ComplianceCompleted,
                    json!({ "agent": agent, "ops": ops, "cleared_block": was_blocked }),
                    max_events,
                );
            }
            Transition::IncrementTurns => self.increment_turns(),
            Transition::IncrementOps => self.increment_ops(),
            Transition::RecordPrompt { prompt, bypass } => {
                self.record_prompt(prompt, *bypass);
                let preview: String = prompt.chars().take(PROMPT_PREVIEW_LEN).collect();
                self.record_event(
                    EventType::PromptReceived,
                    json!({ "prompt": preview, "bypass": bypass }),
                    max_events,
                );
            }
            Transition::RecordSubagent {
                agent_id,
                subagent_type,
                is_skill,
            } => {
                self.record_subagent(agent_id, subagent_type, *is_skill);
                self.record_event(
                    EventType::SubagentSpawned,
                    json!({ "agent_id": agent_id, "type": subagent_type, "skill": is_skill }),
                    max_events,
                );
            }
            Transition::BindTask { task_id } => {
                if self.current_task().is_some_and(|t| t.task_id == *task_id) {
                    return;
                }
                let bound = self.bind_task(task_id);
                self.record_event(
                    EventType::TaskBound,
                    json!({ "task_id": task_id, "bound": bound }),
                    max_events,
                );
            }
            Transition::UnbindTask { task_id } => {
                if self.current_task().is_none() {
                    return;
                }
                self.unbind_task(task_id.as_deref());
                self.record_event(
                    EventType::TaskUnbound,
                    json!({ "task_id": task_id }),
                    max_events,
                );
            }
            Transition::RecordBlock(reason) => {
                self.record_block(reason);
                self.record_event(
                    EventType::BlockRecorded,
                    json!({ "reason": reason.as_str() }),
                    max_events,
                );
            }
            Transition::Unblock => {
                if !self.is_blocked() {
                    return;
                }
                self.unblock();
                self.record_event(EventType::Unblocked, json!({}), max_events);
            }
            Transition::Note {
                event_type,
                payload,
            } => self.record_event(*event_type, payload.clone(), max_events),
        }
    }

    /// Apply transitions in order.
    pub fn apply_all(&mut self, transitions: &[Transition], max_events: usize) {
        for transition in transitions {
            self.apply(transition, max_events);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: usize = 500;

    #[test]
    fn bookkeeping_only_for_notes() {
        assert!(
            Transition::Note {
                event_type: EventType::GateDenied,
                payload: json!({}),
            }
            .is_bookkeeping()
        );
        assert!(!Transition::IncrementOps.is_bookkeeping());
        assert!(!Transition::Unblock.is_bookkeeping());
    }

    #[test]
    fn apply_reset_compliance_from_any_state() {
        let mut state = SessionState::new("s");
        state.apply_all(
            &[
                Transition::IncrementOps,
                Transition::IncrementOps,
                Transition::RecordBlock(BlockReason::new("drift").unwrap()),
            ],
            MAX,
        );
        assert!(state.is_blocked());
        assert_eq!(state.ops_since_compliance(), 2);

        state.apply(
            &Transition::ResetCompliance {
                agent: "custodiet".to_string(),
            },
            MAX,
        );
        assert!(!state.is_blocked());
        assert_eq!(state.ops_since_compliance(), 0);
        let last = state.trace().last().unwrap();
        assert_eq!(last.event_type, EventType::ComplianceCompleted);
        assert_eq!(last.payload["cleared_block"], true);
    }

    #[test]
    fn apply_bind_is_quiet_when_already_bound() {
        let mut state = SessionState::new("s");
        let bind = Transition::BindTask {
            task_id: "t1".to_string(),
        };
        state.apply(&bind, MAX);
        state.apply(&bind, MAX);
        let bound_events = state
            .trace()
            .iter()
            .filter(|e| e.event_type == EventType::TaskBound)
            .count();
        assert_eq!(bound_events, 1);
    }

    #[test]
    fn apply_unblock_when_not_blocked_records_nothing() {
        let mut state = SessionState::new("s");
        state.apply(&Transition::Unblock, MAX);
        assert!(state.trace().is_empty());
    }

    #[test]
    fn increments_do_not_trace() {
        let mut state = SessionState::new("s");
        state.apply_all(&[Transition::IncrementTurns, Transition::IncrementOps], MAX);
        assert!(state.trace().is_empty());
        assert_eq!(state.ops_since_compliance(), 1);
    }

    #[test]
    fn prompt_preview_is_truncated() {
        let mut state = SessionState::new("s");
        state.apply(
            &Transition::RecordPrompt {
                prompt: "x".repeat(1000),
                bypass: false,
            },
            MAX,
        );
        let preview = state.trace()[0].payload["prompt"].as_str().unwrap();
        assert_eq!(preview.len(), PROMPT_PREVIEW_LEN);
    }
}
