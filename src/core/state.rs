//! Session state types.
//!
//! `SessionState` is the durable per-session document. Its fields are private:
//! everything outside this module reads through accessors and changes state
//! through the named transitions below (usually by applying a
//! [`Transition`](crate::core::Transition) inside `SessionStore::mutate`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Current on-disk schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Session state stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionState {
    session_id: String,

    #[serde(default)]
    schema_version: u32,

    /// Bumped by every committed mutation.
    #[serde(default)]
    revision: u64,

    #[serde(default)]
    hydration: HydrationState,

    #[serde(default)]
    state: ExecutionState,

    /// Spawned sub-agents, keyed by the spawning tool call id.
    #[serde(default)]
    subagents: BTreeMap<String, SubagentRecord>,

    #[serde(default)]
    trace: Vec<TraceEvent>,

    created_at: DateTime<Utc>,

    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct HydrationState {
    /// `None` until the hydrator has completed once in this session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    turns_since_hydration: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    turns_since_critic: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    hydrated_intent: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    original_prompt: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct ExecutionState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    current_workflow: Option<String>,

    #[serde(default)]
    custodiet_blocked: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    custodiet_block_reason: Option<String>,

    #[serde(default)]
    critic_invoked: CriticStatus,

    #[serde(default)]
    ops_since_compliance: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_compliance_at: Option<DateTime<Utc>>,

    #[serde(default)]
    gates_bypassed: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    current_task: Option<TaskBinding>,
}

/// Whether the critic has reviewed the current plan.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CriticStatus {
    /// Not invoked since the last user prompt.
    #[default]
    NotInvoked,

    /// Invoked, verdict not recognised as approval.
    Invoked,

    /// Invoked and approved the plan.
    Verified,
}

/// The task the main agent is currently working on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskBinding {
    /// Task identifier from the task manager.
    pub task_id: String,

    /// When the binding was made.
    pub bound_at: DateTime<Utc>,
}

/// A sub-agent or skill spawned from this session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubagentRecord {
    /// Normalised sub-agent type (e.g. `prompt-hydrator`, `org:critic`).
    pub subagent_type: String,

    /// Spawned through a skill tool rather than an agent tool.
    pub is_skill: bool,

    /// When the spawn was admitted.
    pub spawned_at: DateTime<Utc>,
}

/// Reason attached to a compliance block. Never empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockReason(String);

impl BlockReason {
    /// Validate a block reason.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidState` if the reason is empty or whitespace.
    pub fn new(reason: &str) -> crate::Result<Self> {
        let trimmed = reason.trim();
        if trimmed.is_empty() {
            return Err(crate::Error::InvalidState(
                "a compliance block needs a reason".to_string(),
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// The reason text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl SessionState {
    /// Create a new, unpersisted session state.
    #[must_use]
    pub fn new(session_id: &str) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.to_string(),
            schema_version: SCHEMA_VERSION,
            revision: 0,
            hydration: HydrationState::default(),
            state: ExecutionState::default(),
            subagents: BTreeMap::new(),
            trace: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// Session identifier.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Number of committed mutations.
    #[must_use]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Tool calls since the hydrator last completed, `None` if it never has.
    #[must_use]
    pub fn turns_since_hydration(&self) -> Option<u32> {
        self.hydration.turns_since_hydration
    }

    /// Tool calls since the critic last completed, `None` if it never has.
    #[must_use]
    pub fn turns_since_critic(&self) -> Option<u32> {
        self.hydration.turns_since_critic
    }

    /// Whether the hydrator has completed at least once.
    #[must_use]
    pub fn is_hydrated(&self) -> bool {
        self.hydration.turns_since_hydration.is_some()
    }

    #[must_use]
    pub fn hydrated_intent(&self) -> Option<&str> {
        self.hydration.hydrated_intent.as_deref()
    }

    #[must_use]
    pub fn original_prompt(&self) -> Option<&str> {
        self.hydration.original_prompt.as_deref()
    }

    /// Workflow selected by the hydrator. Only picks thresholds.
    #[must_use]
    pub fn current_workflow(&self) -> Option<&str> {
        self.state.current_workflow.as_deref()
    }

    #[must_use]
    pub fn is_blocked(&self) -> bool {
        self.state.custodiet_blocked
    }

    #[must_use]
    pub fn block_reason(&self) -> Option<&str> {
        self.state.custodiet_block_reason.as_deref()
    }

    #[must_use]
    pub fn critic_status(&self) -> CriticStatus {
        self.state.critic_invoked
    }

    /// Mutating operations since the last compliance check.
    #[must_use]
    pub fn ops_since_compliance(&self) -> u32 {
        self.state.ops_since_compliance
    }

    #[must_use]
    pub fn last_compliance_at(&self) -> Option<DateTime<Utc>> {
        self.state.last_compliance_at
    }

    /// Whether the latest prompt carried the bypass marker.
    #[must_use]
    pub fn gates_bypassed(&self) -> bool {
        self.state.gates_bypassed
    }

    #[must_use]
    pub fn current_task(&self) -> Option<&TaskBinding> {
        self.state.current_task.as_ref()
    }

    /// Look up a spawned sub-agent by the id of the tool call that spawned it.
    #[must_use]
    pub fn subagent(&self, agent_id: &str) -> Option<&SubagentRecord> {
        self.subagents.get(agent_id)
    }

    /// All spawned sub-agents.
    pub fn subagents(&self) -> impl Iterator<Item = (&str, &SubagentRecord)> {
        self.subagents.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn trace(&self) -> &[TraceEvent] {
        &self.trace
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    // ========================================================================
    // Named transitions
    // ========================================================================

    /// The hydrator completed: start counting turns from zero.
    pub fn reset_hydration(&mut self, intent: Option<&str>, workflow: Option<&str>) {
        self.hydration.turns_since_hydration = Some(0);
        if let Some(intent) = intent {
            self.hydration.hydrated_intent = Some(intent.to_string());
        }
        if let Some(workflow) = workflow {
            self.state.current_workflow = Some(workflow.to_string());
        }
    }

    /// The critic completed.
    pub fn reset_critic(&mut self, verified: bool) {
        self.hydration.turns_since_critic = Some(0);
        self.state.critic_invoked = if verified {
            CriticStatus::Verified
        } else {
            CriticStatus::Invoked
        };
    }

    /// A compliance agent completed: zero the counter and lift any block.
    pub fn reset_compliance(&mut self) {
        self.state.ops_since_compliance = 0;
        self.state.last_compliance_at = Some(Utc::now());
        self.unblock();
    }

    /// One more tool call since the last hydration and critic review.
    ///
    /// Uninitialised counters stay uninitialised.
    pub fn increment_turns(&mut self) {
        if let Some(turns) = self.hydration.turns_since_hydration.as_mut() {
            *turns = turns.saturating_add(1);
        }
        if let Some(turns) = self.hydration.turns_since_critic.as_mut() {
            *turns = turns.saturating_add(1);
        }
    }

    /// One more mutating operation since the last compliance check.
    pub fn increment_ops(&mut self) {
        self.state.ops_since_compliance = self.state.ops_since_compliance.saturating_add(1);
    }

    /// A new user prompt arrived. A new request needs a fresh critic review.
    pub fn record_prompt(&mut self, prompt: &str, bypass: bool) {
        if self.hydration.original_prompt.is_none() {
            self.hydration.original_prompt = Some(prompt.to_string());
        }
        self.state.gates_bypassed = bypass;
        self.state.critic_invoked = CriticStatus::NotInvoked;
    }

    /// A sub-agent spawn was admitted.
    pub fn record_subagent(&mut self, agent_id: &str, subagent_type: &str, is_skill: bool) {
        self.subagents.insert(
            agent_id.to_string(),
            SubagentRecord {
                subagent_type: subagent_type.to_string(),
                is_skill,
                spawned_at: Utc::now(),
            },
        );
    }

    /// Bind the session to a task.
    ///
    /// An existing binding to a different task is kept. Returns whether the
    /// session is now bound to `task_id`.
    pub fn bind_task(&mut self, task_id: &str) -> bool {
        match &self.state.current_task {
            Some(existing) if existing.task_id != task_id => false,
            Some(_) => true,
            None => {
                self.state.current_task = Some(TaskBinding {
                    task_id: task_id.to_string(),
                    bound_at: Utc::now(),
                });
                true
            }
        }
    }

    /// Drop the task binding. With `Some(id)`, only if bound to that task.
    pub fn unbind_task(&mut self, task_id: Option<&str>) {
        let matches = match (&self.state.current_task, task_id) {
            (Some(existing), Some(id)) => existing.task_id == id,
            (Some(_), None) => true,
            (None, _) => false,
        };
        if matches {
            self.state.current_task = None;
        }
    }

    /// Set the sticky compliance block.
    pub fn record_block(&mut self, reason: &BlockReason) {
        self.state.custodiet_blocked = true;
        self.state.custodiet_block_reason = Some(reason.as_str().to_string());
    }

    /// Clear the compliance block.
    pub fn unblock(&mut self) {
        self.state.custodiet_blocked = false;
        self.state.custodiet_block_reason = None;
    }

    /// Append a trace event, compacting the trace when it exceeds `max_events`.
    pub fn record_event(&mut self, event_type: EventType, payload: Value, max_events: usize) {
        self.trace.push(TraceEvent::new(event_type, payload));
        compact_trace(&mut self.trace, max_events);
    }

    /// Stamp a mutation. Called by storage backends only.
    pub(crate) fn commit(&mut self) {
        self.schema_version = SCHEMA_VERSION;
        self.revision = self.revision.saturating_add(1);
        self.updated_at = Utc::now();
    }

    #[cfg(test)]
    pub(crate) fn set_updated_at(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }
}

/// Drop the middle of an over-long trace, keeping the first events for context
/// and a marker recording how many were dropped.
fn compact_trace(trace: &mut Vec<TraceEvent>, max_events: usize) {
    if trace.len() <= max_events {
        return;
    }
    if max_events < 2 {
        let excess = trace.len() - max_events;
        trace.drain(..excess);
        return;
    }

    let keep_start = 10.min(max_events / 2);
    let keep_end = max_events - keep_start - 1; // -1 for compaction marker
    let dropped = trace.len() - max_events + 1;

    let mut compacted = Vec::with_capacity(max_events);
    compacted.extend(trace.drain(..keep_start));
    compacted.push(TraceEvent::new(
        EventType::TraceCompacted,
        json!({
            "dropped_events": dropped,
            "kept_start": keep_start,
            "kept_end": keep_end,
        }),
    ));

    let remaining = trace.len();
    if remaining > keep_end {
        trace.drain(..remaining - keep_end);
    }
    compacted.append(trace);

    *trace = compacted;
}

/// Trace event for debugging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    /// Unique event identifier.
    pub id: String,

    /// When the event occurred.
    pub timestamp: DateTime<Utc>,

    /// Type of event.
    pub event_type: EventType,

    /// Event payload.
    pub payload: Value,
}

impl TraceEvent {
    #[must_use]
    pub fn new(event_type: EventType, payload: Value) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type,
            payload,
        }
    }
}

/// Types of trace events.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    /// Session started.
    SessionStart,
    /// User prompt received.
    PromptReceived,
    /// A gate denied a tool call or stop.
    GateDenied,
    /// A gate let a call through with a warning.
    GateWarned,
    /// Hydrator completed.
    HydrationCompleted,
    /// Critic completed.
    CriticCompleted,
    /// Compliance agent completed.
    ComplianceCompleted,
    /// Sub-agent or skill spawned.
    SubagentSpawned,
    /// Session bound to a task.
    TaskBound,
    /// Task binding released.
    TaskUnbound,
    /// Compliance block recorded.
    BlockRecorded,
    /// Compliance block cleared outside a compliance run.
    Unblocked,
    /// Trace was truncated due to `max_events` limit.
    TraceCompacted,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_state_new() {
        let state = SessionState::new("test-123");
        assert_eq!(state.session_id(), "test-123");
        assert_eq!(state.revision(), 0);
        assert!(!state.is_hydrated());
        assert!(state.turns_since_critic().is_none());
        assert!(!state.is_blocked());
        assert_eq!(state.critic_status(), CriticStatus::NotInvoked);
        assert_eq!(state.ops_since_compliance(), 0);
        assert!(state.current_task().is_none());
        assert!(state.trace().is_empty());
    }

    #[test]
    fn increment_leaves_uninitialised_counters_alone() {
        let mut state = SessionState::new("s");
        state.increment_turns();
        state.increment_turns();
        assert_eq!(state.turns_since_hydration(), None);
        assert_eq!(state.turns_since_critic(), None);
    }

    #[test]
    fn reset_hydration_then_increment() {
        let mut state = SessionState::new("s");
        state.reset_hydration(Some("fix the login bug"), Some("bugfix"));
        assert_eq!(state.turns_since_hydration(), Some(0));
        state.increment_turns();
        state.increment_turns();
        assert_eq!(state.turns_since_hydration(), Some(2));
        assert_eq!(state.hydrated_intent(), Some("fix the login bug"));
        assert_eq!(state.current_workflow(), Some("bugfix"));

        state.reset_hydration(None, None);
        assert_eq!(state.turns_since_hydration(), Some(0));
        // Previous intent survives a reset without a new one
        assert_eq!(state.hydrated_intent(), Some("fix the login bug"));
    }

    #[test]
    fn new_prompt_withdraws_critic_approval() {
        let mut state = SessionState::new("s");
        state.reset_critic(true);
        state.record_prompt("next request", false);
        assert_eq!(state.critic_status(), CriticStatus::NotInvoked);
        assert_eq!(state.turns_since_critic(), Some(0));
    }

    #[test]
    fn reset_critic_sets_status() {
        let mut state = SessionState::new("s");
        state.reset_critic(false);
        assert_eq!(state.critic_status(), CriticStatus::Invoked);
        assert_eq!(state.turns_since_critic(), Some(0));
        state.reset_critic(true);
        assert_eq!(state.critic_status(), CriticStatus::Verified);
    }

    #[test]
    fn reset_compliance_clears_block_and_counter() {
        let mut state = SessionState::new("s");
        for _ in 0..5 {
            state.increment_ops();
        }
        state.record_block(&BlockReason::new("scope drift").unwrap());
        assert!(state.is_blocked());
        assert_eq!(state.block_reason(), Some("scope drift"));

        state.reset_compliance();
        assert!(!state.is_blocked());
        assert!(state.block_reason().is_none());
        assert_eq!(state.ops_since_compliance(), 0);
        assert!(state.last_compliance_at().is_some());
    }

    #[test]
    fn counters_saturate() {
        let mut state = SessionState::new("s");
        state.state.ops_since_compliance = u32::MAX;
        state.increment_ops();
        assert_eq!(state.ops_since_compliance(), u32::MAX);
    }

    #[test]
    fn empty_block_reason_rejected() {
        assert!(BlockReason::new("").is_err());
        assert!(BlockReason::new("   ").is_err());
        assert_eq!(BlockReason::new(" drift ").unwrap().as_str(), "drift");
    }

    #[test]
    fn bind_task_keeps_existing_binding() {
        let mut state = SessionState::new("s");
        assert!(state.bind_task("task-1"));
        assert!(!state.bind_task("task-2"));
        assert_eq!(state.current_task().unwrap().task_id, "task-1");
        assert!(state.bind_task("task-1"));
    }

    #[test]
    fn unbind_task_only_matching() {
        let mut state = SessionState::new("s");
        state.bind_task("task-1");
        state.unbind_task(Some("task-2"));
        assert!(state.current_task().is_some());
        state.unbind_task(Some("task-1"));
        assert!(state.current_task().is_none());

        state.bind_task("task-3");
        state.unbind_task(None);
        assert!(state.current_task().is_none());
    }

    #[test]
    fn record_prompt_keeps_first_prompt() {
        let mut state = SessionState::new("s");
        state.record_prompt("first", false);
        state.record_prompt(".second", true);
        assert_eq!(state.original_prompt(), Some("first"));
        assert!(state.gates_bypassed());
        state.record_prompt("third", false);
        assert!(!state.gates_bypassed());
    }

    #[test]
    fn commit_bumps_revision() {
        let mut state = SessionState::new("s");
        let before = state.updated_at();
        state.commit();
        state.commit();
        assert_eq!(state.revision(), 2);
        assert!(state.updated_at() >= before);
    }

    #[test]
    fn serialization_round_trip_keeps_private_fields() {
        let mut state = SessionState::new("s");
        state.reset_hydration(Some("intent"), None);
        state.record_subagent("toolu_1", "prompt-hydrator", false);
        let json = serde_json::to_string(&state).unwrap();
        assert!(json.contains("turns_since_hydration"));
        assert!(json.contains("prompt-hydrator"));

        let parsed: SessionState = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.turns_since_hydration(), Some(0));
        assert_eq!(
            parsed.subagent("toolu_1").unwrap().subagent_type,
            "prompt-hydrator"
        );
    }

    #[test]
    fn minimal_document_deserializes() {
        let json = r#"{
            "session_id": "old",
            "created_at": "2026-01-31T10:00:00Z",
            "updated_at": "2026-01-31T10:00:00Z"
        }"#;
        let state: SessionState = serde_json::from_str(json).unwrap();
        assert_eq!(state.session_id(), "old");
        assert!(!state.is_hydrated());
    }

    #[test]
    fn event_type_serialization() {
        let json = serde_json::to_string(&EventType::HydrationCompleted).unwrap();
        assert_eq!(json, r#""hydration_completed""#);
        let json = serde_json::to_string(&CriticStatus::NotInvoked).unwrap();
        assert_eq!(json, r#""not_invoked""#);
    }

    // ========================================================================
    // Trace Compaction Tests
    // ========================================================================

    fn push_events(state: &mut SessionState, count: usize, max_events: usize) {
        for i in 0..count {
            state.record_event(EventType::PromptReceived, json!({"index": i}), max_events);
        }
    }

    #[test]
    fn trace_compaction_under_limit() {
        let mut state = SessionState::new("trace-test");
        push_events(&mut state, 50, 100);
        assert_eq!(state.trace().len(), 50);
        assert!(
            !state
                .trace()
                .iter()
                .any(|e| e.event_type == EventType::TraceCompacted)
        );
    }

    #[test]
    fn trace_compaction_at_limit() {
        let mut state = SessionState::new("trace-test");
        push_events(&mut state, 50, 50);
        assert_eq!(state.trace().len(), 50);
    }

    #[test]
    fn trace_compaction_over_limit() {
        let mut state = SessionState::new("trace-test");
        push_events(&mut state, 60, 50);
        assert!(state.trace().len() <= 50);
        assert!(
            state
                .trace()
                .iter()
                .any(|e| e.event_type == EventType::TraceCompacted)
        );
    }

    #[test]
    fn trace_compaction_preserves_first_and_last() {
        let mut state = SessionState::new("trace-test");
        push_events(&mut state, 200, 50);

        assert_eq!(state.trace()[0].payload["index"], 0);
        assert_eq!(state.trace()[9].payload["index"], 9);
        let last = state.trace().last().unwrap();
        assert_eq!(last.payload["index"], 199);
    }

    #[test]
    fn trace_compaction_tiny_limit() {
        let mut state = SessionState::new("trace-test");
        push_events(&mut state, 5, 1);
        assert_eq!(state.trace().len(), 1);
        assert_eq!(state.trace()[0].payload["index"], 4);
    }
}
