//! Gate checks.
//!
//! Each check is a pure function of the invocation context, the current
//! session state and the policy. `None` means the gate has nothing to say.
//! Which checks run for which event and tool category is decided by the
//! registry table, not here.

use crate::config::GateMode;
use crate::core::detect::{
    SubagentRole, is_compliance_subagent, is_safe_temp_path, mentions_hydration_file,
    spawn_target,
};
use crate::core::gate::{Caller, GateContext, GateResult};
use crate::core::policy::Policy;
use crate::core::state::{CriticStatus, SessionState};
use crate::core::taxonomy::ToolCategory;

/// Sub-agent type of the caller, if the caller is a sub-agent we can identify.
///
/// The type comes from the invocation itself or, failing that, from the
/// spawn record written when the sub-agent was admitted.
#[must_use]
pub fn caller_type<'a>(ctx: &'a GateContext, state: &'a SessionState) -> Option<&'a str> {
    match &ctx.caller {
        Caller::Main => None,
        Caller::Subagent {
            agent_type: Some(agent_type),
            ..
        } => Some(agent_type.as_str()),
        Caller::Subagent {
            agent_type: None,
            agent_id: Some(agent_id),
        } => state.subagent(agent_id).map(|r| r.subagent_type.as_str()),
        Caller::Subagent { .. } => None,
    }
}

/// Compliance sub-agents are not held to the main agent's admission policies.
fn caller_is_compliance(ctx: &GateContext, state: &SessionState) -> bool {
    caller_type(ctx, state).is_some_and(is_compliance_subagent)
}

fn by_mode(mode: GateMode, message: String) -> GateResult {
    match mode {
        GateMode::Block => GateResult::deny(message),
        GateMode::Warn => GateResult::warn(message),
    }
}

/// Read-only sub-agents may not use mutating tools.
#[must_use]
pub fn check_subagent_restriction(
    ctx: &GateContext,
    state: &SessionState,
    policy: &Policy,
) -> Option<GateResult> {
    let tool = ctx.tool.as_ref()?;
    let agent = caller_type(ctx, state)?;
    if !policy.restricted.is_restricted(agent) {
        return None;
    }
    if policy.taxonomy.classify(&tool.name) != ToolCategory::Mutating {
        return None;
    }

    Some(GateResult::deny(format!(
        "[turnstile] {agent} is a read-only sub-agent and cannot use mutating tools ({}). \
         Return your findings to the main agent and let it make the change.",
        tool.name
    )))
}

/// Nothing but always-available tools until the hydrator has produced a plan.
#[must_use]
pub fn check_hydration_pending(
    ctx: &GateContext,
    state: &SessionState,
    policy: &Policy,
) -> Option<GateResult> {
    let tool = ctx.tool.as_ref()?;
    if state.is_hydrated() || state.gates_bypassed() {
        return None;
    }
    let category = policy.taxonomy.classify(&tool.name);
    if category == ToolCategory::AlwaysAvailable {
        return None;
    }
    if caller_is_compliance(ctx, state) {
        return None;
    }

    // The way out of this gate must stay open
    let spawns_hydrator = spawn_target(tool, category)
        .and_then(|t| SubagentRole::from_type(&t.subagent_type))
        == Some(SubagentRole::Hydrator);
    let reads_plan = policy.taxonomy.is_shell(&tool.name)
        && tool.command().is_some_and(|cmd| {
            mentions_hydration_file(cmd, &policy.hydration_dir, &policy.hydration_file_prefix)
                && !policy.bash.is_destructive(cmd)
        });
    if spawns_hydrator || reads_plan {
        return None;
    }

    Some(by_mode(
        policy.modes.hydration,
        format!(
            "[turnstile] Hydration required: this session has no execution plan yet, so {} is not available. \
             Invoke the prompt-hydrator sub-agent with the user's request and follow the plan it returns. \
             For trivial requests the user can prefix the prompt with '{}' to skip this.",
            tool.name, policy.bypass_prefix
        ),
    ))
}

/// The plan needs the critic's approval before the workspace changes.
///
/// Approval lasts until the next user prompt.
#[must_use]
pub fn check_critic_approval(
    ctx: &GateContext,
    state: &SessionState,
    policy: &Policy,
) -> Option<GateResult> {
    let tool = ctx.tool.as_ref()?;
    if state.critic_status() == CriticStatus::Verified || state.gates_bypassed() {
        return None;
    }
    if policy.taxonomy.is_task_binding(&tool.name) {
        return None;
    }
    if tool
        .target_path()
        .is_some_and(|p| is_safe_temp_path(p, &ctx.cwd, &policy.safe_temp_prefixes))
    {
        return None;
    }
    if policy.taxonomy.is_shell(&tool.name)
        && !policy.bash.is_destructive(tool.command().unwrap_or(""))
    {
        return None;
    }
    if caller_is_compliance(ctx, state) {
        return None;
    }

    Some(by_mode(
        policy.modes.critic,
        format!(
            "[turnstile] Critic approval required: the current plan has not been approved, so {} should wait. \
             Invoke the critic sub-agent on the plan and continue once it answers PROCEED or APPROVED.",
            tool.name
        ),
    ))
}

/// Mutating work must be attributed to an active task.
#[must_use]
pub fn check_task_binding(
    ctx: &GateContext,
    state: &SessionState,
    policy: &Policy,
) -> Option<GateResult> {
    let tool = ctx.tool.as_ref()?;
    if state.current_task().is_some() || state.gates_bypassed() {
        return None;
    }
    if policy.taxonomy.is_task_binding(&tool.name) {
        return None;
    }
    if tool
        .target_path()
        .is_some_and(|p| is_safe_temp_path(p, &ctx.cwd, &policy.safe_temp_prefixes))
    {
        return None;
    }
    if policy.taxonomy.is_shell(&tool.name)
        && !policy.bash.is_destructive(tool.command().unwrap_or(""))
    {
        return None;
    }
    if caller_is_compliance(ctx, state) {
        return None;
    }

    let create = policy
        .taxonomy
        .tools_in(ToolCategory::Mutating)
        .into_iter()
        .find(|t| policy.taxonomy.is_task_binding(t) && t.ends_with("create_task"))
        .unwrap_or("the task manager");
    Some(by_mode(
        policy.modes.task_binding,
        format!(
            "[turnstile] Task binding required: {} modifies the workspace but no task is active. \
             Create or claim a task with {create} and mark it active, then retry.",
            tool.name
        ),
    ))
}

/// Periodic compliance re-validation, plus the sticky compliance block.
#[must_use]
pub fn check_compliance_threshold(
    ctx: &GateContext,
    state: &SessionState,
    policy: &Policy,
) -> Option<GateResult> {
    ctx.tool.as_ref()?;
    if caller_is_compliance(ctx, state) {
        return None;
    }

    if state.is_blocked() {
        let reason = state.block_reason().unwrap_or("no reason recorded");
        return Some(GateResult::deny(format!(
            "[turnstile] Compliance block: {reason}. \
             Invoke the custodiet sub-agent to review recent work; the block clears when it completes."
        )));
    }

    let threshold = policy.threshold_for(state.current_workflow());
    let pending = state.ops_since_compliance().saturating_add(1);
    if pending < threshold {
        return None;
    }

    Some(by_mode(
        policy.modes.compliance,
        format!(
            "[turnstile] Compliance check due: {} mutating operations since the last check (limit {threshold}). \
             Invoke the custodiet sub-agent before continuing.",
            state.ops_since_compliance()
        ),
    ))
}

/// Do not stop right after the plan was approved.
#[must_use]
pub fn check_hydration_recency(
    _ctx: &GateContext,
    state: &SessionState,
    _policy: &Policy,
) -> Option<GateResult> {
    if state.turns_since_hydration() != Some(0) {
        return None;
    }
    Some(GateResult::deny(
        "[turnstile] The plan was just approved and no work has started. \
         Execute the plan now instead of stopping.",
    ))
}
