//! Evaluate one invocation against stored state and persist its transitions.

use crate::core::{Evaluation, GateContext, GateRegistry, GateResult};
use crate::storage::SessionStore;

/// Decide an invocation and commit the state changes it implies.
///
/// The decision is first made against a plain read. If it implies state
/// changes, it is made again inside `mutate` against the locked, freshly
/// re-read document, and that second evaluation is the one returned.
///
/// Storage failures fail open: the call is allowed with a degraded-mode
/// message. The exception is a denial whose only pending writes are trace
/// records, which stays a denial since losing the record changes nothing.
pub fn run_gate(ctx: &GateContext, registry: &GateRegistry, store: &dyn SessionStore) -> GateResult {
    let state = match store.get_or_create(&ctx.session_id) {
        Ok(state) => state,
        Err(e) => {
            tracing::warn!(error = %e, session = %ctx.session_id, "failed to load session state");
            return GateResult::degraded(&e);
        }
    };

    let first = registry.evaluate(ctx, &state);
    if first.transitions.is_empty() {
        log_verdict(ctx, &first.result);
        return first.result;
    }

    let max_events = registry.policy().max_events;
    let mut committed: Option<Evaluation> = None;
    let outcome = store.mutate(&ctx.session_id, &mut |fresh| {
        let evaluation = registry.evaluate(ctx, fresh);
        fresh.apply_all(&evaluation.transitions, max_events);
        committed = Some(evaluation);
    });

    match outcome {
        Ok(_) => {
            let result = committed.map_or(first.result, |evaluation| evaluation.result);
            log_verdict(ctx, &result);
            result
        }
        Err(e) if first.result.is_deny() && first.is_bookkeeping_only() => {
            tracing::warn!(
                error = %e,
                session = %ctx.session_id,
                "failed to record denial, denying anyway"
            );
            first.result
        }
        Err(e) => {
            tracing::warn!(
                error = %e,
                session = %ctx.session_id,
                transitions = first.transitions.len(),
                "failed to persist session state, failing open"
            );
            GateResult::degraded(&e)
        }
    }
}

fn log_verdict(ctx: &GateContext, result: &GateResult) {
    if result.is_deny() {
        tracing::info!(
            session = %ctx.session_id,
            event = %ctx.event,
            tool = ctx.tool_name().unwrap_or("-"),
            gate = result.gate().unwrap_or("-"),
            "denied"
        );
    } else {
        tracing::debug!(
            session = %ctx.session_id,
            event = %ctx.event,
            tool = ctx.tool_name().unwrap_or("-"),
            verdict = ?result.verdict,
            "admitted"
        );
    }
}
