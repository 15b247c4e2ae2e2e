//! Structured lifecycle events for qualification runs.
//!
//! - [`run_span`] tags every event of a run with its `run_id`
//! - `emit_*` functions log one `event = "..."` record per lifecycle point
//!
//! Events are emitted at `info!` level, except skips which are `warn!`.

use qualifier_domain::ParticipantId;
use tracing::{info, warn, Span};

/// Span tagging everything logged during one run with its `run_id`.
///
/// Runs are async, so attach it with `tracing::Instrument` rather than
/// entering it:
///
/// ```ignore
/// execute_tree().instrument(run_span(&run_id)).await
/// ```
pub fn run_span(run_id: &str) -> Span {
    tracing::info_span!("qualifier.run", run_id = %run_id)
}

/// Emit event: run started for the root action.
pub fn emit_run_started(run_id: &str, root_action: &str, resources: usize) {
    info!(event = "run.started", run_id = %run_id, root_action = %root_action, resources);
}

/// Emit event: run finished with duration and overall outcome.
pub fn emit_run_finished(run_id: &str, duration_ms: u64, scenarios: usize, successful: bool) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        scenarios = scenarios,
        successful = successful,
    );
}

/// Emit event: a declared action was not executed.
pub fn emit_action_skipped(kind: &str, type_name: &str, reason: &str) {
    warn!(event = "action.skipped", kind = %kind, type_name = %type_name, reason = %reason);
}

/// Emit event: a scenario finished, including its cleanup.
pub fn emit_scenario_finished(
    scenario_type: &str,
    successful: bool,
    failed_checks: usize,
    errored: bool,
) {
    info!(
        event = "scenario.finished",
        scenario_type = %scenario_type,
        successful = successful,
        failed_checks = failed_checks,
        errored = errored,
    );
}

/// Emit event: one capability decided for one participant.
pub fn emit_capability_evaluated(
    suite: &str,
    capability: &str,
    participant: &ParticipantId,
    verified: bool,
) {
    info!(
        event = "capability.evaluated",
        suite = %suite,
        capability = %capability,
        participant = %participant,
        verified = verified,
    );
}
