//! Structured log events for the pipeline run lifecycle.
//!
//! Every event carries `event` and `run_id` fields so a run can be followed
//! through JSON logs. Stage errors are logged here once, at the point they
//! stop the run.

use tracing::{info, warn};

/// Emit event: run accepted and started.
pub fn emit_run_started(run_id: &str, repository: &str, strategy: &str) {
    info!(
        event = "run.started",
        run_id = %run_id,
        repository = %repository,
        strategy = %strategy,
    );
}

/// Emit event: a stage finished successfully.
pub fn emit_stage_finished(run_id: &str, stage: &str, duration_ms: u64) {
    info!(
        event = "stage.finished",
        run_id = %run_id,
        stage = %stage,
        duration_ms = duration_ms,
    );
}

/// Emit event: a stage failed and the run stops.
pub fn emit_run_failed(run_id: &str, stage: &str, error: &dyn std::fmt::Display) {
    warn!(event = "run.failed", run_id = %run_id, stage = %stage, error = %error);
}

/// Emit event: run finished with its publication outcome.
pub fn emit_run_finished(run_id: &str, duration_ms: u64, outcome: &str) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        outcome = %outcome,
    );
}

/// Emit event: an event was rejected before any stage ran.
pub fn emit_event_rejected(error: &dyn std::fmt::Display) {
    warn!(event = "event.rejected", error = %error);
}
