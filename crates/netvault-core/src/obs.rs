//! Structured lifecycle events for backup runs.
//!
//! Emitted at `info!`/`warn!` level with an `event` field so log
//! aggregation can key on the lifecycle stage rather than message text.

use tracing::{info, warn};

/// Emit event: a run started over a set of target devices.
pub fn emit_run_started(run_id: &str, trigger: &str, device_count: usize) {
    info!(
        event = "run.started",
        run_id = %run_id,
        trigger = %trigger,
        device_count = device_count,
    );
}

/// Emit event: one attempt for a device failed (it may still retry).
pub fn emit_attempt_failed(device: &str, attempt: u32, error: &dyn std::fmt::Display) {
    warn!(
        event = "job.attempt_failed",
        device = %device,
        attempt = attempt,
        error = %error,
    );
}

/// Emit event: a job reached a terminal state.
pub fn emit_job_finished(device: &str, state: &str, attempts: u32) {
    info!(
        event = "job.finished",
        device = %device,
        state = %state,
        attempts = attempts,
    );
}

/// Emit event: a run finalized with its aggregate outcome.
pub fn emit_run_finished(run_id: &str, duration_ms: u64, changed: usize, failed: usize) {
    info!(
        event = "run.finished",
        run_id = %run_id,
        duration_ms = duration_ms,
        changed = changed,
        failed = failed,
    );
}

/// Emit event: a cron tick fired while the previous scheduled run was
/// still active, so the tick was dropped.
pub fn emit_tick_skipped() {
    warn!(
        event = "scheduler.tick_skipped",
        "previous scheduled run still active; skipping this tick"
    );
}

/// Emit event: a notification sink failed to deliver (warning level; the
/// run itself is unaffected).
pub fn emit_notification_error(sink: &str, error: &dyn std::fmt::Display) {
    warn!(event = "notify.delivery_failed", sink = %sink, error = %error);
}
