//! Metrics for the broadcast dispatcher
//!
//! Emitted through the `metrics` facade; the embedding binary decides
//! whether and where to export them.

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record the final outcome of one delivery attempt
pub fn record_delivery(mode: &str, result: &str) {
    counter!(
        "bc_deliveries_total",
        "mode" => mode.to_string(),
        "result" => result.to_string()
    )
    .increment(1);
}

/// Record provider call latency
pub fn record_delivery_latency(duration: Duration) {
    histogram!("bc_delivery_duration_seconds").record(duration.as_secs_f64());
}

/// Record a rate-limit signal from the provider
pub fn record_rate_limited(requeued: bool) {
    counter!(
        "bc_rate_limit_signals_total",
        "requeued" => requeued.to_string()
    )
    .increment(1);
}

/// Record a job skipped because the run was cancelled
pub fn record_cancelled_job() {
    counter!("bc_jobs_cancelled_total").increment(1);
}

/// Record a directory removal attempt
pub fn record_removal(kind: &str, success: bool) {
    counter!(
        "bc_recipient_removals_total",
        "kind" => kind.to_string(),
        "success" => success.to_string()
    )
    .increment(1);
}

pub fn record_run_started(targets: usize) {
    counter!("bc_runs_started_total").increment(1);
    gauge!("bc_run_targets").set(targets as f64);
}

/// Record a broadcast command that never started
pub fn record_run_rejected(reason: &str) {
    counter!(
        "bc_runs_rejected_total",
        "reason" => reason.to_string()
    )
    .increment(1);
}

pub fn set_run_in_progress(running: bool) {
    gauge!("bc_run_in_progress").set(if running { 1.0 } else { 0.0 });
}

pub fn set_active_workers(count: usize) {
    gauge!("bc_active_workers").set(count as f64);
}
