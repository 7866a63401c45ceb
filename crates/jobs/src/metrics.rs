//! Metric names recorded by the supervision core.
//!
//! Recording is a no-op until the binary installs a global recorder.

use metrics::{counter, gauge};

pub const JOBS_SPAWNED_TOTAL: &str = "remote_exec_jobs_spawned_total";
pub const JOBS_REAPED_TOTAL: &str = "remote_exec_jobs_reaped_total";
pub const JOBS_KILLED_TOTAL: &str = "remote_exec_jobs_killed_total";
pub const JOBS_LIVE: &str = "remote_exec_jobs_live";
pub const RUNS_TOTAL: &str = "remote_exec_runs_total";

pub(crate) fn record_spawned() {
    counter!(JOBS_SPAWNED_TOTAL).increment(1);
}

pub(crate) fn record_reaped(count: usize) {
    counter!(JOBS_REAPED_TOTAL).increment(count as u64);
}

pub(crate) fn record_killed(count: usize) {
    counter!(JOBS_KILLED_TOTAL).increment(count as u64);
}

pub(crate) fn record_live(count: usize) {
    gauge!(JOBS_LIVE).set(count as f64);
}

/// Record a finished run-to-completion request. `outcome` is one of
/// `exited`, `timeout` or `error`.
pub(crate) fn record_run(outcome: &'static str) {
    counter!(RUNS_TOTAL, "outcome" => outcome).increment(1);
}
