//! Prometheus exposition for the supervision core.
//!
//! `remote-exec-jobs` records job and run counters through the `metrics`
//! facade and stays exporter-agnostic; the binary installs the Prometheus
//! recorder here once at startup and `/metrics` renders from the stored handle.

use std::sync::OnceLock;

use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use remote_exec_jobs::metrics as names;

static PROMETHEUS: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the Prometheus recorder as the global `metrics` recorder.
///
/// Returns `false` when a recorder was already installed, by an earlier
/// call or by someone else.
pub fn init_metrics() -> bool {
    if PROMETHEUS.get().is_some() {
        return false;
    }

    let recorder = PrometheusBuilder::new().build_recorder();
    let handle = recorder.handle();
    if let Err(e) = metrics::set_global_recorder(recorder) {
        tracing::warn!(error = %e, "global metrics recorder already set; /metrics stays empty");
        return false;
    }
    // Lost race with a concurrent init; both handles read the same recorder.
    let _ = PROMETHEUS.set(handle);

    describe_counter!(names::JOBS_SPAWNED_TOTAL, "Background jobs registered");
    describe_counter!(
        names::JOBS_REAPED_TOTAL,
        "Background jobs removed after their process exited"
    );
    describe_counter!(
        names::JOBS_KILLED_TOTAL,
        "Background jobs removed by a kill request, a deadline or shutdown"
    );
    describe_gauge!(names::JOBS_LIVE, "Background jobs currently registered");
    describe_counter!(
        names::RUNS_TOTAL,
        "Run-to-completion requests by outcome (exited, timeout, error)"
    );

    tracing::debug!("prometheus recorder installed");
    true
}

/// Current exposition text, or `None` before [`init_metrics`].
pub fn render_metrics() -> Option<String> {
    PROMETHEUS.get().map(PrometheusHandle::render)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_is_noop() {
        let _ = init_metrics();
        assert!(!init_metrics());
        assert!(render_metrics().is_some());
    }
}
