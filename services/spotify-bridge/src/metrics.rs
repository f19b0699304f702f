//! Prometheus metrics exposition
//!
//! Metrics served on `/metrics`:
//!
//! - `bridge_requests_total` (counter): labels `endpoint`, `status`
//! - `bridge_request_duration_seconds` (histogram): label `endpoint`
//! - `token_refreshes_total` (counter, emitted by the session crate):
//!   label `outcome`

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering.
///
/// Configures `bridge_request_duration_seconds` with explicit buckets so it
/// renders as a histogram (with `_bucket` lines) rather than the default
/// summary. Boundaries cover 5ms to 30s, the upper end bounded by the
/// configurable upstream timeout.
pub fn install_recorder() -> PrometheusHandle {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Full(
                "bridge_request_duration_seconds".to_string(),
            ),
            &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0],
        )
        .expect("failed to set histogram buckets")
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Record a completed request with endpoint and status labels.
pub fn record_request(endpoint: &str, status: u16, duration_secs: f64) {
    metrics::counter!(
        "bridge_requests_total",
        "endpoint" => endpoint.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    metrics::histogram!(
        "bridge_request_duration_seconds",
        "endpoint" => endpoint.to_string()
    )
    .record(duration_secs);
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusRecorder;

    #[test]
    fn record_functions_do_not_panic_without_recorder() {
        // With no recorder installed, metrics calls are no-ops.
        record_request("spotify", 200, 0.05);
    }

    /// Isolated recorder/handle pair; install_recorder() can only be
    /// called once per process, which breaks parallel tests.
    fn isolated_recorder() -> (PrometheusRecorder, PrometheusHandle) {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        (recorder, handle)
    }

    #[test]
    fn record_request_writes_counter_with_labels() {
        let (recorder, handle) = isolated_recorder();
        let _guard = metrics::set_default_local_recorder(&recorder);

        record_request("spotify", 200, 0.042);
        record_request("spotify/play", 502, 1.2);

        let output = handle.render();
        assert!(output.contains("bridge_requests_total"));
        assert!(output.contains("endpoint=\"spotify\""));
        assert!(output.contains("status=\"200\""));
        assert!(output.contains("endpoint=\"spotify/play\""));
        assert!(output.contains("status=\"502\""));
    }
}
