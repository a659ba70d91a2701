//! Prometheus metrics for the client runtime.
//!
//! Installs a global Prometheus recorder using `metrics-exporter-prometheus`
//! and defines the metric name constants the orchestrator emits. Embedding
//! applications render the scrape output from the returned handle.

use metrics::{counter, describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;

// -- Metric name constants ----------------------------------------------------

/// Total requests executed (counter). Labels: service, operation.
pub const REQUESTS_TOTAL: &str = "aws_requests_total";

/// Request duration in seconds, measured across retries (histogram).
/// Labels: service, operation.
pub const REQUEST_DURATION: &str = "aws_request_duration";

/// Requests that ended in an error after all retries (counter).
/// Labels: service, operation.
pub const REQUEST_ERRORS: &str = "aws_request_errors";

/// Individual retry attempts scheduled (counter). Labels: service, operation.
pub const RETRIES_TOTAL: &str = "aws_request_retries";

// -- Global recorder installation ---------------------------------------------

/// Singleton handle to the Prometheus recorder.
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Install the global Prometheus metrics recorder. Idempotent -- safe to call
/// multiple times (e.g. in tests). Returns a reference to the global handle.
pub fn init_metrics() -> &'static PrometheusHandle {
    PROMETHEUS_HANDLE.get_or_init(|| {
        PrometheusBuilder::new()
            .install_recorder()
            .expect("failed to install Prometheus recorder")
    })
}

/// Register metric descriptions with the global recorder. Call once after
/// `init_metrics()`.
pub fn describe_metrics() {
    describe_counter!(REQUESTS_TOTAL, "Total requests executed");
    describe_histogram!(
        REQUEST_DURATION,
        "Request duration in seconds, across retries"
    );
    describe_counter!(
        REQUEST_ERRORS,
        "Requests that failed after exhausting retries"
    );
    describe_counter!(RETRIES_TOTAL, "Retry attempts scheduled");

    // Seed the counters so they appear in scrape output before traffic.
    counter!(REQUESTS_TOTAL, "service" => "seed", "operation" => "seed").absolute(0);
    counter!(REQUEST_ERRORS, "service" => "seed", "operation" => "seed").absolute(0);
    counter!(RETRIES_TOTAL, "service" => "seed", "operation" => "seed").absolute(0);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let first = init_metrics() as *const PrometheusHandle;
        let second = init_metrics() as *const PrometheusHandle;
        assert_eq!(first, second);
        describe_metrics();
    }
}
