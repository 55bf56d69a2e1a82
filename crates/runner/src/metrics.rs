//! Prometheus metrics for the submission pipeline
//!
//! Records `submissions_total` (counter, labelled by outcome) and
//! `submission_duration_seconds` (histogram) for every processed record.

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::error::RunnerError;

pub const SUBMISSIONS_TOTAL: &str = "submissions_total";
pub const SUBMISSION_DURATION: &str = "submission_duration_seconds";

/// Serve `/metrics` on the given address. Must run inside the tokio runtime.
pub fn install_exporter(address: &str) -> Result<(), RunnerError> {
    let addr: SocketAddr = address
        .parse()
        .map_err(|e| RunnerError::Config(format!("invalid METRICS_ADDRESS '{}': {}", address, e)))?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| RunnerError::Metrics(e.to_string()))?;

    tracing::info!(address = %addr, "Prometheus exporter listening");
    Ok(())
}

pub fn record_submission(outcome: &'static str, elapsed: Duration) {
    metrics::counter!(SUBMISSIONS_TOTAL, "outcome" => outcome).increment(1);
    metrics::histogram!(SUBMISSION_DURATION, "outcome" => outcome).record(elapsed.as_secs_f64());
}
