//! Prometheus metrics exposition
//!
//! - `webhook_deliveries_total` (counter): label `outcome`
//!   (`accepted`, `invalid_signature`, `bad_algorithm`, `malformed`,
//!   `too_large`)

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus recorder and return a handle for rendering metrics.
///
/// Library metrics (`tremendous_*`) emitted in this process are rendered
/// through the same handle.
pub fn install_recorder() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
}

/// Record one webhook delivery with its outcome.
pub fn record_delivery(outcome: &'static str) {
    metrics::counter!("webhook_deliveries_total", "outcome" => outcome).increment(1);
}
