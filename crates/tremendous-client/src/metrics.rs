//! Client metrics
//!
//! Emitted through the `metrics` facade; they are no-ops unless the embedding
//! application installs a recorder.
//!
//! - `tremendous_requests_total` (counter): label `status`
//! - `tremendous_token_refresh_total` (counter): label `outcome`
//!   (`success`, `failure`, `coalesced`, `coalesced_failure`)

/// Record one transmitted request with its response status.
pub fn record_request(status: u16) {
    metrics::counter!("tremendous_requests_total", "status" => status.to_string()).increment(1);
}

/// Record the outcome of a refresh attempt.
pub fn record_refresh(outcome: &'static str) {
    metrics::counter!("tremendous_token_refresh_total", "outcome" => outcome).increment(1);
}
