//! Metrics collection and exposition.
//!
//! # Metrics
//! - `client_requests_total` (counter): terminal outcomes by target, outcome
//! - `client_request_duration_seconds` (histogram): whole-chain latency
//! - `client_retries_total` (counter): reissued attempts by target, reason
//! - `client_circuit_rejections_total` (counter): fast-failed calls by target
//! - `client_circuit_open` (gauge): 1=open, 0.5=half-open, 0=closed
//! - `client_token_refreshes_total` (counter): underlying refresh calls by outcome
//! - `client_notifications_total` (counter): error reports, emitted or suppressed
//!
//! Without an installed recorder every call here is a no-op.

use std::net::SocketAddr;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::time::Instant;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(target: &str, outcome: &'static str, start: Instant) {
    counter!("client_requests_total", "target" => target.to_string(), "outcome" => outcome).increment(1);
    histogram!("client_request_duration_seconds", "target" => target.to_string())
        .record(start.elapsed().as_secs_f64());
}

pub fn record_retry(target: &str, reason: &'static str) {
    counter!("client_retries_total", "target" => target.to_string(), "reason" => reason).increment(1);
}

pub fn record_circuit_rejection(target: &str) {
    counter!("client_circuit_rejections_total", "target" => target.to_string()).increment(1);
}

pub fn record_circuit_state(target: &str, status: &'static str) {
    let value = match status {
        "open" => 1.0,
        "half_open" => 0.5,
        _ => 0.0,
    };
    gauge!("client_circuit_open", "target" => target.to_string()).set(value);
}

pub fn record_token_refresh(outcome: &'static str) {
    counter!("client_token_refreshes_total", "outcome" => outcome).increment(1);
}

pub fn record_notification(emitted: bool) {
    let result = if emitted { "emitted" } else { "suppressed" };
    counter!("client_notifications_total", "result" => result).increment(1);
}
