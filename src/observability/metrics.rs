//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define shield metrics (requests, latency, rejections, nonces, integrity)
//! - Expose Prometheus-compatible metrics endpoint
//!
//! # Metrics
//! - `shield_requests_total` (counter): requests by method, status
//! - `shield_request_duration_seconds` (histogram): end-to-end latency
//! - `shield_rate_limited_total` (counter): requests over their limit
//! - `shield_rejections_total` (counter): guard rejections by kind
//! - `shield_nonce_generated_total` (counter): nonces by origin
//!   (generated, reused)
//! - `shield_integrity_fetch_total` (counter): external asset fetches by
//!   outcome
//!
//! # Design Decisions
//! - The `metrics` facade is a no-op until a recorder is installed, so
//!   library code and tests record unconditionally

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("status", status.to_string()),
    ];
    metrics::counter!("shield_requests_total", &labels).increment(1);
    metrics::histogram!("shield_request_duration_seconds", &labels)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rate_limited() {
    metrics::counter!("shield_rate_limited_total").increment(1);
}

pub fn record_rejection(kind: &'static str) {
    metrics::counter!("shield_rejections_total", "kind" => kind).increment(1);
}

pub fn record_nonce(origin: &'static str) {
    metrics::counter!("shield_nonce_generated_total", "origin" => origin).increment(1);
}

pub fn record_integrity_fetch(outcome: &'static str) {
    metrics::counter!("shield_integrity_fetch_total", "outcome" => outcome).increment(1);
}
