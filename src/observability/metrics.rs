//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gateway metrics (requests, submissions, confirmations, RPC calls)
//! - Expose a Prometheus-compatible scrape endpoint
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by method, route, status
//! - `gateway_request_duration_seconds` (histogram): latency distribution
//! - `ledger_submissions_total` (counter): submissions by tx type, engine result
//! - `ledger_confirmations_total` (counter): confirmation outcomes
//! - `ledger_confirmation_attempts` (histogram): lookups per confirmation
//! - `ledger_lookup_errors_total` (counter): lookup errors swallowed while polling
//! - `ledger_rpc_calls_total` (counter): RPC calls by method, outcome
//! - `ledger_rpc_healthy` (gauge): 1=reachable, 0=unreachable
//! - `ledger_registry_records` (gauge): submissions held in the registry
//!
//! Without an installed recorder every call is a no-op, so tests and the CLI
//! can use the instrumented code paths freely.

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Instant;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, route: &str, status: u16, start: Instant) {
    let labels = [
        ("method", method.to_string()),
        ("route", route.to_string()),
        ("status", status.to_string()),
    ];
    counter!("gateway_requests_total", &labels).increment(1);
    histogram!("gateway_request_duration_seconds", &labels).record(start.elapsed().as_secs_f64());
}

pub fn record_submission(tx_type: &'static str, engine_result: &str) {
    counter!(
        "ledger_submissions_total",
        "type" => tx_type,
        "engine_result" => engine_result.to_string()
    )
    .increment(1);
}

pub fn record_confirmation(outcome: &'static str, attempts: u32) {
    counter!("ledger_confirmations_total", "outcome" => outcome).increment(1);
    histogram!("ledger_confirmation_attempts").record(f64::from(attempts));
}

pub fn record_lookup_error() {
    counter!("ledger_lookup_errors_total").increment(1);
}

pub fn record_rpc_call(method: &str, outcome: &'static str) {
    counter!(
        "ledger_rpc_calls_total",
        "method" => method.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_ledger_health(healthy: bool) {
    gauge!("ledger_rpc_healthy").set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_registry_size(records: usize) {
    gauge!("ledger_registry_records").set(records as f64);
}
