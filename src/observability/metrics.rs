//! Metrics collection and exposition.
//!
//! # Metrics
//! - `shutdown_phase_total` (counter): phase entries, by phase
//! - `server_requests_rejected_total` (counter): requests turned away, by server
//! - `server_stop_failures_total` (counter): failed stop operations, by server
//! - `shutdown_callbacks_total` (counter): callbacks that ran to completion
//! - `shutdown_forced_total` (counter): forced exits, by reason
//! - `shutdown_duration_seconds` (histogram): first signal to `Done`
//!
//! # Design Decisions
//! - The `metrics` facade is a no-op until a recorder is installed
//! - Prometheus exporter is optional and owns its own listener

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_phase(phase: &'static str) {
    metrics::counter!("shutdown_phase_total", "phase" => phase).increment(1);
}

pub fn record_rejected(server: &str) {
    metrics::counter!("server_requests_rejected_total", "server" => server.to_string()).increment(1);
}

pub fn record_stop_failure(server: &str) {
    metrics::counter!("server_stop_failures_total", "server" => server.to_string()).increment(1);
}

pub fn record_callback_done() {
    metrics::counter!("shutdown_callbacks_total").increment(1);
}

pub fn record_forced(reason: &'static str) {
    metrics::counter!("shutdown_forced_total", "reason" => reason).increment(1);
}

pub fn record_shutdown_duration(elapsed: Duration) {
    metrics::histogram!("shutdown_duration_seconds").record(elapsed.as_secs_f64());
}
