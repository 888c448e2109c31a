//! Metrics collection and exposition.
//!
//! # Metrics
//! - `ajp_requests_total` (counter): served requests by method, status
//! - `ajp_request_duration_seconds` (histogram): request to end-response latency
//! - `ajp_active_connections` (gauge): current front-end connection count
//! - `ajp_session_errors_total` (counter): sessions ended by an error, by kind
//!
//! # Design Decisions
//! - Without an installed recorder every call here is a no-op

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Record one completed request.
pub fn record_request(method: &str, status: u16, start: Instant) {
    let labels = [("method", method.to_string()), ("status", status.to_string())];
    ::metrics::counter!("ajp_requests_total", &labels).increment(1);
    ::metrics::histogram!("ajp_request_duration_seconds", &labels).record(start.elapsed().as_secs_f64());
}

pub fn connection_opened() {
    ::metrics::gauge!("ajp_active_connections").increment(1.0);
}

pub fn connection_closed() {
    ::metrics::gauge!("ajp_active_connections").decrement(1.0);
}

/// Record a session that ended with an error.
pub fn record_session_error(kind: &'static str) {
    ::metrics::counter!("ajp_session_errors_total", "kind" => kind).increment(1);
}
