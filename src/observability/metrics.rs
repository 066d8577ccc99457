//! Metrics collection and exposition.
//!
//! # Metrics
//! - `arbor_requests_total` (counter): requests by method, status, deciding stage
//! - `arbor_request_duration_seconds` (histogram): dispatch latency
//! - `arbor_module_cache_lookups_total` (counter): hits and misses
//! - `arbor_module_loads_total` (counter): load outcomes
//! - `arbor_module_cache_invalidations_total` (counter): single vs. full
//! - `arbor_cookies_rejected_total` (counter): dropped cookies by reason
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - The Prometheus exporter is optional and owns its own listener

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape endpoint.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_request(method: &str, status: u16, stage: &'static str, start: Instant) {
    ::metrics::counter!(
        "arbor_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "stage" => stage
    )
    .increment(1);
    ::metrics::histogram!("arbor_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_cache_lookup(result: &'static str) {
    ::metrics::counter!("arbor_module_cache_lookups_total", "result" => result).increment(1);
}

pub fn record_module_load(outcome: &'static str) {
    ::metrics::counter!("arbor_module_loads_total", "outcome" => outcome).increment(1);
}

pub fn record_cache_invalidation(kind: &'static str) {
    ::metrics::counter!("arbor_module_cache_invalidations_total", "kind" => kind).increment(1);
}

pub fn record_cookie_rejected(reason: &'static str) {
    ::metrics::counter!("arbor_cookies_rejected_total", "reason" => reason).increment(1);
}
