//! Metrics collection and exposition.
//!
//! # Metrics
//! - `shield_requests_total` (counter): guarded requests by method, status, stage
//! - `shield_request_duration_seconds` (histogram): guarded request latency
//! - `shield_rejections_total` (counter): pipeline rejections by stage
//! - `shield_rate_limited_total` (counter): rate-limit rejections by endpoint
//! - `shield_audit_writes_total` (counter): audit writes by result
//! - `shield_alerts_total` (counter): alerts by result (sent, failed, dropped)
//!
//! # Design Decisions
//! - Labels are low-cardinality: endpoint labels use the route template,
//!   never the raw path

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_request(method: &str, status: u16, stage: &'static str, start: Instant) {
    metrics::counter!(
        "shield_requests_total",
        "method" => method.to_string(),
        "status" => status.to_string(),
        "stage" => stage,
    )
    .increment(1);
    metrics::histogram!("shield_request_duration_seconds", "stage" => stage)
        .record(start.elapsed().as_secs_f64());
}

pub fn record_rejection(stage: &'static str) {
    metrics::counter!("shield_rejections_total", "stage" => stage).increment(1);
}

pub fn record_rate_limited(endpoint: &str) {
    metrics::counter!("shield_rate_limited_total", "endpoint" => endpoint.to_string()).increment(1);
}

pub fn record_audit_write(result: &'static str) {
    metrics::counter!("shield_audit_writes_total", "result" => result).increment(1);
}

pub fn record_alert(result: &'static str) {
    metrics::counter!("shield_alerts_total", "result" => result).increment(1);
}
