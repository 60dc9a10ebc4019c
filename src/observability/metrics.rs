//! Metrics collection and exposition.
//!
//! # Metrics
//! - `checkout_requests_total` (counter): checkout requests by status
//! - `checkout_request_duration_seconds` (histogram): checkout latency
//! - `telemetry_events_enqueued_total` (counter): accepted events by kind
//! - `telemetry_events_dropped_total` (counter): events lost to overflow or shutdown
//! - `telemetry_batches_sent_total` (counter): batches the collector accepted
//! - `telemetry_events_sent_total` (counter): events in those batches
//! - `telemetry_batches_dropped_total` (counter): batches abandoned after retries
//! - `telemetry_delivery_retries_total` (counter): retried delivery attempts
//!
//! Without an installed recorder every call here is a no-op.

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

pub fn record_checkout(status: u16, start: Instant) {
    counter!("checkout_requests_total", "status" => status.to_string()).increment(1);
    histogram!("checkout_request_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_enqueued(kind: &'static str) {
    counter!("telemetry_events_enqueued_total", "kind" => kind).increment(1);
}

pub fn record_events_dropped(count: u64) {
    counter!("telemetry_events_dropped_total").increment(count);
}

pub fn record_batch_sent(events: u64) {
    counter!("telemetry_batches_sent_total").increment(1);
    counter!("telemetry_events_sent_total").increment(events);
}

pub fn record_batch_dropped(events: u64) {
    counter!("telemetry_batches_dropped_total").increment(1);
    counter!("telemetry_events_dropped_total").increment(events);
}

pub fn record_delivery_retry() {
    counter!("telemetry_delivery_retries_total").increment(1);
}
