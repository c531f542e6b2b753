//! Metrics collection and exposition.
//!
//! # Metrics
//! - `breaker_outcomes_total` (counter): outcomes by operation, outcome
//! - `breaker_latency_ms` (histogram): latency of calls that reached the operation
//! - `breaker_state_transitions_total` (counter): by operation, from, to
//! - `breaker_open_alerts_total` (counter): observer alerts by operation
//! - `breaker_in_flight` (gauge): calls currently executing per operation

use std::net::SocketAddr;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::circuit_breaker::CircuitStatus;
use crate::resilience::registry::OperationKey;
use crate::resilience::rolling_window::Outcome;

/// Install the Prometheus recorder and its scrape endpoint.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_outcome(key: &OperationKey, outcome: Outcome, latency: Duration) {
    counter!(
        "breaker_outcomes_total",
        "operation" => key.to_string(),
        "outcome" => outcome.as_str()
    )
    .increment(1);

    if outcome.is_attempt() {
        histogram!("breaker_latency_ms", "operation" => key.to_string())
            .record(latency.as_secs_f64() * 1000.0);
    }
}

pub fn record_state_transition(key: &OperationKey, from: CircuitStatus, to: CircuitStatus) {
    counter!(
        "breaker_state_transitions_total",
        "operation" => key.to_string(),
        "from" => from.as_str(),
        "to" => to.as_str()
    )
    .increment(1);
}

pub fn record_open_alert(key: &OperationKey) {
    counter!("breaker_open_alerts_total", "operation" => key.to_string()).increment(1);
}

pub fn record_in_flight(key: &OperationKey, in_flight: usize) {
    gauge!("breaker_in_flight", "operation" => key.to_string()).set(in_flight as f64);
}
