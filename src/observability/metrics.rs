//! Metrics collection and exposition.
//!
//! # Metrics
//! - `retry_attempts_total` (counter): attempts by policy and outcome
//! - `breaker_transitions_total` (counter): state changes by breaker, from, to
//! - `breaker_state` (gauge): 0=closed, 1=half-open, 2=open
//! - `breaker_fallbacks_total` (counter): fallback invocations by reason
//! - `consistency_cache_entries` (gauge): cached foreign entities
//! - `events_consumed_total` (counter): by routing key and outcome
//! - `events_published_total` (counter): by routing key and outcome
//! - `reference_checks_total` (counter): validator outcomes
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op
//! - Prometheus exposition is opt-in via configuration

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

use crate::resilience::BreakerState;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_retry_attempt(policy: &str, outcome: &'static str) {
    counter!("retry_attempts_total", "policy" => policy.to_string(), "outcome" => outcome).increment(1);
}

pub fn record_breaker_state(breaker: &str, state: BreakerState) {
    let value = match state {
        BreakerState::Closed => 0.0,
        BreakerState::HalfOpen => 1.0,
        BreakerState::Open => 2.0,
    };
    gauge!("breaker_state", "breaker" => breaker.to_string()).set(value);
}

pub fn record_breaker_transition(breaker: &str, from: BreakerState, to: BreakerState) {
    counter!(
        "breaker_transitions_total",
        "breaker" => breaker.to_string(),
        "from" => from.as_str(),
        "to" => to.as_str()
    )
    .increment(1);
    record_breaker_state(breaker, to);
}

pub fn record_fallback(breaker: &str, reason: &'static str) {
    counter!("breaker_fallbacks_total", "breaker" => breaker.to_string(), "reason" => reason).increment(1);
}

pub fn record_cache_size(size: usize) {
    gauge!("consistency_cache_entries").set(size as f64);
}

pub fn record_event_consumed(routing_key: &str, outcome: &'static str) {
    counter!(
        "events_consumed_total",
        "routing_key" => routing_key.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_event_published(routing_key: &str, outcome: &'static str) {
    counter!(
        "events_published_total",
        "routing_key" => routing_key.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_reference_check(outcome: &'static str) {
    counter!("reference_checks_total", "outcome" => outcome).increment(1);
}
