//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, thresholds within 1..=100)
//! - Check addresses and URLs parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::{RetryConfig, ServiceConfig};

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validate a parsed configuration, collecting every issue.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_socket_addr(&mut errors, "users.bind_address", &config.users.bind_address);
    check_socket_addr(&mut errors, "orders.bind_address", &config.orders.bind_address);
    if config.observability.metrics_enabled {
        check_socket_addr(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if config.orders.queue.trim().is_empty() {
        errors.push(ValidationError::new("orders.queue", "must not be empty"));
    }
    if config.orders.routing_keys.is_empty() {
        errors.push(ValidationError::new("orders.routing_keys", "at least one routing key is required"));
    }
    if config.orders.routing_keys.iter().any(|k| k.trim().is_empty()) {
        errors.push(ValidationError::new("orders.routing_keys", "routing keys must not be empty"));
    }

    if let Err(e) = Url::parse(&config.dependency.base_url) {
        errors.push(ValidationError::new("dependency.base_url", e.to_string()));
    }
    if config.dependency.timeout_ms == 0 {
        errors.push(ValidationError::new("dependency.timeout_ms", "must be greater than 0"));
    }

    let breaker = &config.breaker;
    if breaker.timeout_ms == 0 {
        errors.push(ValidationError::new("breaker.timeout_ms", "must be greater than 0"));
    }
    if !(1..=100).contains(&breaker.error_threshold_percentage) {
        errors.push(ValidationError::new(
            "breaker.error_threshold_percentage",
            "must be between 1 and 100",
        ));
    }
    if breaker.reset_timeout_ms == 0 {
        errors.push(ValidationError::new("breaker.reset_timeout_ms", "must be greater than 0"));
    }
    if breaker.rolling_buckets == 0 {
        errors.push(ValidationError::new("breaker.rolling_buckets", "must be at least 1"));
    } else if breaker.rolling_window_ms == 0
        || breaker.rolling_window_ms % u64::from(breaker.rolling_buckets) != 0
    {
        errors.push(ValidationError::new(
            "breaker.rolling_window_ms",
            "must be a positive multiple of rolling_buckets",
        ));
    }

    if let Err(e) = Url::parse(&config.broker.url) {
        errors.push(ValidationError::new("broker.url", e.to_string()));
    }
    if config.broker.exchange.trim().is_empty() {
        errors.push(ValidationError::new("broker.exchange", "must not be empty"));
    }

    check_retry(&mut errors, "retries.connect", &config.retries.connect);
    check_retry(&mut errors, "retries.validation", &config.retries.validation);

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::new("timeouts.request_secs", "must be greater than 0"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_socket_addr(errors: &mut Vec<ValidationError>, field: &str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(field, format!("'{}' is not a socket address", value)));
    }
}

fn check_retry(errors: &mut Vec<ValidationError>, prefix: &str, retry: &RetryConfig) {
    if retry.max_attempts == 0 {
        errors.push(ValidationError::new(format!("{}.max_attempts", prefix), "must be at least 1"));
    }
    if retry.factor.is_nan() || retry.factor < 1.0 {
        errors.push(ValidationError::new(format!("{}.factor", prefix), "must be at least 1.0"));
    }
    if let Some(max) = retry.max_delay_ms {
        if max < retry.min_delay_ms {
            errors.push(ValidationError::new(
                format!("{}.max_delay_ms", prefix),
                "must not be below min_delay_ms",
            ));
        }
    }
}
