//! Configuration loading from disk and environment.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;

use crate::broker::ExchangeKind;
use crate::config::schema::{LogFormat, ServiceConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {var}: '{value}'")]
    Override { var: &'static str, value: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load configuration: TOML file (if given), then environment overrides, then validation.
pub fn load(path: Option<&Path>) -> Result<ServiceConfig, ConfigError> {
    load_with(path, |var| std::env::var(var).ok())
}

/// Same as [`load`], resolving override variables through `lookup`.
pub fn load_with<F>(path: Option<&Path>, lookup: F) -> Result<ServiceConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = match path {
        Some(path) => read_file(path)?,
        None => ServiceConfig::default(),
    };

    apply_overrides(&mut config, lookup)?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

fn read_file(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Apply environment-style overrides using `lookup` to resolve variable names.
pub fn apply_overrides<F>(config: &mut ServiceConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("USERS_BIND_ADDRESS") {
        config.users.bind_address = v;
    }
    if let Some(v) = lookup("ORDERS_BIND_ADDRESS") {
        config.orders.bind_address = v;
    }
    if let Some(v) = lookup("USERS_BASE_URL") {
        config.dependency.base_url = v;
    }
    if let Some(v) = lookup("RABBITMQ_URL") {
        config.broker.url = v;
    }
    if let Some(v) = lookup("EXCHANGE") {
        config.broker.exchange = v;
    }
    if let Some(v) = lookup("EXCHANGE_TYPE") {
        config.broker.exchange_kind = match v.to_ascii_lowercase().as_str() {
            "direct" => ExchangeKind::Direct,
            "topic" => ExchangeKind::Topic,
            "fanout" => ExchangeKind::Fanout,
            _ => return Err(ConfigError::Override { var: "EXCHANGE_TYPE", value: v }),
        };
    }
    if let Some(v) = lookup("QUEUE") {
        config.orders.queue = v;
    }
    if let Some(v) = lookup("ROUTING_KEY_USER_CREATED") {
        // The created-topic key is always the first binding.
        match config.orders.routing_keys.first_mut() {
            Some(first) => *first = v,
            None => config.orders.routing_keys.push(v),
        }
    }
    if let Some(v) = lookup("LOG_LEVEL") {
        config.observability.log_level = v;
    }
    if let Some(v) = lookup("LOG_FORMAT") {
        config.observability.log_format = match v.to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            _ => return Err(ConfigError::Override { var: "LOG_FORMAT", value: v }),
        };
    }

    parse_into(&lookup, "HTTP_TIMEOUT_MS", &mut config.dependency.timeout_ms)?;
    parse_into(&lookup, "BREAKER_TIMEOUT_MS", &mut config.breaker.timeout_ms)?;
    parse_into(&lookup, "BREAKER_ERROR_THRESHOLD", &mut config.breaker.error_threshold_percentage)?;
    parse_into(&lookup, "BREAKER_RESET_TIMEOUT_MS", &mut config.breaker.reset_timeout_ms)?;

    parse_into(&lookup, "CONNECT_RETRY_ATTEMPTS", &mut config.retries.connect.max_attempts)?;
    parse_into(&lookup, "CONNECT_RETRY_FACTOR", &mut config.retries.connect.factor)?;
    parse_into(&lookup, "CONNECT_RETRY_MIN_DELAY_MS", &mut config.retries.connect.min_delay_ms)?;
    parse_into(&lookup, "VALIDATION_RETRY_ATTEMPTS", &mut config.retries.validation.max_attempts)?;
    parse_into(&lookup, "VALIDATION_RETRY_FACTOR", &mut config.retries.validation.factor)?;
    parse_into(&lookup, "VALIDATION_RETRY_MIN_DELAY_MS", &mut config.retries.validation.min_delay_ms)?;

    Ok(())
}

fn parse_into<F, T>(lookup: &F, var: &'static str, target: &mut T) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    if let Some(value) = lookup(var) {
        *target = value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Override { var, value })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_overrides_applied() {
        let vars = env(&[
            ("USERS_BASE_URL", "http://users:3001"),
            ("HTTP_TIMEOUT_MS", "750"),
            ("QUEUE", "orders.events"),
            ("ROUTING_KEY_USER_CREATED", "people.created"),
            ("VALIDATION_RETRY_ATTEMPTS", "4"),
            ("LOG_FORMAT", "JSON"),
        ]);
        let mut config = ServiceConfig::default();
        apply_overrides(&mut config, |k| vars.get(k).cloned()).unwrap();

        assert_eq!(config.dependency.base_url, "http://users:3001");
        assert_eq!(config.dependency.timeout_ms, 750);
        assert_eq!(config.orders.queue, "orders.events");
        assert_eq!(config.orders.routing_keys[0], "people.created");
        assert_eq!(config.orders.routing_keys[1], "user.updated");
        assert_eq!(config.retries.validation.max_attempts, 4);
        assert_eq!(config.observability.log_format, LogFormat::Json);
    }

    #[test]
    fn test_bad_numeric_override_is_an_error() {
        let vars = env(&[("BREAKER_RESET_TIMEOUT_MS", "soon")]);
        let mut config = ServiceConfig::default();
        let err = apply_overrides(&mut config, |k| vars.get(k).cloned()).unwrap_err();

        assert!(matches!(err, ConfigError::Override { var: "BREAKER_RESET_TIMEOUT_MS", .. }));

        let vars = env(&[("EXCHANGE_TYPE", "headers")]);
        let err = apply_overrides(&mut config, |k| vars.get(k).cloned()).unwrap_err();
        assert!(matches!(err, ConfigError::Override { var: "EXCHANGE_TYPE", .. }));
    }

    #[test]
    fn test_load_config_from_file() {
        let path = std::env::temp_dir().join(format!("svc-config-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(&path, "[broker]\nexchange = \"events.topic\"\n").unwrap();

        let vars = env(&[("EXCHANGE_TYPE", "Fanout")]);
        let config = load_with(Some(&path), |k| vars.get(k).cloned()).unwrap();
        assert_eq!(config.broker.exchange, "events.topic");
        assert_eq!(config.broker.exchange_kind, ExchangeKind::Fanout);

        std::fs::remove_file(&path).unwrap_or_default();
    }

    #[test]
    fn test_invalid_file_rejected() {
        let path = std::env::temp_dir().join(format!("svc-config-{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(&path, "[breaker]\nerror_threshold_percentage = 150\n").unwrap();

        let err = load_with(Some(&path), |_| None).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(ref errors) if errors.len() == 1));

        std::fs::remove_file(&path).unwrap_or_default();
    }
}
