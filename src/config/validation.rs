//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (sizes > 0, deadlines > 0)
//! - Validate addresses and URLs
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Validation is a pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ServiceConfig;

/// A single semantic problem with a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Check a configuration, collecting every problem found.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "listener.bind_address",
            format!("'{}' is not a socket address", config.listener.bind_address),
        ));
    }
    if config.listener.request_timeout_secs == 0 {
        errors.push(ValidationError::new("listener.request_timeout_secs", "must be greater than 0"));
    }

    let telemetry = &config.telemetry;
    if let Some(url) = &telemetry.collector_url {
        match url::Url::parse(url) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            Ok(parsed) => errors.push(ValidationError::new(
                "telemetry.collector_url",
                format!("unsupported scheme '{}'", parsed.scheme()),
            )),
            Err(e) => errors.push(ValidationError::new("telemetry.collector_url", e.to_string())),
        }
    }
    if telemetry.service_name.trim().is_empty() {
        errors.push(ValidationError::new("telemetry.service_name", "must not be empty"));
    }
    if telemetry.batch_max_count == 0 {
        errors.push(ValidationError::new("telemetry.batch_max_count", "must be greater than 0"));
    }
    if telemetry.queue_capacity == 0 {
        errors.push(ValidationError::new("telemetry.queue_capacity", "must be greater than 0"));
    }
    if telemetry.request_timeout_secs == 0 {
        errors.push(ValidationError::new("telemetry.request_timeout_secs", "must be greater than 0"));
    }
    if telemetry.shutdown_deadline_ms == 0 {
        errors.push(ValidationError::new("telemetry.shutdown_deadline_ms", "must be greater than 0"));
    }
    if telemetry.retry.max_attempts == 0 {
        errors.push(ValidationError::new("telemetry.retry.max_attempts", "must be at least 1"));
    }
    if telemetry.retry.base_delay_ms > telemetry.retry.max_delay_ms {
        errors.push(ValidationError::new(
            "telemetry.retry.base_delay_ms",
            "must not exceed retry.max_delay_ms",
        ));
    }

    let observability = &config.observability;
    if observability.metrics_enabled && observability.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&ServiceConfig::default()).is_ok());
    }

    #[test]
    fn test_reports_every_error() {
        let mut config = ServiceConfig::default();
        config.listener.bind_address = "nowhere".into();
        config.telemetry.queue_capacity = 0;
        config.telemetry.batch_max_count = 0;
        config.telemetry.collector_url = Some("ftp://collector".into());

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec![
                "listener.bind_address",
                "telemetry.collector_url",
                "telemetry.batch_max_count",
                "telemetry.queue_capacity",
            ]
        );
    }

    #[test]
    fn test_metrics_address_only_checked_when_enabled() {
        let mut config = ServiceConfig::default();
        config.observability.metrics_address = "bad".into();
        assert!(validate_config(&config).is_err());

        config.observability.metrics_enabled = false;
        assert!(validate_config(&config).is_ok());
    }
}
