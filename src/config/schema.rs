//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML and default
//! every field, so an empty file is a valid configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resilience::RetryPolicy;
use crate::telemetry::{Level, OverflowPolicy};

/// Root configuration for the checkout service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP listener settings.
    pub listener: ListenerConfig,

    /// Telemetry pipeline settings.
    pub telemetry: TelemetryConfig,

    /// Local logging and metrics settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8000").
    pub bind_address: String,

    /// Request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8000".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Telemetry collection and shipping.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Collector endpoint. When unset, batches are written to the local log.
    pub collector_url: Option<String>,

    /// Service name reported with every batch.
    pub service_name: String,

    /// Deployment environment reported with every batch.
    pub environment: String,

    /// Bearer token for the collector.
    pub secret_token: Option<String>,

    /// Records below this level are discarded.
    pub min_level: Level,

    /// Maximum events per batch.
    pub batch_max_count: usize,

    /// Maximum time a batch waits for more events, in milliseconds.
    pub batch_max_wait_ms: u64,

    /// Maximum events waiting for delivery.
    pub queue_capacity: usize,

    /// What to discard when the queue is full.
    pub overflow_policy: OverflowPolicy,

    /// Per-request timeout towards the collector, in seconds.
    pub request_timeout_secs: u64,

    /// Delivery retry settings.
    pub retry: RetryPolicy,

    /// Hard limit for the final flush on shutdown, in milliseconds.
    pub shutdown_deadline_ms: u64,
}

impl TelemetryConfig {
    pub fn batch_max_wait(&self) -> Duration {
        Duration::from_millis(self.batch_max_wait_ms)
    }

    pub fn shutdown_deadline(&self) -> Duration {
        Duration::from_millis(self.shutdown_deadline_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            collector_url: None,
            service_name: "checkout-service".to_string(),
            environment: "development".to_string(),
            secret_token: None,
            min_level: Level::Debug,
            batch_max_count: 64,
            batch_max_wait_ms: 1_000,
            queue_capacity: 4_096,
            overflow_policy: OverflowPolicy::DropOldest,
            request_timeout_secs: 10,
            retry: RetryPolicy::default(),
            shutdown_deadline_ms: 5_000,
        }
    }
}

// Hand-written so the secret token never reaches a log line.
impl std::fmt::Debug for TelemetryConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelemetryConfig")
            .field("collector_url", &self.collector_url)
            .field("service_name", &self.service_name)
            .field("environment", &self.environment)
            .field("secret_token", &self.secret_token.as_ref().map(|_| "<redacted>"))
            .field("min_level", &self.min_level)
            .field("batch_max_count", &self.batch_max_count)
            .field("batch_max_wait_ms", &self.batch_max_wait_ms)
            .field("queue_capacity", &self.queue_capacity)
            .field("overflow_policy", &self.overflow_policy)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("retry", &self.retry)
            .field("shutdown_deadline_ms", &self.shutdown_deadline_ms)
            .finish()
    }
}

/// Local log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
