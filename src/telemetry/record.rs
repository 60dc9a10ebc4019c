//! Telemetry event types.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::telemetry::context::{generate_trace_id, CorrelationContext};
use crate::telemetry::field::Fields;

/// Log severity. Ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
pub enum Level {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl Level {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Critical => "CRITICAL",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unrecognized level name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown log level '{0}'")]
pub struct ParseLevelError(String);

impl FromStr for Level {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" | "trace" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warning" | "warn" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            "critical" | "fatal" => Ok(Self::Critical),
            _ => Err(ParseLevelError(s.to_string())),
        }
    }
}

impl TryFrom<String> for Level {
    type Error = ParseLevelError;

    fn try_from(value: String) -> Result<Self, ParseLevelError> {
        value.parse()
    }
}

/// A structured log line tagged with its request's correlation ids.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    pub logger: String,
    pub message: String,
    #[serde(skip_serializing_if = "Fields::is_empty")]
    pub fields: Fields,
    pub correlation: CorrelationContext,
}

/// An error occurrence reported for observability.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CapturedError {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub error_kind: String,
    pub message: String,
    pub stack_summary: String,
    pub correlation: CorrelationContext,
    #[serde(skip_serializing_if = "Fields::is_empty")]
    pub labels: Fields,
}

impl CapturedError {
    pub(crate) fn new(
        error_kind: String,
        message: String,
        stack_summary: String,
        correlation: CorrelationContext,
        extra_labels: Fields,
    ) -> Self {
        let mut labels = correlation.labels().clone();
        labels.extend(extra_labels);
        Self {
            id: generate_trace_id(),
            timestamp: Utc::now(),
            error_kind,
            message,
            stack_summary,
            correlation,
            labels,
        }
    }
}

/// Whether a transaction completed normally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure,
}

/// One completed inbound request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionRecord {
    pub id: String,
    pub trace_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub name: String,
    pub result: String,
    pub outcome: Outcome,
    pub duration_ms: f64,
    pub timestamp: DateTime<Utc>,
    pub context: CorrelationContext,
}

impl TransactionRecord {
    pub(crate) fn new(name: String, status: u16, duration: Duration, context: CorrelationContext) -> Self {
        let outcome = if status >= 500 { Outcome::Failure } else { Outcome::Success };
        Self {
            id: context.transaction_id().to_string(),
            trace_id: context.trace_id().to_string(),
            parent_id: context.parent_span_id().map(str::to_string),
            name,
            result: format!("HTTP {}xx", status / 100),
            outcome,
            duration_ms: duration.as_secs_f64() * 1000.0,
            timestamp: Utc::now(),
            context,
        }
    }
}

/// Anything the shipper transports.
///
/// Serialized externally tagged, so each event on the wire is keyed by its kind
/// (`{"log": ...}`, `{"error": ...}`, `{"transaction": ...}`).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetryEvent {
    Log(LogRecord),
    Error(CapturedError),
    Transaction(TransactionRecord),
}

impl TelemetryEvent {
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Log(_) => "log",
            Self::Error(_) => "error",
            Self::Transaction(_) => "transaction",
        }
    }

    pub fn correlation(&self) -> &CorrelationContext {
        match self {
            Self::Log(r) => &r.correlation,
            Self::Error(e) => &e.correlation,
            Self::Transaction(t) => &t.context,
        }
    }
}
