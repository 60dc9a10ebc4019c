//! Delivery of encoded batches to a collector.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use thiserror::Error;

use crate::resilience::Retryable;

/// Errors surfaced by a [`Transport`]. Only the shipper ever sees these.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request could not be sent or timed out.
    #[error("collector request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The collector answered with a non-success status.
    #[error("collector returned status {status}")]
    Status { status: u16 },

    /// The batch could not be serialized.
    #[error("failed to encode batch: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("collector unavailable: {0}")]
    Unavailable(String),
}

impl TransportError {
    /// Whether retrying the same payload may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(_) | Self::Unavailable(_) => true,
            Self::Status { status } => *status >= 500 || *status == 408 || *status == 429,
            Self::Encode(_) => false,
        }
    }
}

impl Retryable for TransportError {
    fn is_retryable(&self) -> bool {
        TransportError::is_retryable(self)
    }
}

/// Sink for encoded telemetry batches.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn transmit(&self, payload: Vec<u8>) -> Result<(), TransportError>;

    /// Human-readable destination for log lines.
    fn describe(&self) -> String;
}

/// Posts NDJSON batches to an HTTP collector endpoint.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: url::Url,
    secret_token: Option<String>,
}

impl HttpTransport {
    pub fn new(
        endpoint: url::Url,
        secret_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("checkout-telemetry/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            endpoint,
            secret_token,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn transmit(&self, payload: Vec<u8>) -> Result<(), TransportError> {
        let mut request = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/x-ndjson")
            .body(payload);
        if let Some(token) = &self.secret_token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(TransportError::Status {
                status: status.as_u16(),
            })
        }
    }

    fn describe(&self) -> String {
        self.endpoint.to_string()
    }
}

/// Writes batches to the local log. Used when no collector is configured.
#[derive(Debug, Clone, Default)]
pub struct TracingTransport;

#[async_trait]
impl Transport for TracingTransport {
    async fn transmit(&self, payload: Vec<u8>) -> Result<(), TransportError> {
        for line in String::from_utf8_lossy(&payload).lines().skip(1) {
            tracing::debug!(target: "checkout_telemetry::collector", event = %line, "Telemetry event");
        }
        Ok(())
    }

    fn describe(&self) -> String {
        "local log".to_string()
    }
}
