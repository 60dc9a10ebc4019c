//! Startup orchestration.
//!
//! # Responsibilities
//! - Build the telemetry pipeline with the configured transport
//! - Build the HTTP server on top of it
//! - Run both, then shut them down in order
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - The server drains before the shipper flushes, so telemetry from
//!   in-flight requests is still delivered

use std::sync::Arc;

use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::config::{ServiceConfig, TelemetryConfig};
use crate::http::HttpServer;
use crate::telemetry::{
    HttpTransport, ShipperHandle, Telemetry, TracingTransport, Transport, TransportError,
};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid collector url '{url}': {source}")]
    CollectorUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to build collector transport: {0}")]
    Transport(#[from] TransportError),

    #[error("server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Pick the transport for the configured collector.
pub fn build_transport(config: &TelemetryConfig) -> Result<Arc<dyn Transport>, StartupError> {
    let Some(url) = &config.collector_url else {
        tracing::warn!("No collector configured, telemetry goes to the local log");
        return Ok(Arc::new(TracingTransport));
    };

    let endpoint = url::Url::parse(url).map_err(|source| StartupError::CollectorUrl {
        url: url.clone(),
        source,
    })?;
    let transport = HttpTransport::new(endpoint, config.secret_token.clone(), config.request_timeout())?;
    Ok(Arc::new(transport))
}

/// A fully wired service, ready to accept traffic.
pub struct Service {
    server: HttpServer,
    telemetry: Telemetry,
    shipper: ShipperHandle,
}

impl Service {
    /// Build with the transport derived from `config`.
    pub fn build(config: &ServiceConfig) -> Result<Self, StartupError> {
        let transport = build_transport(&config.telemetry)?;
        Ok(Self::with_transport(config, transport))
    }

    /// Build with an explicit transport. Must be called inside a tokio runtime.
    pub fn with_transport(config: &ServiceConfig, transport: Arc<dyn Transport>) -> Self {
        tracing::info!(
            destination = %transport.describe(),
            service_name = %config.telemetry.service_name,
            min_level = %config.telemetry.min_level,
            "Starting telemetry shipper"
        );
        let (telemetry, shipper) = Telemetry::start(&config.telemetry, transport);
        let server = HttpServer::new(&config.listener, telemetry.clone());
        Self {
            server,
            telemetry,
            shipper,
        }
    }

    pub fn telemetry(&self) -> &Telemetry {
        &self.telemetry
    }

    /// Serve until `shutdown` fires, then flush telemetry.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), StartupError> {
        let served = self.server.run(listener, shutdown).await;
        self.shipper.shutdown().await;

        let stats = self.telemetry.stats();
        tracing::info!(
            events_sent = stats.events_sent,
            events_dropped = stats.events_dropped,
            batches_dropped = stats.batches_dropped,
            "Telemetry flushed"
        );
        Ok(served?)
    }
}
