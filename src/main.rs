//! Checkout service entry point.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use checkout_telemetry::config::load_config;
use checkout_telemetry::lifecycle::{spawn_signal_listener, Service, Shutdown};
use checkout_telemetry::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "checkout-telemetry", version, about = "Checkout service with request-scoped telemetry")]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "CHECKOUT_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;

    logging::init_logging(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "checkout-telemetry starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.listener.request_timeout_secs,
        collector = ?config.telemetry.collector_url,
        queue_capacity = config.telemetry.queue_capacity,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = metrics::init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics endpoint");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let service = Service::build(&config)?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Arc::new(Shutdown::new());
    let rx = shutdown.subscribe();
    spawn_signal_listener(shutdown);

    service.run(listener, rx).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
