//! Checkout service with a request-scoped telemetry core.
//!
//! # Architecture Overview
//!
//! ```text
//!   Client ──▶ http::server ──▶ http::middleware::correlation ──▶ http::checkout ──▶ billing
//!                                    │ opens Scope                   │ logs, errors,
//!                                    │ records transaction           │ labels, user
//!                                    ▼                               ▼
//!                              telemetry::queue (bounded, non-blocking)
//!                                    │
//!                                    ▼
//!                              telemetry::shipper (one worker: batch, retry, flush)
//!                                    │
//!                                    ▼
//!                              telemetry::transport ──▶ collector
//! ```

// Core subsystems
pub mod billing;
pub mod http;
pub mod telemetry;

// Cross-cutting concerns
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::schema::ServiceConfig;
pub use http::HttpServer;
pub use lifecycle::{Service, Shutdown};
pub use telemetry::{Scope, Telemetry};
