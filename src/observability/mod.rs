//! Local observability of the service itself.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured `tracing` events)
//!     → metrics.rs (counters, histograms)
//!
//! Consumers:
//!     → stdout (pretty or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! Request-scoped telemetry bound for the collector lives in
//! [`crate::telemetry`]; this module only covers the process's own output.

pub mod logging;
pub mod metrics;
