//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request id, tracing, timeout)
//!     → middleware/correlation.rs (open Scope, continue traceparent)
//!     → checkout.rs (validate, bill, emit telemetry)
//!     → error.rs (client-facing failures)
//!     → middleware/correlation.rs (record transaction)
//!     → Send to client
//! ```

pub mod checkout;
pub mod error;
pub mod middleware;
pub mod server;
pub mod status;

pub use error::ApiError;
pub use server::{AppState, HttpServer};
