//! Request middleware.

pub mod correlation;

pub use correlation::{correlation_middleware, TRACEPARENT, X_REQUEST_ID};
