//! Resilience helpers for outbound delivery.
//!
//! # Data Flow
//! ```text
//! Batch delivery to the collector:
//!     → retries.rs (attempt, classify failure, stop on non-retryable,
//!       exponential delay + jitter between attempts)
//! ```
//!
//! # Design Decisions
//! - Every retry loop has a hard attempt budget
//! - Jittered backoff prevents synchronized retry bursts
//! - Callers decide what a retryable failure is via [`retries::Retryable`]

pub mod retries;

pub use retries::{retry_with_backoff, RetryError, RetryPolicy, Retryable};
