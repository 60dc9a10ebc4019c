//! Request-scoped observability core.
//!
//! # Data Flow
//! ```text
//! request task                                   shipper worker
//! ────────────                                   ──────────────
//! Scope (context.rs ids)
//!     → log / capture_error / capture_message
//!     → record.rs (LogRecord, CapturedError)
//!     → queue.rs (bounded, non-blocking push) ──→ shipper.rs (batch by count/wait)
//!                                                  → codec.rs (NDJSON)
//!                                                  → transport.rs (collector)
//! ```
//!
//! # Design Decisions
//! - [`Telemetry`] is an explicitly constructed handle, cloned into the HTTP
//!   state; there is no global client
//! - The queue is the only structure shared between request tasks and the worker
//! - Telemetry failures never reach request handlers

pub mod codec;
pub mod context;
pub mod field;
pub mod queue;
pub mod record;
pub mod scope;
pub mod shipper;
pub mod transport;

use std::sync::Arc;

pub use codec::{BatchEncoder, ServiceMetadata};
pub use context::{CorrelationContext, UserContext};
pub use field::{FieldValue, Fields};
pub use queue::{EnqueueOutcome, OverflowPolicy, ShipperQueue};
pub use record::{CapturedError, Level, LogRecord, Outcome, TelemetryEvent, TransactionRecord};
pub use scope::Scope;
pub use shipper::{Shipper, ShipperHandle, ShipperSettings, TelemetryStats};
pub use transport::{HttpTransport, TracingTransport, Transport, TransportError};

use crate::config::TelemetryConfig;
use crate::observability::metrics;
use shipper::ShipperCounters;

struct Inner {
    service_name: String,
    min_level: Level,
    queue: Arc<ShipperQueue<TelemetryEvent>>,
    counters: Arc<ShipperCounters>,
}

/// Cheaply cloneable handle to the telemetry pipeline.
#[derive(Clone)]
pub struct Telemetry {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Telemetry")
            .field("service_name", &self.inner.service_name)
            .field("min_level", &self.inner.min_level)
            .finish_non_exhaustive()
    }
}

impl Telemetry {
    /// Build the pipeline and spawn its shipper on the current runtime.
    pub fn start(config: &TelemetryConfig, transport: Arc<dyn Transport>) -> (Self, ShipperHandle) {
        let queue = Arc::new(ShipperQueue::new(config.queue_capacity, config.overflow_policy));
        let counters = Arc::new(ShipperCounters::default());

        let encoder = BatchEncoder::new(ServiceMetadata {
            name: config.service_name.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            environment: config.environment.clone(),
        });
        let settings = ShipperSettings {
            batch_max_count: config.batch_max_count,
            batch_max_wait: config.batch_max_wait(),
            retry: config.retry.clone(),
            shutdown_deadline: config.shutdown_deadline(),
        };
        let handle = Shipper::new(queue.clone(), transport, encoder, settings, counters.clone()).spawn();

        let telemetry = Self {
            inner: Arc::new(Inner {
                service_name: config.service_name.clone(),
                min_level: config.min_level,
                queue,
                counters,
            }),
        };
        (telemetry, handle)
    }

    /// A handle whose queue nobody consumes. Events accumulate in `queue`.
    pub fn detached(
        service_name: impl Into<String>,
        min_level: Level,
        queue: Arc<ShipperQueue<TelemetryEvent>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                service_name: service_name.into(),
                min_level,
                queue,
                counters: Arc::new(ShipperCounters::default()),
            }),
        }
    }

    /// Open a scope on the given context.
    pub fn scope(&self, context: CorrelationContext) -> Scope {
        Scope::new(self.clone(), context)
    }

    /// Open a scope on a fresh context.
    pub fn new_scope(&self) -> Scope {
        self.scope(CorrelationContext::new())
    }

    pub fn service_name(&self) -> &str {
        &self.inner.service_name
    }

    pub fn min_level(&self) -> Level {
        self.inner.min_level
    }

    pub fn is_enabled(&self, level: Level) -> bool {
        level >= self.inner.min_level
    }

    pub fn stats(&self) -> TelemetryStats {
        self.inner.counters.snapshot(&self.inner.queue)
    }

    pub(crate) fn enqueue(&self, event: TelemetryEvent) {
        let kind = event.kind();
        match self.inner.queue.push(event) {
            EnqueueOutcome::Accepted => metrics::record_enqueued(kind),
            EnqueueOutcome::EvictedOldest => {
                metrics::record_enqueued(kind);
                metrics::record_events_dropped(1);
            }
            EnqueueOutcome::Rejected => metrics::record_events_dropped(1),
        }
    }
}
