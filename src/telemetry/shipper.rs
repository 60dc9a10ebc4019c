//! Background delivery of queued telemetry.
//!
//! # Responsibilities
//! - Own the consuming side of the [`ShipperQueue`]
//! - Accumulate batches bounded by count and wait time
//! - Deliver batches with bounded retry, dropping them on exhaustion
//! - Drain the queue on shutdown within a hard deadline
//!
//! # Design Decisions
//! - Exactly one worker, so batches leave in enqueue order
//! - Delivery failures end here: they are logged and counted, never returned

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{timeout_at, Instant};

use crate::observability::metrics;
use crate::resilience::{retry_with_backoff, RetryPolicy};
use crate::telemetry::codec::BatchEncoder;
use crate::telemetry::queue::ShipperQueue;
use crate::telemetry::record::TelemetryEvent;
use crate::telemetry::transport::{Transport, TransportError};

/// Batching and delivery settings for the worker.
#[derive(Debug, Clone)]
pub struct ShipperSettings {
    pub batch_max_count: usize,
    pub batch_max_wait: Duration,
    pub retry: RetryPolicy,
    pub shutdown_deadline: Duration,
}

/// Delivery counters shared between the worker and observers.
#[derive(Debug, Default)]
pub struct ShipperCounters {
    batches_sent: AtomicU64,
    events_sent: AtomicU64,
    batches_dropped: AtomicU64,
    events_in_dropped_batches: AtomicU64,
    retries: AtomicU64,
    /// Events handed to the transport and not yet settled as sent or dropped.
    in_flight: AtomicU64,
}

/// Point-in-time view of queue and delivery counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TelemetryStats {
    pub queue_depth: usize,
    pub queue_capacity: usize,
    pub events_enqueued: u64,
    pub events_dropped: u64,
    pub events_sent: u64,
    pub batches_sent: u64,
    pub batches_dropped: u64,
    pub events_in_dropped_batches: u64,
    pub delivery_retries: u64,
}

impl ShipperCounters {
    pub(crate) fn snapshot(&self, queue: &ShipperQueue<TelemetryEvent>) -> TelemetryStats {
        TelemetryStats {
            queue_depth: queue.len(),
            queue_capacity: queue.capacity(),
            events_enqueued: queue.enqueued(),
            events_dropped: queue.dropped(),
            events_sent: self.events_sent.load(Ordering::Relaxed),
            batches_sent: self.batches_sent.load(Ordering::Relaxed),
            batches_dropped: self.batches_dropped.load(Ordering::Relaxed),
            events_in_dropped_batches: self.events_in_dropped_batches.load(Ordering::Relaxed),
            delivery_retries: self.retries.load(Ordering::Relaxed),
        }
    }

    /// Settle a batch the worker was still delivering when it was aborted.
    fn abandon_in_flight(&self) -> u64 {
        let events = self.in_flight.swap(0, Ordering::AcqRel);
        if events > 0 {
            self.batches_dropped.fetch_add(1, Ordering::Relaxed);
            self.events_in_dropped_batches
                .fetch_add(events, Ordering::Relaxed);
            metrics::record_batch_dropped(events);
        }
        events
    }
}

/// The delivery worker. Consumed by [`Shipper::spawn`].
pub struct Shipper {
    queue: Arc<ShipperQueue<TelemetryEvent>>,
    transport: Arc<dyn Transport>,
    encoder: BatchEncoder,
    settings: ShipperSettings,
    counters: Arc<ShipperCounters>,
}

impl Shipper {
    pub fn new(
        queue: Arc<ShipperQueue<TelemetryEvent>>,
        transport: Arc<dyn Transport>,
        encoder: BatchEncoder,
        settings: ShipperSettings,
        counters: Arc<ShipperCounters>,
    ) -> Self {
        Self {
            queue,
            transport,
            encoder,
            settings,
            counters,
        }
    }

    /// Start the worker on the current tokio runtime.
    pub fn spawn(self) -> ShipperHandle {
        let queue = self.queue.clone();
        let counters = self.counters.clone();
        let deadline = self.settings.shutdown_deadline;
        let join = tokio::spawn(self.run());
        ShipperHandle {
            queue,
            counters,
            join,
            deadline,
        }
    }

    async fn run(self) {
        tracing::info!(
            destination = %self.transport.describe(),
            batch_max_count = self.settings.batch_max_count,
            batch_max_wait_ms = self.settings.batch_max_wait.as_millis() as u64,
            "Telemetry shipper started"
        );

        while let Some(batch) = self.next_batch().await {
            self.counters
                .in_flight
                .store(batch.len() as u64, Ordering::Release);
            self.deliver(batch).await;
            self.counters.in_flight.store(0, Ordering::Release);
        }

        tracing::info!("Telemetry shipper stopped");
    }

    /// Collect the next batch. Returns `None` once the queue is closed and drained.
    async fn next_batch(&self) -> Option<Vec<TelemetryEvent>> {
        let max = self.settings.batch_max_count.max(1);
        if !self.queue.wait_for_items().await {
            return None;
        }

        let deadline = Instant::now() + self.settings.batch_max_wait;
        let mut batch = self.queue.drain_up_to(max);

        while batch.len() < max && !self.queue.is_closed() {
            match timeout_at(deadline, self.queue.wait_for_items()).await {
                Ok(true) => batch.extend(self.queue.drain_up_to(max - batch.len())),
                Ok(false) | Err(_) => break,
            }
        }
        Some(batch)
    }

    async fn deliver(&self, batch: Vec<TelemetryEvent>) {
        let count = batch.len() as u64;
        let payload = match self.encoder.encode(&batch) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.record_dropped_batch(count, &TransportError::Encode(e), 0);
                return;
            }
        };

        let result = retry_with_backoff(
            &self.settings.retry,
            |_| self.transport.transmit(payload.clone()),
            |attempt, error, delay| {
                self.counters.retries.fetch_add(1, Ordering::Relaxed);
                metrics::record_delivery_retry();
                tracing::warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Telemetry delivery failed, retrying"
                );
            },
        )
        .await;

        match result {
            Ok(()) => {
                self.counters.batches_sent.fetch_add(1, Ordering::Relaxed);
                self.counters.events_sent.fetch_add(count, Ordering::Relaxed);
                metrics::record_batch_sent(count);
                tracing::debug!(events = count, "Telemetry batch delivered");
            }
            Err(failure) => self.record_dropped_batch(count, &failure.last_error, failure.attempts),
        }
    }

    fn record_dropped_batch(&self, events: u64, error: &TransportError, attempts: u32) {
        self.counters.batches_dropped.fetch_add(1, Ordering::Relaxed);
        self.counters
            .events_in_dropped_batches
            .fetch_add(events, Ordering::Relaxed);
        metrics::record_batch_dropped(events);
        tracing::error!(events, attempts, error = %error, "Telemetry batch dropped");
    }
}

/// Owner-side handle used to stop the worker.
pub struct ShipperHandle {
    queue: Arc<ShipperQueue<TelemetryEvent>>,
    counters: Arc<ShipperCounters>,
    join: JoinHandle<()>,
    deadline: Duration,
}

impl ShipperHandle {
    /// Close the queue and wait for the worker to flush what is left.
    ///
    /// If the flush outlives the shutdown deadline the worker is aborted. The
    /// batch it was delivering is counted as a dropped batch and the events
    /// still queued are counted as dropped, so every accepted event ends up
    /// as sent, dropped or part of a dropped batch.
    pub async fn shutdown(mut self) {
        self.queue.close();
        tracing::info!(
            pending = self.queue.len(),
            deadline_ms = self.deadline.as_millis() as u64,
            "Flushing telemetry"
        );

        match tokio::time::timeout(self.deadline, &mut self.join).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "Telemetry shipper task failed"),
            Err(_) => {
                self.join.abort();
                // Wait for cancellation so the worker cannot settle the batch concurrently.
                let _ = (&mut self.join).await;
                let in_flight = self.counters.abandon_in_flight();
                let remaining = self.queue.drain_up_to(usize::MAX).len() as u64;
                self.queue.record_dropped(remaining);
                metrics::record_events_dropped(remaining);
                tracing::warn!(
                    in_flight,
                    dropped = remaining,
                    "Telemetry flush deadline exceeded, remaining events dropped"
                );
            }
        }
    }
}
