//! Bounded queue between request tasks and the shipper worker.
//!
//! Many producers push synchronously; one consumer waits asynchronously.
//! The lock is only held for O(1) deque operations, so a push never waits on
//! I/O. On overflow one item is discarded according to [`OverflowPolicy`] and
//! the drop counter is incremented.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

/// What to discard when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Evict the oldest queued item to make room.
    #[default]
    DropOldest,
    /// Discard the item being enqueued.
    DropNewest,
}

/// Result of a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Accepted,
    /// Accepted after evicting the oldest item.
    EvictedOldest,
    /// Discarded (queue full under drop-newest, or queue closed).
    Rejected,
}

/// Concurrent bounded FIFO with a single async consumer.
#[derive(Debug)]
pub struct ShipperQueue<T> {
    items: Mutex<VecDeque<T>>,
    capacity: usize,
    policy: OverflowPolicy,
    notify: Notify,
    closed: AtomicBool,
    enqueued: AtomicU64,
    dropped: AtomicU64,
}

impl<T> ShipperQueue<T> {
    /// Create a queue. A zero capacity is treated as one.
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
            policy,
            notify: Notify::new(),
            closed: AtomicBool::new(false),
            enqueued: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an item, applying the overflow policy when full.
    ///
    /// The closed flag is read under the lock, so an item accepted here is
    /// always visible to a drain that runs after [`ShipperQueue::close`].
    pub fn push(&self, item: T) -> EnqueueOutcome {
        let outcome = {
            let mut items = self.lock();
            if self.closed.load(Ordering::Acquire) {
                EnqueueOutcome::Rejected
            } else if items.len() < self.capacity {
                items.push_back(item);
                EnqueueOutcome::Accepted
            } else {
                match self.policy {
                    OverflowPolicy::DropOldest => {
                        items.pop_front();
                        items.push_back(item);
                        EnqueueOutcome::EvictedOldest
                    }
                    OverflowPolicy::DropNewest => EnqueueOutcome::Rejected,
                }
            }
        };

        match outcome {
            EnqueueOutcome::Accepted => {
                self.enqueued.fetch_add(1, Ordering::Relaxed);
            }
            EnqueueOutcome::EvictedOldest => {
                self.enqueued.fetch_add(1, Ordering::Relaxed);
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
            EnqueueOutcome::Rejected => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return outcome;
            }
        }

        self.notify.notify_one();
        outcome
    }

    /// Remove up to `max` items from the front, in order.
    pub fn drain_up_to(&self, max: usize) -> Vec<T> {
        let mut items = self.lock();
        let n = max.min(items.len());
        items.drain(..n).collect()
    }

    /// Wait until at least one item is queued.
    ///
    /// Returns `false` once the queue is closed and empty.
    pub async fn wait_for_items(&self) -> bool {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if !self.is_empty() {
                return true;
            }
            if self.is_closed() {
                return false;
            }
            notified.await;
        }
    }

    /// Stop accepting items and wake the consumer.
    pub fn close(&self) {
        {
            let _items = self.lock();
            self.closed.store(true, Ordering::Release);
        }
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Items accepted so far.
    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    /// Items lost to overflow, closure or an aborted final flush.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub(crate) fn record_dropped(&self, n: u64) {
        self.dropped.fetch_add(n, Ordering::Relaxed);
    }
}
