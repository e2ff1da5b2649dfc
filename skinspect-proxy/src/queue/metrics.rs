//! In-process counters for the inspection queue.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Counters for monitoring queue behaviour
#[derive(Debug, Default)]
pub struct QueueMetrics {
    /// Entries admitted into the queue
    pub entries_admitted: AtomicU64,

    /// Entries waiting to be dispatched
    pub entries_pending: AtomicU64,

    /// Entries currently in a protocol round-trip
    pub entries_in_flight: AtomicU64,

    /// Entries resolved with an inspected item
    pub entries_succeeded: AtomicU64,

    /// Entries that used up every attempt
    pub entries_failed: AtomicU64,

    /// Attempts that failed and were re-enqueued
    pub attempts_retried: AtomicU64,

    /// Batches rejected by the per-caller ceiling
    pub rejected_caller: AtomicU64,

    /// Batches rejected by the queue ceiling
    pub rejected_queue: AtomicU64,

    /// Maximum pending depth observed
    pub max_queue_depth: AtomicU64,

    /// Total time entries spent waiting, in milliseconds
    pub total_queue_wait_ms: AtomicU64,
}

impl QueueMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `count` entries entering the queue
    pub fn record_admitted(&self, count: u64) {
        self.entries_admitted.fetch_add(count, Ordering::Relaxed);
        self.record_pending(count);
    }

    fn record_pending(&self, count: u64) {
        let pending = self.entries_pending.fetch_add(count, Ordering::Relaxed) + count;
        let mut current_max = self.max_queue_depth.load(Ordering::Relaxed);
        while pending > current_max {
            match self.max_queue_depth.compare_exchange_weak(
                current_max,
                pending,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(x) => current_max = x,
            }
        }
    }

    /// Record an entry leaving the queue for a session
    pub fn record_dispatched(&self, wait_time: Duration) {
        self.entries_pending.fetch_sub(1, Ordering::Relaxed);
        self.entries_in_flight.fetch_add(1, Ordering::Relaxed);
        self.total_queue_wait_ms
            .fetch_add(wait_time.as_millis() as u64, Ordering::Relaxed);
    }

    /// Record a failed attempt going back to the queue
    pub fn record_retried(&self) {
        self.entries_in_flight.fetch_sub(1, Ordering::Relaxed);
        self.attempts_retried.fetch_add(1, Ordering::Relaxed);
        self.record_pending(1);
    }

    pub fn record_succeeded(&self) {
        self.entries_in_flight.fetch_sub(1, Ordering::Relaxed);
        self.entries_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.entries_in_flight.fetch_sub(1, Ordering::Relaxed);
        self.entries_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected_caller(&self) {
        self.rejected_caller.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_rejected_queue(&self) {
        self.rejected_queue.fetch_add(1, Ordering::Relaxed);
    }

    pub fn queue_depth(&self) -> u64 {
        self.entries_pending.load(Ordering::Relaxed)
    }

    pub fn in_flight(&self) -> u64 {
        self.entries_in_flight.load(Ordering::Relaxed)
    }

    /// Average wait per dispatched attempt, in milliseconds
    pub fn avg_queue_wait_ms(&self) -> f64 {
        let dispatched = self.entries_succeeded.load(Ordering::Relaxed)
            + self.entries_failed.load(Ordering::Relaxed)
            + self.attempts_retried.load(Ordering::Relaxed);
        if dispatched == 0 {
            return 0.0;
        }
        self.total_queue_wait_ms.load(Ordering::Relaxed) as f64 / dispatched as f64
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            entries_admitted: self.entries_admitted.load(Ordering::Relaxed),
            entries_pending: self.entries_pending.load(Ordering::Relaxed),
            entries_in_flight: self.entries_in_flight.load(Ordering::Relaxed),
            entries_succeeded: self.entries_succeeded.load(Ordering::Relaxed),
            entries_failed: self.entries_failed.load(Ordering::Relaxed),
            attempts_retried: self.attempts_retried.load(Ordering::Relaxed),
            rejected_caller: self.rejected_caller.load(Ordering::Relaxed),
            rejected_queue: self.rejected_queue.load(Ordering::Relaxed),
            max_queue_depth: self.max_queue_depth.load(Ordering::Relaxed),
            avg_queue_wait_ms: self.avg_queue_wait_ms(),
        }
    }
}

/// Snapshot of queue counters at a point in time
#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSnapshot {
    pub entries_admitted: u64,
    pub entries_pending: u64,
    pub entries_in_flight: u64,
    pub entries_succeeded: u64,
    pub entries_failed: u64,
    pub attempts_retried: u64,
    pub rejected_caller: u64,
    pub rejected_queue: u64,
    pub max_queue_depth: u64,
    pub avg_queue_wait_ms: f64,
}
