//! Admission-controlled FIFO of pending inspections.
//!
//! The pending deque and the per-caller counters live under one mutex, so a
//! batch is admitted or rejected as a whole and never partially queued.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{broadcast, Mutex, Notify};
use tracing::debug;

use super::config::QueueConfig;
use super::metrics::QueueMetrics;
use crate::error::{CapacityScope, InspectError};
use crate::job::{InspectJob, JobLink};
use crate::metrics;

/// Lifecycle state of one queue entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Pending,
    Dispatched,
    Retrying,
    Succeeded,
    Failed,
}

/// State transition published to subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueEvent {
    pub asset_id: u64,
    pub state: EntryState,
}

/// One pending inspection
pub struct QueueEntry {
    pub link: JobLink,
    pub job: Arc<InspectJob>,
    pub attempts_left: u32,
    enqueued_at: Instant,
}

impl QueueEntry {
    pub fn asset_id(&self) -> u64 {
        self.link.reference.asset_id
    }

    pub fn caller(&self) -> &str {
        self.job.caller()
    }
}

#[derive(Default)]
struct QueueInner {
    pending: VecDeque<QueueEntry>,
    /// Non-terminal entries per caller, pending or in flight
    per_caller: HashMap<String, usize>,
}

pub struct InspectQueue {
    config: QueueConfig,
    inner: Mutex<QueueInner>,
    notify: Notify,
    events: broadcast::Sender<QueueEvent>,
    metrics: Arc<QueueMetrics>,
}

impl InspectQueue {
    pub fn new(config: QueueConfig, metrics: Arc<QueueMetrics>) -> Self {
        let (events, _) = broadcast::channel(1024);
        Self {
            config,
            inner: Mutex::new(QueueInner::default()),
            notify: Notify::new(),
            events,
            metrics,
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn metrics(&self) -> &Arc<QueueMetrics> {
        &self.metrics
    }

    /// Receive every state transition from now on
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.events.subscribe()
    }

    fn publish(&self, asset_id: u64, state: EntryState) {
        // No subscribers is the normal case outside tests
        let _ = self.events.send(QueueEvent { asset_id, state });
    }

    /// Admit all of `links` for `job`, or none of them.
    pub async fn enqueue(
        &self,
        job: &Arc<InspectJob>,
        links: Vec<JobLink>,
        max_attempts: u32,
    ) -> Result<(), InspectError> {
        let batch = links.len();
        if batch == 0 {
            return Ok(());
        }

        let mut inner = self.inner.lock().await;

        let caller_count = inner.per_caller.get(job.caller()).copied().unwrap_or(0);
        if self.config.max_per_caller > 0 && caller_count + batch > self.config.max_per_caller {
            self.metrics.record_rejected_caller();
            metrics::record_rejected(CapacityScope::Caller);
            debug!(caller = job.caller(), caller_count, batch, "Rejected batch over caller ceiling");
            return Err(InspectError::CapacityExceeded { scope: CapacityScope::Caller });
        }

        if self.config.max_queue_size > 0 && inner.pending.len() + batch > self.config.max_queue_size {
            self.metrics.record_rejected_queue();
            metrics::record_rejected(CapacityScope::Queue);
            debug!(queue_len = inner.pending.len(), batch, "Rejected batch over queue ceiling");
            return Err(InspectError::CapacityExceeded { scope: CapacityScope::Queue });
        }

        *inner.per_caller.entry(job.caller().to_string()).or_default() += batch;
        let now = Instant::now();
        for link in links {
            self.publish(link.reference.asset_id, EntryState::Pending);
            inner.pending.push_back(QueueEntry {
                link,
                job: Arc::clone(job),
                attempts_left: max_attempts.max(1),
                enqueued_at: now,
            });
        }

        self.metrics.record_admitted(batch as u64);
        metrics::set_queue_size(inner.pending.len());
        debug!(caller = job.caller(), batch, queue_len = inner.pending.len(), "Batch enqueued");
        drop(inner);

        self.notify.notify_waiters();
        Ok(())
    }

    /// Wait for the next pending entry (FIFO)
    pub async fn next(&self) -> QueueEntry {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(entry) = self.try_next().await {
                return entry;
            }
            notified.await;
        }
    }

    /// Pop the next pending entry without waiting
    pub async fn try_next(&self) -> Option<QueueEntry> {
        let mut inner = self.inner.lock().await;
        let entry = inner.pending.pop_front()?;
        metrics::set_queue_size(inner.pending.len());
        drop(inner);

        self.metrics.record_dispatched(entry.enqueued_at.elapsed());
        self.publish(entry.asset_id(), EntryState::Dispatched);
        Some(entry)
    }

    /// Put a failed entry back at the tail, bypassing admission.
    ///
    /// The caller's count is unchanged since the entry is still live.
    pub async fn retry(&self, mut entry: QueueEntry) {
        entry.enqueued_at = Instant::now();
        let asset_id = entry.asset_id();

        let mut inner = self.inner.lock().await;
        inner.pending.push_back(entry);
        metrics::set_queue_size(inner.pending.len());
        drop(inner);

        self.metrics.record_retried();
        metrics::record_retry();
        self.publish(asset_id, EntryState::Retrying);
        self.notify.notify_waiters();
    }

    /// Mark an entry terminal and release its caller slot
    pub async fn complete(&self, entry: &QueueEntry, state: EntryState) {
        {
            let mut inner = self.inner.lock().await;
            let left = inner.per_caller.get_mut(entry.caller()).map(|count| {
                *count = count.saturating_sub(1);
                *count
            });
            if left == Some(0) {
                inner.per_caller.remove(entry.caller());
            }
        }

        match state {
            EntryState::Succeeded => self.metrics.record_succeeded(),
            _ => self.metrics.record_failed(),
        }
        self.publish(entry.asset_id(), state);
    }

    /// Entries waiting to be dispatched
    pub async fn size(&self) -> usize {
        self.inner.lock().await.pending.len()
    }

    /// Non-terminal entries owned by `caller`
    pub async fn queued_amount_for(&self, caller: &str) -> usize {
        self.inner.lock().await.per_caller.get(caller).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::testing::reference;
    use proptest::prelude::*;

    fn queue(max_per_caller: usize, max_queue_size: usize) -> InspectQueue {
        let config = QueueConfig { max_per_caller, max_queue_size, ..QueueConfig::default() };
        InspectQueue::new(config, Arc::new(QueueMetrics::new()))
    }

    fn links(range: std::ops::Range<u64>) -> Vec<JobLink> {
        range.map(|a| JobLink { reference: reference(a), price: None }).collect()
    }

    #[tokio::test]
    async fn test_enqueue_and_next_fifo() {
        let queue = queue(10, 10);
        let (job, _rx) = InspectJob::new("10.0.0.1", true);

        queue.enqueue(&job, links(1..4), 1).await.unwrap();
        assert_eq!(queue.size().await, 3);
        assert_eq!(queue.queued_amount_for("10.0.0.1").await, 3);

        assert_eq!(queue.next().await.asset_id(), 1);
        assert_eq!(queue.next().await.asset_id(), 2);
        assert_eq!(queue.size().await, 1);
        // in-flight entries still count against the caller
        assert_eq!(queue.queued_amount_for("10.0.0.1").await, 3);
    }

    #[tokio::test]
    async fn test_caller_ceiling_rejects_whole_batch() {
        let queue = queue(3, 100);
        let (job, _rx) = InspectJob::new("10.0.0.1", true);

        queue.enqueue(&job, links(1..3), 1).await.unwrap();
        let err = queue.enqueue(&job, links(3..5), 1).await.unwrap_err();
        assert_eq!(err, InspectError::CapacityExceeded { scope: CapacityScope::Caller });
        assert_eq!(queue.size().await, 2);

        // another caller is unaffected
        let (other, _rx) = InspectJob::new("10.0.0.2", true);
        queue.enqueue(&other, links(10..13), 1).await.unwrap();
        assert_eq!(queue.size().await, 5);
    }

    #[tokio::test]
    async fn test_queue_ceiling() {
        let queue = queue(0, 4);
        let (job, _rx) = InspectJob::new("10.0.0.1", true);

        queue.enqueue(&job, links(1..4), 1).await.unwrap();
        let err = queue.enqueue(&job, links(4..6), 1).await.unwrap_err();
        assert_eq!(err.code(), 11);
        assert_eq!(queue.metrics().snapshot().rejected_queue, 1);
    }

    #[tokio::test]
    async fn test_complete_releases_caller_slot() {
        let queue = queue(1, 10);
        let (job, _rx) = InspectJob::new("10.0.0.1", false);

        queue.enqueue(&job, links(1..2), 1).await.unwrap();
        let entry = queue.next().await;
        queue.complete(&entry, EntryState::Succeeded).await;

        assert_eq!(queue.queued_amount_for("10.0.0.1").await, 0);
        queue.enqueue(&job, links(2..3), 1).await.unwrap();
    }

    #[tokio::test]
    async fn test_retry_bypasses_admission() {
        let queue = queue(0, 1);
        let (job, _rx) = InspectJob::new("10.0.0.1", true);
        let mut events = queue.subscribe();

        queue.enqueue(&job, links(1..2), 2).await.unwrap();
        let entry = queue.next().await;
        let (other, _rx) = InspectJob::new("10.0.0.2", true);
        queue.enqueue(&other, links(5..6), 1).await.unwrap();

        // the queue is full again, but the retry still goes in behind it
        queue.retry(entry).await;
        assert_eq!(queue.size().await, 2);
        assert_eq!(queue.next().await.asset_id(), 5);
        assert_eq!(queue.next().await.asset_id(), 1);

        let states: Vec<_> = std::iter::from_fn(|| events.try_recv().ok())
            .filter(|e| e.asset_id == 1)
            .map(|e| e.state)
            .collect();
        assert_eq!(
            states,
            vec![EntryState::Pending, EntryState::Dispatched, EntryState::Retrying, EntryState::Dispatched]
        );
    }

    #[tokio::test]
    async fn test_next_wakes_on_enqueue() {
        let queue = Arc::new(queue(10, 10));
        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.next().await.asset_id() })
        };
        tokio::task::yield_now().await;

        let (job, _rx) = InspectJob::new("10.0.0.1", false);
        queue.enqueue(&job, links(42..43), 1).await.unwrap();
        assert_eq!(waiter.await.unwrap(), 42);
    }

    proptest! {
        #[test]
        fn prop_admission_is_all_or_nothing(
            capacity in 1usize..40,
            existing in 0usize..40,
            batch in 1usize..40,
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            runtime.block_on(async {
                let queue = queue(0, capacity);
                let existing = existing.min(capacity);
                let (job, _rx) = InspectJob::new("10.0.0.1", true);
                queue.enqueue(&job, links(0..existing as u64), 1).await.unwrap();

                let start = existing as u64;
                let result = queue.enqueue(&job, links(start..start + batch as u64), 1).await;
                if existing + batch <= capacity {
                    prop_assert!(result.is_ok());
                    prop_assert_eq!(queue.size().await, existing + batch);
                } else {
                    prop_assert!(result.is_err());
                    prop_assert_eq!(queue.size().await, existing);
                }
                Ok(())
            })?;
        }

        #[test]
        fn prop_caller_ceiling_is_never_exceeded(
            ceiling in 1usize..12,
            steps in prop::collection::vec((0usize..3, 1usize..8, any::<bool>()), 1..24),
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            runtime.block_on(async {
                let queue = queue(ceiling, 0);
                let jobs: Vec<_> = (0..3)
                    .map(|c| InspectJob::new(format!("10.0.0.{c}"), true))
                    .collect();
                let mut next_asset = 0u64;

                for (caller, batch, settle_one) in steps {
                    // free a slot now and then so callers can come back under the ceiling
                    if settle_one {
                        if let Some(entry) = queue.try_next().await {
                            queue.complete(&entry, EntryState::Succeeded).await;
                        }
                    }

                    let (job, _) = &jobs[caller];
                    let size_before = queue.size().await;
                    let count_before = queue.queued_amount_for(job.caller()).await;

                    let result = queue
                        .enqueue(job, links(next_asset..next_asset + batch as u64), 1)
                        .await;
                    next_asset += batch as u64;
                    let count_after = queue.queued_amount_for(job.caller()).await;

                    prop_assert!(count_after <= ceiling);
                    match result {
                        Ok(()) => {
                            prop_assert!(count_before + batch <= ceiling);
                            prop_assert_eq!(count_after, count_before + batch);
                            prop_assert_eq!(queue.size().await, size_before + batch);
                        }
                        Err(err) => {
                            prop_assert_eq!(err, InspectError::CapacityExceeded { scope: CapacityScope::Caller });
                            prop_assert!(count_before + batch > ceiling);
                            prop_assert_eq!(count_after, count_before);
                            prop_assert_eq!(queue.size().await, size_before);
                        }
                    }
                }
                Ok(())
            })?;
        }
    }
}
