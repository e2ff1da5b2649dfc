//! Worker slots draining the queue through the session pool.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use skinspect_core::InspectedItem;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::inspect_queue::{EntryState, InspectQueue, QueueEntry};
use crate::error::InspectError;
use crate::metrics::{self, InspectTimer};
use crate::session::SessionPool;

/// Receives successful round-trips
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Persist, rank and annotate `item`, then resolve the entry's job slot
    async fn deliver(&self, entry: &QueueEntry, item: InspectedItem);
}

/// Spawn `count` worker slots
pub fn spawn_workers(
    count: usize,
    queue: Arc<InspectQueue>,
    pool: Arc<SessionPool>,
    dispatcher: Arc<dyn Dispatcher>,
) -> Vec<JoinHandle<()>> {
    (0..count)
        .map(|slot| {
            let queue = Arc::clone(&queue);
            let pool = Arc::clone(&pool);
            let dispatcher = Arc::clone(&dispatcher);
            tokio::spawn(async move {
                loop {
                    let entry = queue.next().await;
                    let rest = dispatch(slot, &queue, &pool, dispatcher.as_ref(), entry).await;
                    tokio::time::sleep(rest).await;
                }
            })
        })
        .collect()
}

/// Run one attempt for `entry`; returns how long the slot should rest
pub async fn dispatch(
    slot: usize,
    queue: &InspectQueue,
    pool: &SessionPool,
    dispatcher: &dyn Dispatcher,
    mut entry: QueueEntry,
) -> Duration {
    let default_delay = queue.config().default_delay;
    let timer = InspectTimer::new();
    let started = Instant::now();

    match pool.inspect(&entry.link.reference).await {
        Ok(inspection) => {
            dispatcher.deliver(&entry, inspection.item).await;
            queue.complete(&entry, EntryState::Succeeded).await;
            timer.record_success();
            debug!(
                slot,
                asset_id = entry.asset_id(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "Inspection delivered"
            );
            inspection.delay.unwrap_or(default_delay)
        }
        Err(err) => {
            entry.attempts_left = entry.attempts_left.saturating_sub(1);
            timer.record_failure();

            if entry.attempts_left > 0 {
                debug!(slot, asset_id = entry.asset_id(), attempts_left = entry.attempts_left, error = %err, "Retrying inspection");
                queue.retry(entry).await;
            } else {
                let (s, m) = entry.link.reference.owner_fields();
                warn!(
                    slot,
                    s,
                    a = entry.asset_id(),
                    d = entry.link.reference.checksum,
                    m,
                    caller = entry.caller(),
                    error = %err,
                    "Inspection failed"
                );
                queue.complete(&entry, EntryState::Failed).await;
                metrics::record_ttl_exceeded();
                entry.job.resolve_error(entry.asset_id(), InspectError::TtlExceeded);
            }
            default_delay
        }
    }
}
