//! Request fan-out: cache first, then the queue.

use std::sync::Arc;

use async_trait::async_trait;
use skinspect_core::{CachedItem, InspectedItem, ItemInfo};
use tracing::{debug, warn};

use crate::annotate::Annotator;
use crate::error::InspectError;
use crate::job::InspectJob;
use crate::metrics;
use crate::queue::{Dispatcher, InspectQueue, QueueEntry};
use crate::session::SessionPool;
use crate::store::StoreHandle;

/// Resolves jobs from storage and feeds the rest to the queue
pub struct Inspector {
    store: StoreHandle,
    pool: Arc<SessionPool>,
    queue: Arc<InspectQueue>,
    annotator: Arc<dyn Annotator>,
}

impl Inspector {
    pub fn new(
        store: StoreHandle,
        pool: Arc<SessionPool>,
        queue: Arc<InspectQueue>,
        annotator: Arc<dyn Annotator>,
    ) -> Self {
        Self { store, pool, queue, annotator }
    }

    /// Start resolving every pending slot of `job`.
    ///
    /// Cached items resolve immediately. The job completes later through its
    /// receiver once the queue has settled the rest.
    pub async fn submit(&self, job: &Arc<InspectJob>) {
        let asset_ids: Vec<u64> = job.remaining().iter().map(|l| l.reference.asset_id).collect();

        // A read failure only costs a round-trip per item
        let cached = match self.store.lookup_many(asset_ids).await {
            Ok(cached) => cached,
            Err(e) => {
                warn!(caller = job.caller(), error = %e, "Cache lookup failed, inspecting everything");
                Vec::new()
            }
        };
        metrics::record_cache_hits(cached.len());

        for CachedItem { mut info, price } in cached {
            let asset_id = info.a;
            if price.is_none() {
                if let Some(submitted) = job.link(asset_id).and_then(|l| l.price) {
                    if let Err(e) = self.store.update_price(asset_id, submitted).await {
                        debug!(asset_id, error = %e, "Submitted price not stored");
                    }
                }
            }
            self.annotator.annotate(&mut info);
            job.resolve_success(asset_id, info);
        }

        let remaining = job.remaining();
        if remaining.is_empty() {
            return;
        }
        metrics::record_cache_misses(remaining.len());

        if !self.pool.is_any_ready() {
            job.resolve_remaining(InspectError::NoSessionsAvailable);
            return;
        }

        let max_attempts = self.queue.config().max_attempts;
        if let Err(e) = self.queue.enqueue(job, remaining, max_attempts).await {
            job.resolve_remaining(e);
        }
    }
}

#[async_trait]
impl Dispatcher for Inspector {
    async fn deliver(&self, entry: &QueueEntry, item: InspectedItem) {
        let asset_id = entry.asset_id();

        // The caller still gets the item if it cannot be stored
        if let Err(e) = self.store.upsert(item.clone(), entry.link.price).await {
            warn!(asset_id, error = %e, "Inspected item not stored");
        }
        let rank = self.store.rank(asset_id).await.unwrap_or_default();

        let mut info = ItemInfo::from_inspected(&item, rank);
        self.annotator.annotate(&mut info);
        entry.job.resolve_success(asset_id, info);
    }
}
