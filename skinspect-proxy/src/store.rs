//! Async handle over the blocking item store.
//!
//! The SQLite connection lives behind a `std::sync::Mutex`; every call runs on
//! the blocking pool so request tasks never hold up the runtime.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use skinspect_core::{
    CachedItem, FloatRarity, HistoryEntry, InspectedItem, ItemStore, PatternStats, Rank,
    StoreError, StoreResult,
};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::InspectError;
use crate::metrics;

type PendingWrites = Mutex<Vec<(InspectedItem, Option<i32>)>>;

/// Cloneable handle to the shared item store
#[derive(Clone)]
pub struct StoreHandle {
    store: Arc<Mutex<ItemStore>>,
    /// Present in buffered mode: upserts wait here for the next flush
    pending: Option<Arc<PendingWrites>>,
}

impl StoreHandle {
    /// Writes go straight to the store
    pub fn new(store: ItemStore) -> Self {
        Self { store: Arc::new(Mutex::new(store)), pending: None }
    }

    /// Writes are batched until [`Self::flush`]
    pub fn buffered(store: ItemStore) -> Self {
        Self {
            store: Arc::new(Mutex::new(store)),
            pending: Some(Arc::new(Mutex::new(Vec::new()))),
        }
    }

    pub fn is_buffered(&self) -> bool {
        self.pending.is_some()
    }

    async fn run<T, F>(&self, operation: &'static str, f: F) -> Result<T, InspectError>
    where
        T: Send + 'static,
        F: FnOnce(&mut ItemStore) -> StoreResult<T> + Send + 'static,
    {
        let store = Arc::clone(&self.store);
        let result = tokio::task::spawn_blocking(move || {
            let mut guard = store.lock().map_err(|_| StoreError::Poisoned)?;
            f(&mut *guard)
        })
        .await
        .map_err(|e| {
            metrics::record_storage_error(operation);
            InspectError::Storage(format!("{operation}: blocking task failed: {e}"))
        })?;

        result.map_err(|e| {
            metrics::record_storage_error(operation);
            warn!(operation, error = %e, "Store operation failed");
            InspectError::from(e)
        })
    }

    pub async fn lookup_many(&self, asset_ids: Vec<u64>) -> Result<Vec<CachedItem>, InspectError> {
        if asset_ids.is_empty() {
            return Ok(Vec::new());
        }
        self.run("lookup", move |store| store.lookup_many(&asset_ids)).await
    }

    /// Persist one inspection result, or queue it in buffered mode
    pub async fn upsert(&self, item: InspectedItem, price: Option<i32>) -> Result<(), InspectError> {
        if let Some(pending) = &self.pending {
            pending.lock().unwrap_or_else(PoisonError::into_inner).push((item, price));
            return Ok(());
        }
        self.run("upsert", move |store| store.upsert_batch(&[(item, price)]))
            .await
            .map(|_| ())
    }

    /// Write every buffered upsert in one transaction; returns rows written
    pub async fn flush(&self) -> Result<usize, InspectError> {
        let Some(pending) = &self.pending else {
            return Ok(0);
        };
        let items = std::mem::take(&mut *pending.lock().unwrap_or_else(PoisonError::into_inner));
        if items.is_empty() {
            return Ok(0);
        }

        let count = items.len();
        let written = self.run("flush", move |store| store.upsert_batch(&items)).await?;
        debug!(buffered = count, written, "Flushed buffered upserts");
        Ok(written)
    }

    /// Flush buffered upserts every `interval`; `None` when writes are immediate
    pub fn spawn_flusher(&self, interval: Duration) -> Option<JoinHandle<()>> {
        self.pending.as_ref()?;
        let handle = self.clone();
        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                // Failed batches are logged by `run` and not retried
                let _ = handle.flush().await;
            }
        }))
    }

    pub async fn update_price(&self, asset_id: u64, price: i32) -> Result<bool, InspectError> {
        self.run("update_price", move |store| store.update_price(asset_id, price)).await
    }

    pub async fn rank(&self, asset_id: u64) -> Result<Rank, InspectError> {
        self.run("rank", move |store| store.rank(asset_id)).await
    }

    pub async fn rarity(
        &self,
        defindex: u16,
        paintindex: u16,
        wear: f32,
    ) -> Result<FloatRarity, InspectError> {
        self.run("rarity", move |store| store.rarity(defindex, paintindex, wear)).await
    }

    pub async fn pattern_stats(
        &self,
        defindex: u16,
        paintindex: u16,
    ) -> Result<Option<PatternStats>, InspectError> {
        self.run("pattern_stats", move |store| store.pattern_stats(defindex, paintindex)).await
    }

    pub async fn ownership_history(&self, float_id: u64) -> Result<Vec<HistoryEntry>, InspectError> {
        self.run("history", move |store| store.ownership_history(float_id)).await
    }

    pub async fn item_count(&self) -> Result<u64, InspectError> {
        self.run("count", |store| store.item_count()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::testing::{item_for, reference};

    fn memory() -> ItemStore {
        ItemStore::open_in_memory().unwrap()
    }

    #[tokio::test]
    async fn test_upsert_then_lookup() {
        let store = StoreHandle::new(memory());
        store.upsert(item_for(&reference(11)), None).await.unwrap();
        store.upsert(item_for(&reference(12)), None).await.unwrap();

        let found = store.lookup_many(vec![11, 12, 13]).await.unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(store.item_count().await.unwrap(), 2);
        assert_eq!(store.flush().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_update_price_on_cached_item() {
        let store = StoreHandle::new(memory());
        store.upsert(item_for(&reference(11)), None).await.unwrap();

        assert!(store.update_price(11, 2500).await.unwrap());
        assert!(!store.update_price(99, 2500).await.unwrap());
        let found = store.lookup_many(vec![11]).await.unwrap();
        assert_eq!(found[0].price, Some(2500));
    }

    #[tokio::test]
    async fn test_buffered_writes_wait_for_flush() {
        let store = StoreHandle::buffered(memory());
        assert!(store.is_buffered());

        store.upsert(item_for(&reference(21)), None).await.unwrap();
        store.upsert(item_for(&reference(22)), None).await.unwrap();
        assert!(store.lookup_many(vec![21, 22]).await.unwrap().is_empty());

        assert_eq!(store.flush().await.unwrap(), 2);
        assert_eq!(store.lookup_many(vec![21, 22]).await.unwrap().len(), 2);
        assert_eq!(store.flush().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_flusher_drains_buffer() {
        let store = StoreHandle::buffered(memory());
        let flusher = store.spawn_flusher(Duration::from_millis(10)).unwrap();

        store.upsert(item_for(&reference(31)), None).await.unwrap();
        let mut found = Vec::new();
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            found = store.lookup_many(vec![31]).await.unwrap();
            if !found.is_empty() {
                break;
            }
        }
        flusher.abort();
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn test_immediate_mode_has_no_flusher() {
        let store = StoreHandle::new(memory());
        assert!(store.spawn_flusher(Duration::from_secs(1)).is_none());
    }

    #[tokio::test]
    async fn test_rank_of_unknown_is_empty() {
        let store = StoreHandle::new(memory());
        assert_eq!(store.rank(404).await.unwrap(), Rank::default());
        assert!(store.pattern_stats(7, 44).await.unwrap().is_none());
        assert!(store.ownership_history(404).await.unwrap().is_empty());
    }
}
