//! Per-request aggregation of inspection results.
//!
//! One [`InspectJob`] is created per HTTP request. It holds one slot per
//! asset id; cache hits, worker results and pre-queue rejections all resolve
//! slots, in any order and from any task. The first time every slot is
//! resolved the response is sent through a oneshot channel.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use skinspect_core::ItemInfo;
use tokio::sync::oneshot;

use crate::error::{ErrorBody, InspectError};
use crate::reference::InspectReference;

/// One requested item and the price submitted with it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobLink {
    pub reference: InspectReference,
    pub price: Option<i32>,
}

/// Value of one bulk response entry
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum BulkResult {
    Item(Box<ItemInfo>),
    Error(ErrorBody),
}

/// What the caller receives once every slot is resolved
#[derive(Debug, Clone, PartialEq)]
pub enum JobResponse {
    Single(Result<ItemInfo, InspectError>),
    /// Keyed by asset id
    Bulk(BTreeMap<String, BulkResult>),
}

struct JobState {
    links: Vec<JobLink>,
    results: HashMap<u64, Result<ItemInfo, InspectError>>,
    responder: Option<oneshot::Sender<JobResponse>>,
}

pub struct InspectJob {
    caller: String,
    bulk: bool,
    state: Mutex<JobState>,
}

impl InspectJob {
    pub fn new(caller: impl Into<String>, bulk: bool) -> (Arc<Self>, oneshot::Receiver<JobResponse>) {
        let (tx, rx) = oneshot::channel();
        let job = Self {
            caller: caller.into(),
            bulk,
            state: Mutex::new(JobState {
                links: Vec::new(),
                results: HashMap::new(),
                responder: Some(tx),
            }),
        };
        (Arc::new(job), rx)
    }

    fn state(&self) -> MutexGuard<'_, JobState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn caller(&self) -> &str {
        &self.caller
    }

    pub fn is_bulk(&self) -> bool {
        self.bulk
    }

    /// Add a slot; a repeated asset id keeps its first slot
    pub fn add(&self, reference: InspectReference, price: Option<i32>) {
        let mut state = self.state();
        if state.links.iter().any(|l| l.reference.asset_id == reference.asset_id) {
            return;
        }
        state.links.push(JobLink { reference, price });
    }

    pub fn len(&self) -> usize {
        self.state().links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn link(&self, asset_id: u64) -> Option<JobLink> {
        self.state()
            .links
            .iter()
            .find(|l| l.reference.asset_id == asset_id)
            .copied()
    }

    /// Unresolved slots, in insertion order
    pub fn remaining(&self) -> Vec<JobLink> {
        let state = self.state();
        state
            .links
            .iter()
            .filter(|l| !state.results.contains_key(&l.reference.asset_id))
            .copied()
            .collect()
    }

    pub fn remaining_len(&self) -> usize {
        let state = self.state();
        state.links.len() - state.results.len()
    }

    pub fn is_complete(&self) -> bool {
        self.state().responder.is_none()
    }

    /// Resolve a slot with an item; returns whether the slot changed
    pub fn resolve_success(&self, asset_id: u64, item: ItemInfo) -> bool {
        self.resolve(asset_id, Ok(item))
    }

    /// Resolve a slot with an error; returns whether the slot changed
    pub fn resolve_error(&self, asset_id: u64, error: InspectError) -> bool {
        self.resolve(asset_id, Err(error))
    }

    /// Resolve every pending slot with the same error
    pub fn resolve_remaining(&self, error: InspectError) {
        let mut state = self.state();
        let pending: Vec<u64> = state
            .links
            .iter()
            .map(|l| l.reference.asset_id)
            .filter(|a| !state.results.contains_key(a))
            .collect();
        for asset_id in pending {
            state.results.insert(asset_id, Err(error.clone()));
        }
        Self::finish_if_complete(&mut state, self.bulk);
    }

    fn resolve(&self, asset_id: u64, result: Result<ItemInfo, InspectError>) -> bool {
        let mut state = self.state();
        let known = state.links.iter().any(|l| l.reference.asset_id == asset_id);
        if !known || state.results.contains_key(&asset_id) {
            return false;
        }
        state.results.insert(asset_id, result);
        Self::finish_if_complete(&mut state, self.bulk);
        true
    }

    fn finish_if_complete(state: &mut JobState, bulk: bool) {
        if state.links.is_empty() || state.results.len() < state.links.len() {
            return;
        }
        let Some(responder) = state.responder.take() else {
            return;
        };

        let response = if bulk {
            let map = state
                .results
                .iter()
                .map(|(asset_id, result)| {
                    let value = match result {
                        Ok(item) => BulkResult::Item(Box::new(item.clone())),
                        Err(e) => BulkResult::Error(e.body()),
                    };
                    (asset_id.to_string(), value)
                })
                .collect();
            JobResponse::Bulk(map)
        } else {
            let first = state.links[0].reference.asset_id;
            let result = state
                .results
                .get(&first)
                .cloned()
                .unwrap_or(Err(InspectError::TtlExceeded));
            JobResponse::Single(result)
        };

        // The caller may have gone away; nothing to do then
        let _ = responder.send(response);
    }
}
