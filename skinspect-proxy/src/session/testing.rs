//! Scripted sessions shared by the service's unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use skinspect_core::InspectedItem;

use super::{Inspection, Session};
use crate::error::InspectError;
use crate::reference::InspectReference;

/// Scripted session for pool, queue and aggregator tests
pub struct FakeSession {
    pub name: String,
    pub ready: AtomicBool,
    pub fail: bool,
    pub latency: Duration,
    pub delay: Option<Duration>,
    pub calls: AtomicUsize,
}

impl FakeSession {
    pub fn ok(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ready: AtomicBool::new(true),
            fail: false,
            latency: Duration::ZERO,
            delay: Some(Duration::from_millis(1)),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(name: &str) -> Self {
        Self { fail: true, ..Self::ok(name) }
    }
}

pub fn item_for(reference: &InspectReference) -> InspectedItem {
    let (s, m) = reference.owner_fields();
    InspectedItem {
        s,
        a: reference.asset_id,
        d: reference.checksum,
        m,
        floatvalue: 0.1 + (reference.asset_id % 100) as f32 / 1000.0,
        paintseed: (reference.asset_id % 1000) as u16,
        defindex: 7,
        paintindex: 44,
        rarity: 6,
        quality: 4,
        origin: 8,
        killeatervalue: None,
        customname: None,
        stickers: Vec::new(),
        keychains: Vec::new(),
    }
}

#[async_trait]
impl Session for FakeSession {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn inspect(&self, reference: &InspectReference) -> Result<Inspection, InspectError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.fail {
            return Err(InspectError::Protocol("scripted failure".to_string()));
        }
        Ok(Inspection { item: item_for(reference), delay: self.delay })
    }
}

pub fn reference(a: u64) -> InspectReference {
    InspectReference::from_parts("76561198084749846", "0", &a.to_string(), "1")
        .expect("valid reference")
}
