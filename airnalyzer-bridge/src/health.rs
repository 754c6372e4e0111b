use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use crate::state::{new_state, Shared};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStatus {
    Discovering,
    Connected,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BridgeHealth {
    pub uptime_seconds: u64,
    pub link_status: LinkStatus,
    pub device: Option<String>,
    pub reconnects: u32,
    pub lines_ingested: u64,
    pub subscribers: usize,
}

#[derive(Clone)]
pub struct HealthTracker {
    start_time: Instant,
    reconnects: Arc<AtomicU32>,
    lines_ingested: Arc<AtomicU64>,
    link: Shared<(LinkStatus, Option<String>)>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            reconnects: Arc::new(AtomicU32::new(0)),
            lines_ingested: Arc::new(AtomicU64::new(0)),
            link: new_state((LinkStatus::Discovering, None)),
        }
    }

    pub fn mark_connected(&self, device: &str) {
        *self.link.lock() = (LinkStatus::Connected, Some(device.to_string()));
    }

    /// Link lost: back to discovery, one more reconnect on the counter.
    pub fn mark_link_lost(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
        *self.link.lock() = (LinkStatus::Discovering, None);
    }

    pub fn record_line(&self) {
        self.lines_ingested.fetch_add(1, Ordering::Relaxed);
    }

    pub fn lines_ingested(&self) -> u64 {
        self.lines_ingested.load(Ordering::Relaxed)
    }

    pub fn get_health(&self, subscribers: usize) -> BridgeHealth {
        let (link_status, device) = self.link.lock().clone();
        BridgeHealth {
            uptime_seconds: self.start_time.elapsed().as_secs(),
            link_status,
            device,
            reconnects: self.reconnects.load(Ordering::Relaxed),
            lines_ingested: self.lines_ingested(),
            subscribers,
        }
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new()
    }
}
