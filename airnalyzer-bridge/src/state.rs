use crate::config::BridgeConfig;
use crate::health::HealthTracker;
use crate::hub::{BroadcastHub, Subscription};
use crate::models::StreamMessage;
use crate::raw_buffer::RawLineBuffer;
use crate::snapshot::SnapshotStore;
use parking_lot::Mutex;
use std::sync::Arc;

pub type Shared<T> = Arc<Mutex<T>>;

pub fn new_state<T>(value: T) -> Shared<T> {
    Arc::new(Mutex::new(value))
}

/// Everything the ingestion thread and the HTTP handlers share.
/// Built once in `main`, cloned into each component; lives as long as the server.
#[derive(Clone)]
pub struct BridgeContext {
    pub config: Arc<BridgeConfig>,
    pub snapshot: SnapshotStore,
    pub raw_lines: RawLineBuffer,
    pub hub: BroadcastHub,
    pub health: HealthTracker,
}

impl BridgeContext {
    pub fn new(config: Arc<BridgeConfig>) -> Self {
        Self {
            config,
            snapshot: SnapshotStore::new(),
            raw_lines: RawLineBuffer::new(),
            hub: BroadcastHub::new(),
            health: HealthTracker::new(),
        }
    }

    /// New `/stream` observer, greeted with the snapshot as of now.
    pub fn subscribe(&self) -> Subscription {
        let snapshot = self.snapshot.clone();
        self.hub
            .subscribe_with(move || StreamMessage::connected(snapshot.current()))
    }
}
