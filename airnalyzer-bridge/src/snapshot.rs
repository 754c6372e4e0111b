use crate::models::{MetricSnapshot, SensorKey};
use std::sync::Arc;
use tokio::sync::watch;

/// Latest value per metric.
///
/// The ingestion thread is the only writer (`merge`); everybody else gets a
/// copy through `current()`. A merge is applied in one `send_modify`, so a
/// reader never observes half of it.
#[derive(Clone)]
pub struct SnapshotStore {
    tx: Arc<watch::Sender<MetricSnapshot>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        Self::with_initial(MetricSnapshot::zeroed())
    }

    pub fn with_initial(initial: MetricSnapshot) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    /// Applies `updates` and returns the resulting snapshot.
    pub fn merge(&self, updates: &[(SensorKey, f64)]) -> MetricSnapshot {
        if !updates.is_empty() {
            self.tx.send_modify(|snap| snap.merge(updates));
        }
        self.current()
    }

    pub fn current(&self) -> MetricSnapshot {
        self.tx.borrow().clone()
    }
}

impl Default for SnapshotStore {
    fn default() -> Self {
        Self::new()
    }
}
