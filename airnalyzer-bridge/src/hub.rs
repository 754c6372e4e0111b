/**
 * BROADCAST HUB - Diffusion des lignes capteurs vers les observateurs /stream
 *
 * RÔLE : chaque observateur possède une mailbox bornée (1000 messages).
 * `publish` fait un `try_send` non bloquant dans chaque mailbox ; une mailbox
 * pleine ou fermée rend l'abonné mort, retiré après le parcours.
 *
 * Un observateur lent perd des messages puis son abonnement, mais ne ralentit
 * jamais l'ingestion série.
 */

use crate::models::StreamMessage;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

pub const MAILBOX_CAPACITY: usize = 1000;

type SubscriberSet = Mutex<HashMap<Uuid, mpsc::Sender<Arc<StreamMessage>>>>;

#[derive(Clone)]
pub struct BroadcastHub {
    subscribers: Arc<SubscriberSet>,
    mailbox_capacity: usize,
}

/// Outcome of one `publish` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PublishReport {
    pub delivered: usize,
    pub evicted: usize,
}

/// Read side of a mailbox. Dropping it leaves the subscriber set.
pub struct Subscription {
    id: Uuid,
    mailbox: mpsc::Receiver<Arc<StreamMessage>>,
    hub: Weak<SubscriberSet>,
}

impl Subscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Waits for the next message; `None` once the hub has dropped us.
    pub async fn recv(&mut self) -> Option<Arc<StreamMessage>> {
        self.mailbox.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Arc<StreamMessage>> {
        self.mailbox.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(set) = self.hub.upgrade() {
            set.lock().remove(&self.id);
        }
    }
}

impl BroadcastHub {
    pub fn new() -> Self {
        Self::with_mailbox_capacity(MAILBOX_CAPACITY)
    }

    pub fn with_mailbox_capacity(capacity: usize) -> Self {
        Self {
            subscribers: Arc::new(Mutex::new(HashMap::new())),
            mailbox_capacity: capacity.max(1),
        }
    }

    /// Registers a mailbox whose first message is `greeting()`.
    ///
    /// The greeting is built while the subscriber set is locked, so no line
    /// published concurrently can land in the mailbox ahead of it.
    pub fn subscribe_with<F>(&self, greeting: F) -> Subscription
    where
        F: FnOnce() -> StreamMessage,
    {
        let (tx, rx) = mpsc::channel(self.mailbox_capacity);
        let id = Uuid::new_v4();
        {
            let mut set = self.subscribers.lock();
            // fresh channel with capacity >= 1: cannot fail
            let _ = tx.try_send(Arc::new(greeting()));
            set.insert(id, tx);
        }
        debug!(subscriber = %id, "subscriber joined");
        Subscription {
            id,
            mailbox: rx,
            hub: Arc::downgrade(&self.subscribers),
        }
    }

    pub fn unsubscribe(&self, id: Uuid) -> bool {
        self.subscribers.lock().remove(&id).is_some()
    }

    pub fn publish(&self, message: Arc<StreamMessage>) -> PublishReport {
        let mut set = self.subscribers.lock();
        let mut dead = Vec::new();
        let mut delivered = 0;

        for (id, tx) in set.iter() {
            match tx.try_send(Arc::clone(&message)) {
                Ok(()) => delivered += 1,
                Err(_) => dead.push(*id),
            }
        }

        for id in &dead {
            set.remove(id);
            debug!(subscriber = %id, "mailbox full or closed, subscriber evicted");
        }

        PublishReport {
            delivered,
            evicted: dead.len(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MetricSnapshot, ParsedEvent, SensorKey, StreamEventKind};

    fn line(text: &str) -> Arc<StreamMessage> {
        Arc::new(StreamMessage::line(
            text.to_string(),
            ParsedEvent::Raw { text: text.to_string() },
            MetricSnapshot::zeroed(),
        ))
    }

    #[test]
    fn test_first_message_is_greeting() {
        let hub = BroadcastHub::new();
        let mut snap = MetricSnapshot::zeroed();
        snap.set(SensorKey::Temperature, 36.6);
        let mut sub = hub.subscribe_with(|| StreamMessage::connected(snap.clone()));

        let first = sub.try_recv().expect("greeting");
        assert_eq!(first.event, StreamEventKind::Connected);
        assert_eq!(first.snapshot.get(SensorKey::Temperature), Some(36.6));
    }

    #[test]
    fn test_publish_reaches_all_in_order() {
        let hub = BroadcastHub::new();
        let mut a = hub.subscribe_with(|| StreamMessage::connected(MetricSnapshot::zeroed()));
        let mut b = hub.subscribe_with(|| StreamMessage::connected(MetricSnapshot::zeroed()));
        a.try_recv();
        b.try_recv();

        for i in 0..5 {
            let report = hub.publish(line(&format!("l{i}")));
            assert_eq!(report, PublishReport { delivered: 2, evicted: 0 });
        }
        for sub in [&mut a, &mut b] {
            let got: Vec<String> = std::iter::from_fn(|| sub.try_recv()).map(|m| m.line.clone()).collect();
            assert_eq!(got, vec!["l0", "l1", "l2", "l3", "l4"]);
        }
    }

    #[test]
    fn test_full_mailbox_is_evicted_after_one_failure() {
        let hub = BroadcastHub::with_mailbox_capacity(2);
        let mut fast = hub.subscribe_with(|| StreamMessage::connected(MetricSnapshot::zeroed()));
        let _slow = hub.subscribe_with(|| StreamMessage::connected(MetricSnapshot::zeroed()));
        fast.try_recv();

        // slow: greeting + l0 fills it
        assert_eq!(hub.publish(line("l0")), PublishReport { delivered: 2, evicted: 0 });
        fast.try_recv();
        assert_eq!(hub.publish(line("l1")), PublishReport { delivered: 1, evicted: 1 });
        assert_eq!(hub.subscriber_count(), 1);

        fast.try_recv();
        assert_eq!(hub.publish(line("l2")), PublishReport { delivered: 1, evicted: 0 });
    }

    #[test]
    fn test_evicted_subscriber_drains_then_ends() {
        let hub = BroadcastHub::with_mailbox_capacity(1);
        let mut sub = hub.subscribe_with(|| StreamMessage::connected(MetricSnapshot::zeroed()));
        hub.publish(line("dropped"));
        assert_eq!(hub.subscriber_count(), 0);
        assert!(sub.try_recv().is_some());
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn test_unsubscribe_and_drop() {
        let hub = BroadcastHub::new();
        let a = hub.subscribe_with(|| StreamMessage::connected(MetricSnapshot::zeroed()));
        let b = hub.subscribe_with(|| StreamMessage::connected(MetricSnapshot::zeroed()));
        assert_eq!(hub.subscriber_count(), 2);

        assert!(hub.unsubscribe(a.id()));
        assert!(!hub.unsubscribe(a.id()));
        drop(b);
        assert_eq!(hub.subscriber_count(), 0);
        assert_eq!(hub.publish(line("nobody")), PublishReport::default());
    }

    #[tokio::test]
    async fn test_recv_after_publish() {
        let hub = BroadcastHub::new();
        let mut sub = hub.subscribe_with(|| StreamMessage::connected(MetricSnapshot::zeroed()));
        hub.publish(line("hello"));
        assert_eq!(sub.recv().await.unwrap().event, StreamEventKind::Connected);
        assert_eq!(sub.recv().await.unwrap().line, "hello");
    }
}
