// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Per-topic pub/sub with bounded mailboxes, plus the conversation "busy"
//! gate that enforces single-in-flight-turn semantics (spec §4.1).
//!
//! Delivery is non-blocking and lossy for slow consumers: a full mailbox
//! silently drops the event for that subscriber. Streaming text deltas
//! prioritize liveness over completeness; the final `MessageDone` carries
//! the authoritative payload, and callers needing a full transcript re-read
//! from the store at that boundary (spec §9 "Lossy pub/sub by design").

mod event;

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

pub use event::Event;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Mailbox capacity target (spec §3, §5).
pub const MAILBOX_CAPACITY: usize = 256;

/// A handle held by a consumer. Dropping it (or calling
/// [`Broker::unsubscribe`]) closes its mailbox exactly once.
pub struct Sub {
    id: Uuid,
    topic: String,
    rx: mpsc::Receiver<Event>,
}

impl Sub {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Await the next event. Returns `None` once the mailbox is closed
    /// (after [`Broker::unsubscribe`]).
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }
}

#[derive(Default)]
struct Inner {
    subs: HashMap<String, HashMap<Uuid, mpsc::Sender<Event>>>,
    busy: HashSet<String>,
}

/// Owns all subscriptions and busy flags (spec §3 "Ownership"). Safe under
/// any number of concurrent callers; `publish` only takes a short lock on
/// the topic index, never blocking on a subscriber's mailbox.
#[derive(Default)]
pub struct Broker {
    inner: Mutex<Inner>,
}

impl Broker {
    pub fn new() -> Self {
        Self { inner: Mutex::new(Inner::default()) }
    }

    /// Create a new bounded mailbox and register it under `topic`. Multiple
    /// subscribers per topic are permitted.
    pub fn subscribe(&self, topic: &str) -> Sub {
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        let id = Uuid::new_v4();
        let mut inner = self.inner.lock().unwrap();
        inner.subs.entry(topic.to_string()).or_default().insert(id, tx);
        Sub { id, topic: topic.to_string(), rx }
    }

    /// Remove the subscription and close its mailbox. Idempotent: calling
    /// this (or dropping the `Sub`) more than once is harmless.
    pub fn unsubscribe(&self, sub: Sub) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(topic_subs) = inner.subs.get_mut(&sub.topic) {
            topic_subs.remove(&sub.id);
            if topic_subs.is_empty() {
                inner.subs.remove(&sub.topic);
            }
        }
    }

    /// Deliver `event` to every current subscriber of `topic`. Non-blocking:
    /// a full mailbox drops the event for that subscriber rather than
    /// backing up the producer.
    pub fn publish(&self, topic: &str, event: Event) {
        let inner = self.inner.lock().unwrap();
        let Some(topic_subs) = inner.subs.get(topic) else { return };
        for tx in topic_subs.values() {
            if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(event.clone()) {
                tracing::debug!(topic, "subscriber mailbox full, dropping event");
            }
        }
    }

    /// Returns true iff `topic` was not already busy (and marks it busy).
    /// Paired with [`Broker::clear_busy`] as a mutual-exclusion gate on
    /// turns; not transactional with `publish`.
    pub fn set_busy(&self, topic: &str) -> bool {
        let mut inner = self.inner.lock().unwrap();
        inner.busy.insert(topic.to_string())
    }

    pub fn clear_busy(&self, topic: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.busy.remove(topic);
    }

    pub fn is_busy(&self, topic: &str) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.busy.contains(topic)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_delivers_to_all_subscribers_of_topic() {
        let broker = Broker::new();
        let mut a = broker.subscribe("conv1");
        let mut b = broker.subscribe("conv1");
        broker.publish("conv1", Event::TurnStarted);
        assert!(matches!(a.recv().await, Some(Event::TurnStarted)));
        assert!(matches!(b.recv().await, Some(Event::TurnStarted)));
    }

    #[tokio::test]
    async fn publish_to_other_topic_is_not_delivered() {
        let broker = Broker::new();
        let mut sub = broker.subscribe("conv1");
        broker.publish("conv2", Event::TurnStarted);
        // No event pending for conv1's subscriber.
        assert!(tokio::time::timeout(std::time::Duration::from_millis(20), sub.recv()).await.is_err());
    }

    #[tokio::test]
    async fn unsubscribe_closes_mailbox() {
        let broker = Broker::new();
        let sub = broker.subscribe("conv1");
        broker.unsubscribe(sub);
        // Topic has no subscribers left; publish is a silent no-op.
        broker.publish("conv1", Event::TurnStarted);
    }

    #[test]
    fn set_busy_is_exclusive() {
        let broker = Broker::new();
        assert!(broker.set_busy("conv1"));
        assert!(!broker.set_busy("conv1"));
        assert!(broker.is_busy("conv1"));
        broker.clear_busy("conv1");
        assert!(!broker.is_busy("conv1"));
        assert!(broker.set_busy("conv1"));
    }

    #[tokio::test]
    async fn slow_consumer_drops_events_without_blocking_publisher() {
        let broker = Broker::new();
        let mut sub = broker.subscribe("conv1");
        // Flood well past capacity; publish must never block or panic.
        for _ in 0..(MAILBOX_CAPACITY + 10) {
            broker.publish("conv1", Event::TextDelta { content: "x".into() });
        }
        // At least the oldest buffered events are still readable.
        assert!(sub.recv().await.is_some());
    }
}
