//! Live change subscriptions.
//!
//! A subscription delivers a fresh snapshot of its collection's matching
//! document set on every committed mutation, plus one immediately on
//! registration. Delivery is serialized per subscription by a dedicated
//! worker task, so snapshots arrive in commit order; bursts of triggers
//! coalesce into a single snapshot carrying the latest state. The
//! snapshot channel is bounded and sends block the worker when the
//! subscriber stops draining; other subscriptions are unaffected.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use crate::document::Document;
use crate::driver::DriverInner;
use crate::filter::Filter;
use crate::observability::Logger;

/// Buffered snapshots per subscription before sends block
pub(crate) const SNAPSHOT_CHANNEL_CAPACITY: usize = 8;

/// A point-in-time view of a subscription's matching document set
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// The matching documents, possibly empty
    pub data: Vec<Document>,
    /// Set when the snapshot could not be assembled
    pub error: Option<String>,
}

/// A registered subscriber as the hub sees it
#[derive(Debug)]
pub(crate) struct Subscriber {
    pub(crate) collection: String,
    pub(crate) filter: Option<Filter>,
    pub(crate) trigger: mpsc::UnboundedSender<()>,
}

/// Registry of live subscribers
#[derive(Debug, Default)]
pub struct SubscriptionHub {
    subscribers: Mutex<HashMap<String, Subscriber>>,
}

impl SubscriptionHub {
    /// Create an empty hub
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self, id: String, subscriber: Subscriber) {
        let mut subscribers = self.subscribers.lock().expect("subscriber registry poisoned");
        subscribers.insert(id, subscriber);
    }

    /// Remove a subscriber; dropping its trigger sender ends its worker,
    /// which closes the snapshot channel exactly once
    pub(crate) fn remove(&self, id: &str) {
        let mut subscribers = self.subscribers.lock().expect("subscriber registry poisoned");
        subscribers.remove(id);
    }

    /// Wake every subscriber whose collection and filter match the
    /// mutated document.
    ///
    /// For deletions `doc` is the pre-image, so filtered subscribers of
    /// the deleted document still observe the shrunken set. The registry
    /// lock is released before any trigger is sent.
    pub(crate) fn notify(&self, collection: &str, doc: &Document) {
        let triggers: Vec<mpsc::UnboundedSender<()>> = {
            let subscribers = self.subscribers.lock().expect("subscriber registry poisoned");
            subscribers
                .values()
                .filter(|sub| sub.collection == collection)
                .filter(|sub| match &sub.filter {
                    None => true,
                    Some(filter) => match filter.included(doc) {
                        Ok(included) => included,
                        Err(e) => {
                            Logger::error(
                                "SUBSCRIPTION_FILTER_FAILED",
                                &[
                                    ("collection", collection),
                                    ("document", &doc.id),
                                    ("reason", &e.to_string()),
                                ],
                            );
                            false
                        }
                    },
                })
                .map(|sub| sub.trigger.clone())
                .collect()
        };

        for trigger in triggers {
            let _ = trigger.send(());
        }
    }

    /// Number of live subscribers
    pub fn len(&self) -> usize {
        self.subscribers.lock().expect("subscriber registry poisoned").len()
    }

    /// Whether the hub has no subscribers
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A live subscription handle.
///
/// Snapshots are read with [`next`](Self::next) (async) or
/// [`recv`](Self::recv) (blocking, for synchronous embedders).
/// Dropping the handle unsubscribes.
pub struct Subscription {
    id: String,
    driver: Arc<DriverInner>,
    rx: mpsc::Receiver<Snapshot>,
    cancelled: bool,
}

impl Subscription {
    pub(crate) fn new(id: String, driver: Arc<DriverInner>, rx: mpsc::Receiver<Snapshot>) -> Self {
        Self {
            id,
            driver,
            rx,
            cancelled: false,
        }
    }

    /// Subscription id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Await the next snapshot; `None` once the subscription is cancelled
    pub async fn next(&mut self) -> Option<Snapshot> {
        if self.cancelled {
            return None;
        }
        self.rx.recv().await
    }

    /// Block for the next snapshot.
    ///
    /// Must not be called from inside an async runtime.
    pub fn recv(&mut self) -> Option<Snapshot> {
        if self.cancelled {
            return None;
        }
        self.rx.blocking_recv()
    }

    /// Take a snapshot only if one is already queued
    pub fn try_next(&mut self) -> Option<Snapshot> {
        if self.cancelled {
            return None;
        }
        self.rx.try_recv().ok()
    }

    /// Cancel the subscription: no further deliveries, channel closed
    /// exactly once, later calls yield `None`
    pub fn unsubscribe(&mut self) {
        if self.cancelled {
            return;
        }
        self.cancelled = true;
        self.driver.hub.remove(&self.id);
        self.rx.close();
    }

    /// Whether the subscription has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if !self.cancelled {
            self.driver.hub.remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::marshal_tab_indent;

    fn doc(collection: &str, number: i64) -> Document {
        let bytes = marshal_tab_indent(&serde_json::json!({ "Number": number })).unwrap();
        let raw = serde_json::from_slice(&bytes).unwrap();
        Document::new(collection, "d1", raw)
    }

    fn subscriber(collection: &str, filter: Option<Filter>) -> (Subscriber, mpsc::UnboundedReceiver<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Subscriber {
                collection: collection.to_string(),
                filter,
                trigger: tx,
            },
            rx,
        )
    }

    #[test]
    fn test_notify_matches_collection() {
        let hub = SubscriptionHub::new();
        let (sub, mut rx) = subscriber("Test", None);
        hub.register("s1".to_string(), sub);

        hub.notify("Other", &doc("Other", 1));
        assert!(rx.try_recv().is_err());

        hub.notify("Test", &doc("Test", 1));
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_notify_applies_filter() {
        let hub = SubscriptionHub::new();
        let (sub, mut rx) = subscriber("Test", Some(Filter::new("Number", "<=", 2.0)));
        hub.register("s1".to_string(), sub);

        hub.notify("Test", &doc("Test", 5));
        assert!(rx.try_recv().is_err());

        hub.notify("Test", &doc("Test", 2));
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn test_filter_error_skips_subscriber() {
        let hub = SubscriptionHub::new();
        // Number compared against a string payload field is a type mismatch.
        let (sub, mut rx) = subscriber("Test", Some(Filter::new("Number", "==", "two")));
        hub.register("s1".to_string(), sub);

        hub.notify("Test", &doc("Test", 2));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_remove_stops_triggers() {
        let hub = SubscriptionHub::new();
        let (sub, mut rx) = subscriber("Test", None);
        hub.register("s1".to_string(), sub);
        hub.remove("s1");

        hub.notify("Test", &doc("Test", 1));
        // Sender was dropped with the registry entry.
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
        assert!(hub.is_empty());
    }
}
