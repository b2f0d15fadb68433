//! Shared notification state.
//!
//! The store and the unread tracker sit behind one lock, so an inbound add and a
//! user's mark-as-read or clear are applied atomically with respect to each other
//! and the unread count is republished inside the same critical section.

use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

use crate::error::ParseError;
use crate::model::Notification;
use crate::navigation::{NavigationResolver, Route};
use crate::parser;
use crate::store::NotificationStore;
use crate::subscription::Channel;
use crate::unread::UnreadTracker;

/// Broadcast channel capacity for notification events.
const EVENT_BROADCAST_CAPACITY: usize = 256;

/// Changes to the notification collection, for UI consumers.
#[derive(Debug, Clone)]
pub enum NotificationEvent {
    /// A new record was stored
    Received {
        notification: Notification,
        channel: Channel,
    },
    Read {
        id: String,
    },
    AllRead {
        count: usize,
    },
    Cleared,
}

struct Inner {
    store: NotificationStore,
    unread: UnreadTracker,
}

pub struct NotificationCenter {
    inner: Mutex<Inner>,
    resolver: NavigationResolver,
    event_tx: broadcast::Sender<NotificationEvent>,
}

impl NotificationCenter {
    pub fn new(capacity: Option<usize>, resolver: NavigationResolver) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_BROADCAST_CAPACITY);
        Self {
            inner: Mutex::new(Inner {
                store: NotificationStore::with_capacity_limit(capacity),
                unread: UnreadTracker::new(),
            }),
            resolver,
            event_tx,
        }
    }

    /// Parse a frame body and store the result.
    ///
    /// Returns `Ok(false)` for a duplicate. A parse failure drops only this payload.
    pub fn ingest(&self, channel: Channel, raw: &str) -> Result<bool, ParseError> {
        match parser::parse(raw) {
            Ok(notification) => Ok(self.add(notification, channel)),
            Err(e) => {
                warn!(%channel, error = %e, "Dropping malformed notification payload");
                Err(e)
            }
        }
    }

    pub fn add(&self, notification: Notification, channel: Channel) -> bool {
        let mut inner = self.inner.lock();
        let id = notification.id.clone();
        if !inner.store.add(notification.clone()) {
            debug!(%id, %channel, "Duplicate notification ignored");
            return false;
        }
        let unread = inner.unread.observe(&inner.store);
        drop(inner);

        debug!(%id, %channel, unread, "Notification stored");
        let _ = self.event_tx.send(NotificationEvent::Received {
            notification,
            channel,
        });
        true
    }

    pub fn mark_as_read(&self, id: &str) -> bool {
        let mut inner = self.inner.lock();
        let changed = inner.store.mark_as_read(id);
        inner.unread.observe(&inner.store);
        drop(inner);

        if changed {
            let _ = self.event_tx.send(NotificationEvent::Read { id: id.to_string() });
        }
        changed
    }

    pub fn mark_all_as_read(&self) -> usize {
        let mut inner = self.inner.lock();
        let count = inner.store.mark_all_as_read();
        inner.unread.observe(&inner.store);
        drop(inner);

        if count > 0 {
            let _ = self.event_tx.send(NotificationEvent::AllRead { count });
        }
        count
    }

    pub fn clear_all(&self) {
        let mut inner = self.inner.lock();
        inner.store.clear_all();
        inner.unread.observe(&inner.store);
        drop(inner);

        let _ = self.event_tx.send(NotificationEvent::Cleared);
    }

    /// Click handling: mark read, then resolve where to go.
    ///
    /// The record is marked read even when there is no route.
    pub fn acknowledge(&self, id: &str) -> Option<Route> {
        self.mark_as_read(id);
        let inner = self.inner.lock();
        inner
            .store
            .get(id)
            .and_then(|n| self.resolver.resolve(n))
    }

    pub fn resolve(&self, notification: &Notification) -> Option<Route> {
        self.resolver.resolve(notification)
    }

    pub fn action_label(&self, notification: &Notification) -> Option<String> {
        self.resolver.action_label(notification)
    }

    /// Snapshot, newest first.
    pub fn notifications(&self) -> Vec<Notification> {
        self.inner.lock().store.list()
    }

    pub fn get(&self, id: &str) -> Option<Notification> {
        self.inner.lock().store.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().store.is_empty()
    }

    pub fn unread_count(&self) -> usize {
        self.inner.lock().unread.current()
    }

    pub fn watch_unread(&self) -> watch::Receiver<usize> {
        self.inner.lock().unread.watch()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NotificationEvent> {
        self.event_tx.subscribe()
    }
}

impl Default for NotificationCenter {
    fn default() -> Self {
        Self::new(None, NavigationResolver::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NotificationType;

    const ORDER_CREATED: &str = r#"{"type":"ORDER_CREATED","title":"Order Placed","message":"Your order #42 was placed","orderId":"42"}"#;

    #[test]
    fn test_ingest_without_id() {
        let center = NotificationCenter::default();
        assert_eq!(center.ingest(Channel::Private, ORDER_CREATED), Ok(true));

        let stored = center.notifications();
        assert_eq!(stored.len(), 1);
        assert!(!stored[0].id.is_empty());
        assert_eq!(stored[0].order_id.as_deref(), Some("42"));
        assert_eq!(center.unread_count(), 1);
    }

    #[test]
    fn test_cross_channel_duplicate_collapses() {
        let center = NotificationCenter::default();
        let raw = r#"{"id":"evt-9","type":"PAYMENT_SUCCESS","title":"Paid","message":"ok"}"#;

        assert_eq!(center.ingest(Channel::Private, raw), Ok(true));
        assert_eq!(center.ingest(Channel::Broadcast, raw), Ok(false));
        assert_eq!(center.len(), 1);
        assert_eq!(center.unread_count(), 1);
    }

    #[test]
    fn test_malformed_between_valid() {
        let center = NotificationCenter::default();
        center
            .ingest(Channel::Broadcast, r#"{"id":"1","type":"ORDER_CREATED","message":"a"}"#)
            .unwrap();
        assert!(center.ingest(Channel::Broadcast, "{oops").is_err());
        center
            .ingest(Channel::Broadcast, r#"{"id":"2","type":"ORDER_CREATED","message":"b"}"#)
            .unwrap();

        let ids: Vec<_> = center.notifications().into_iter().map(|n| n.id).collect();
        assert_eq!(ids, ["2", "1"]);
    }

    #[test]
    fn test_mark_read_and_clear() {
        let center = NotificationCenter::default();
        center.add(
            Notification::new("a", NotificationType::OrderCreated, "t", "m"),
            Channel::Private,
        );
        center.add(
            Notification::new("b", NotificationType::RefundProcessed, "t", "m"),
            Channel::Private,
        );
        assert_eq!(center.unread_count(), 2);

        assert!(center.mark_as_read("a"));
        assert_eq!(center.unread_count(), 1);
        assert!(!center.mark_as_read("a"));
        assert_eq!(center.unread_count(), 1);

        center.clear_all();
        assert!(center.is_empty());
        assert_eq!(center.unread_count(), 0);
    }

    #[test]
    fn test_acknowledge_marks_read_without_route() {
        let center = NotificationCenter::default();
        center.add(
            Notification::new("r", NotificationType::RefundProcessed, "t", "m"),
            Channel::Private,
        );
        center.add(
            Notification::new("o", NotificationType::OrderCreated, "t", "m"),
            Channel::Private,
        );

        assert_eq!(center.acknowledge("r"), None);
        assert!(center.get("r").unwrap().read);

        assert_eq!(
            center.acknowledge("o"),
            Some(Route::OrderHistory("/orders".into()))
        );
        assert_eq!(center.unread_count(), 0);
        assert_eq!(center.acknowledge("missing"), None);
    }

    #[tokio::test]
    async fn test_events_and_unread_watch() {
        let center = NotificationCenter::default();
        let mut events = center.subscribe();
        let mut unread = center.watch_unread();

        center.ingest(Channel::Broadcast, ORDER_CREATED).unwrap();
        match events.recv().await.unwrap() {
            NotificationEvent::Received { channel, .. } => assert_eq!(channel, Channel::Broadcast),
            other => panic!("unexpected event {other:?}"),
        }
        unread.changed().await.unwrap();
        assert_eq!(*unread.borrow(), 1);

        center.mark_all_as_read();
        assert!(matches!(
            events.recv().await.unwrap(),
            NotificationEvent::AllRead { count: 1 }
        ));
        center.clear_all();
        assert!(matches!(events.recv().await.unwrap(), NotificationEvent::Cleared));
    }
}
