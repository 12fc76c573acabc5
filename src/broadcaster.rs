//! Fan-out of change events to subscribed connections.

use crate::config::RelayConfig;
use crate::error::{RelayError, Result};
use crate::events::{ChangeEvent, ClientEvent, ServerMessage, SubscriptionUpdate};
use crate::subscriptions::{Subscription, SubscriptionRegistry};
use crate::types::{ConnectionId, UserId};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

const SUBSCRIBED_MESSAGE: &str = "Successfully subscribed to database changes";

/// Outbound queue of one connection.
struct Outbound {
    sender: Sender<ServerMessage>,
    receiver: Receiver<ServerMessage>,
}

/// Registry and outbound queues, always mutated together.
#[derive(Default)]
struct Inner {
    registry: SubscriptionRegistry,
    outbound: HashMap<ConnectionId, Outbound>,
}

/// Outcome of a single publish.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Connections whose subscription matched.
    pub matched: usize,
    /// Messages queued successfully.
    pub delivered: usize,
    /// Matches whose queue was full or closed.
    pub failed: usize,
}

/// Transport side of a connection: where its outbound messages arrive.
pub struct ConnectionHandle {
    pub id: ConnectionId,
    receiver: Receiver<ServerMessage>,
}

impl ConnectionHandle {
    /// Receive the next message (blocking).
    pub fn recv(&self) -> std::result::Result<ServerMessage, crossbeam_channel::RecvError> {
        self.receiver.recv()
    }

    /// Try to receive a message (non-blocking).
    pub fn try_recv(&self) -> std::result::Result<ServerMessage, crossbeam_channel::TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receive with timeout.
    pub fn recv_timeout(
        &self,
        timeout: Duration,
    ) -> std::result::Result<ServerMessage, crossbeam_channel::RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Everything queued right now.
    pub fn drain(&self) -> Vec<ServerMessage> {
        self.receiver.try_iter().collect()
    }
}

/// Delivers change events to every connection interested in the event's
/// collection.
///
/// Owns the [`SubscriptionRegistry`]; nothing else reads or writes it.
/// Delivery is a non-blocking enqueue per connection: a full or closed
/// queue loses that one message and never affects other recipients.
pub struct Broadcaster {
    inner: RwLock<Inner>,
    buffer_size: usize,
    include_documents: bool,
}

impl Broadcaster {
    /// Create a broadcaster with default settings.
    pub fn new() -> Self {
        Self::with_config(&RelayConfig::default())
    }

    /// Create a broadcaster from a relay config.
    pub fn with_config(config: &RelayConfig) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            buffer_size: config.buffer_size.max(1),
            include_documents: config.include_documents,
        }
    }

    // --- Connection lifecycle ---

    /// Register a transport connection.
    ///
    /// Connecting again with a known id keeps the existing slot and returns
    /// a handle onto the same queue.
    pub fn connect(&self, id: ConnectionId) -> ConnectionHandle {
        let mut inner = self.inner.write();
        inner.registry.on_connect(&id);

        let buffer_size = self.buffer_size;
        let outbound = inner.outbound.entry(id.clone()).or_insert_with(|| {
            let (sender, receiver) = bounded(buffer_size);
            Outbound { sender, receiver }
        });

        ConnectionHandle {
            id,
            receiver: outbound.receiver.clone(),
        }
    }

    /// Drop a connection and all registry state referencing it.
    ///
    /// Messages already queued for it are not recalled.
    pub fn disconnect(&self, id: &ConnectionId) -> Option<Subscription> {
        let mut inner = self.inner.write();
        inner.outbound.remove(id);
        inner.registry.on_disconnect(id)
    }

    // --- Client events ---

    /// Dispatch an inbound client event. Returns the acknowledgement sent
    /// back, if any.
    pub fn handle(&self, id: &ConnectionId, event: ClientEvent) -> Result<Option<ServerMessage>> {
        match event {
            ClientEvent::Subscribe(request) => self
                .subscribe(id, request.user_id, request.collections)
                .map(Some),
            ClientEvent::UpdateSubscription(update) => Ok(self.update_subscription(id, update)),
        }
    }

    /// Subscribe a connection and send it a `subscribed` acknowledgement.
    ///
    /// The ack is enqueued before the write lock is released, so it precedes
    /// every change published under the new subscription.
    pub fn subscribe(
        &self,
        id: &ConnectionId,
        user_id: UserId,
        collections: Option<Vec<String>>,
    ) -> Result<ServerMessage> {
        let mut inner = self.inner.write();
        let sender = inner
            .outbound
            .get(id)
            .map(|o| o.sender.clone())
            .ok_or_else(|| RelayError::ConnectionClosed(id.clone()))?;

        let collections = inner.registry.subscribe(id, user_id, collections);
        let ack = ServerMessage::Subscribed {
            success: true,
            message: SUBSCRIBED_MESSAGE.to_string(),
            collections,
        };
        Self::deliver(id, &sender, ack.clone());
        Ok(ack)
    }

    /// Merge an update into a connection's subscription and acknowledge it.
    ///
    /// Connections that never subscribed are ignored and get no reply. As
    /// with `subscribe`, the ack is enqueued under the write lock.
    pub fn update_subscription(
        &self,
        id: &ConnectionId,
        update: SubscriptionUpdate,
    ) -> Option<ServerMessage> {
        let mut inner = self.inner.write();
        if !inner.registry.update_subscription(id, update) {
            return None;
        }
        let sender = inner.outbound.get(id).map(|o| o.sender.clone())?;

        let ack = ServerMessage::SubscriptionUpdated { success: true };
        Self::deliver(id, &sender, ack.clone());
        Some(ack)
    }

    // --- Broadcasting ---

    /// Deliver a change event to every interested connection.
    ///
    /// The set of recipients is fixed when the call starts; connections
    /// joining afterwards do not see this event.
    pub fn publish(&self, event: &ChangeEvent) -> PublishReport {
        let recipients: Vec<(ConnectionId, Sender<ServerMessage>)> = {
            let inner = self.inner.read();
            inner
                .registry
                .interested(&event.collection)
                .into_iter()
                .filter_map(|id| {
                    let sender = inner.outbound.get(&id)?.sender.clone();
                    Some((id, sender))
                })
                .collect()
        };

        let message = ServerMessage::database_change(event, self.include_documents);
        let mut report = PublishReport {
            matched: recipients.len(),
            ..Default::default()
        };

        for (id, sender) in &recipients {
            if Self::deliver(id, sender, message.clone()) {
                report.delivered += 1;
            } else {
                report.failed += 1;
            }
        }

        debug!(
            collection = %event.collection,
            operation = %event.operation,
            document_id = %event.document_id,
            matched = report.matched,
            failed = report.failed,
            "change published"
        );
        report
    }

    /// Non-blocking enqueue. Failures are logged and reported, never raised.
    fn deliver(id: &ConnectionId, sender: &Sender<ServerMessage>, message: ServerMessage) -> bool {
        match sender.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(message)) => {
                warn!(
                    connection = %id,
                    event = message.event_name(),
                    "outbound queue full, message dropped"
                );
                false
            }
            Err(TrySendError::Disconnected(message)) => {
                warn!(
                    connection = %id,
                    event = message.event_name(),
                    "outbound queue closed, message dropped"
                );
                false
            }
        }
    }

    // --- Inspection ---

    /// Subscription currently held by a connection.
    pub fn subscription(&self, id: &ConnectionId) -> Option<Subscription> {
        self.inner.read().registry.subscription(id).cloned()
    }

    /// Connection currently mapped to a user.
    pub fn connection_for_user(&self, user_id: &UserId) -> Option<ConnectionId> {
        self.inner.read().registry.connection_for_user(user_id).cloned()
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.inner.read().registry.connection_count()
    }

    /// Number of subscribed connections.
    pub fn subscription_count(&self) -> usize {
        self.inner.read().registry.subscription_count()
    }
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::AckCollections;
    use crate::types::{Operation, Timestamp};
    use serde_json::json;

    fn change(collection: &str) -> ChangeEvent {
        ChangeEvent {
            operation: Operation::Create,
            collection: collection.to_string(),
            document_id: "d1".to_string(),
            document: Some(json!({"_id": "d1"})),
            timestamp: Timestamp::now(),
        }
    }

    fn subscribed(broadcaster: &Broadcaster, id: &str, collections: Vec<&str>) -> ConnectionHandle {
        let handle = broadcaster.connect(ConnectionId::new(id));
        broadcaster
            .subscribe(
                &handle.id,
                UserId::new(format!("user-{}", id)),
                Some(collections.into_iter().map(String::from).collect()),
            )
            .unwrap();
        // Drain the ack
        assert!(matches!(
            handle.try_recv().unwrap(),
            ServerMessage::Subscribed { .. }
        ));
        handle
    }

    #[test]
    fn test_subscribe_sends_ack() {
        let broadcaster = Broadcaster::new();
        let handle = broadcaster.connect(ConnectionId::new("c1"));

        let ack = broadcaster
            .subscribe(&handle.id, UserId::new("u1"), None)
            .unwrap();

        let received = handle.try_recv().unwrap();
        assert_eq!(received, ack);
        match received {
            ServerMessage::Subscribed {
                success,
                collections,
                ..
            } => {
                assert!(success);
                assert_eq!(collections, AckCollections::All);
            }
            other => panic!("Expected Subscribed, got {:?}", other),
        }
    }

    #[test]
    fn test_subscribe_unknown_connection() {
        let broadcaster = Broadcaster::new();
        let result = broadcaster.subscribe(&ConnectionId::new("ghost"), UserId::new("u1"), None);
        assert!(matches!(result, Err(RelayError::ConnectionClosed(_))));
        assert_eq!(broadcaster.subscription_count(), 0);
    }

    #[test]
    fn test_publish_to_matching_only() {
        let broadcaster = Broadcaster::new();
        let benches = subscribed(&broadcaster, "c1", vec!["benches"]);
        let all = subscribed(&broadcaster, "c2", vec![]);

        let report = broadcaster.publish(&change("reservations"));
        assert_eq!(report.matched, 1);
        assert_eq!(report.delivered, 1);

        assert!(benches.try_recv().is_err());
        match all.try_recv().unwrap() {
            ServerMessage::DatabaseChange { collection, .. } => {
                assert_eq!(collection, "reservations");
            }
            other => panic!("Expected DatabaseChange, got {:?}", other),
        }
    }

    #[test]
    fn test_idle_connection_receives_nothing() {
        let broadcaster = Broadcaster::new();
        let handle = broadcaster.connect(ConnectionId::new("c1"));

        let report = broadcaster.publish(&change("benches"));
        assert_eq!(report, PublishReport::default());
        assert!(handle.try_recv().is_err());
    }

    #[test]
    fn test_full_queue_isolated() {
        let broadcaster = Broadcaster::with_config(&RelayConfig {
            buffer_size: 1,
            ..Default::default()
        });
        let slow = subscribed(&broadcaster, "slow", vec![]);
        let fast = subscribed(&broadcaster, "fast", vec![]);

        broadcaster.publish(&change("benches"));
        // Fast consumer keeps up, slow one does not.
        fast.try_recv().unwrap();

        let report = broadcaster.publish(&change("benches"));
        assert_eq!(report.matched, 2);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, 1);
        assert!(fast.try_recv().is_ok());

        // Slow consumer stays registered and only missed the overflow.
        assert_eq!(broadcaster.subscription_count(), 2);
        assert_eq!(slow.drain().len(), 1);
    }

    #[test]
    fn test_disconnect_stops_delivery() {
        let broadcaster = Broadcaster::new();
        let handle = subscribed(&broadcaster, "c1", vec![]);

        assert!(broadcaster.disconnect(&handle.id).is_some());
        assert_eq!(broadcaster.connection_for_user(&UserId::new("user-c1")), None);

        let report = broadcaster.publish(&change("benches"));
        assert_eq!(report.matched, 0);
        assert!(handle.try_recv().is_err());
    }

    #[test]
    fn test_reconnect_same_id_shares_queue() {
        let broadcaster = Broadcaster::new();
        let first = subscribed(&broadcaster, "c1", vec![]);
        let second = broadcaster.connect(ConnectionId::new("c1"));

        // Subscription survives the reconnect.
        assert!(broadcaster.subscription(&first.id).is_some());

        broadcaster.publish(&change("benches"));
        assert!(second.try_recv().is_ok());
        assert!(first.try_recv().is_err());
    }

    #[test]
    fn test_update_subscription_ack() {
        let broadcaster = Broadcaster::new();
        let handle = subscribed(&broadcaster, "c1", vec!["benches"]);

        let ack = broadcaster.update_subscription(
            &handle.id,
            SubscriptionUpdate {
                collections: Some(vec!["reservations".into()]),
                filters: None,
            },
        );
        assert_eq!(ack, Some(ServerMessage::SubscriptionUpdated { success: true }));
        assert_eq!(handle.try_recv().unwrap(), ServerMessage::SubscriptionUpdated { success: true });

        broadcaster.publish(&change("reservations"));
        assert!(handle.try_recv().is_ok());

        let idle = broadcaster.connect(ConnectionId::new("c2"));
        assert!(broadcaster
            .update_subscription(&idle.id, SubscriptionUpdate::default())
            .is_none());
        assert!(idle.try_recv().is_err());
    }

    #[test]
    fn test_per_connection_fifo() {
        let broadcaster = Broadcaster::new();
        let handle = subscribed(&broadcaster, "c1", vec![]);

        for i in 0..5 {
            let mut event = change("benches");
            event.document_id = format!("d{}", i);
            broadcaster.publish(&event);
        }

        let ids: Vec<String> = handle
            .drain()
            .into_iter()
            .filter_map(|m| match m {
                ServerMessage::DatabaseChange { document_id, .. } => Some(document_id),
                _ => None,
            })
            .collect();
        assert_eq!(ids, vec!["d0", "d1", "d2", "d3", "d4"]);
    }

    #[test]
    fn test_ack_precedes_concurrent_changes() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;
        use std::thread;

        let broadcaster = Arc::new(Broadcaster::with_config(&RelayConfig {
            buffer_size: 1 << 16,
            ..Default::default()
        }));
        let stop = Arc::new(AtomicBool::new(false));

        let publisher = {
            let broadcaster = Arc::clone(&broadcaster);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                while !stop.load(Ordering::Relaxed) {
                    broadcaster.publish(&change("benches"));
                }
            })
        };

        for i in 0..50 {
            let handle = broadcaster.connect(ConnectionId::new(format!("c{}", i)));
            broadcaster
                .subscribe(&handle.id, UserId::new(format!("u{}", i)), None)
                .unwrap();
            match handle.recv_timeout(Duration::from_secs(1)).unwrap() {
                ServerMessage::Subscribed { .. } => {}
                other => panic!("Expected Subscribed first, got {:?}", other),
            }
            broadcaster.disconnect(&handle.id);
        }

        stop.store(true, Ordering::Relaxed);
        publisher.join().unwrap();
    }
}
