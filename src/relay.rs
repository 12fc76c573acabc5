//! Main Relay struct tying all components together.

use crate::booking::{reconcile, Bench, BookingDesk, Reconciliation, Reservation};
use crate::broadcaster::Broadcaster;
use crate::config::RelayConfig;
use crate::events::ServerMessage;
use crate::gateway::MutationGateway;
use crate::messenger::NotifyOnceMessenger;
use crate::notifier::ChangeNotifier;
use crate::store::DocumentStore;
use std::sync::Arc;

/// A wired relay.
///
/// Provides a unified interface for:
/// - Accepting connections and subscriptions ([`Broadcaster`])
/// - Committing mutations that announce themselves ([`MutationGateway`])
/// - Checked reservation writes ([`BookingDesk`])
/// - Deduplicated owner notifications ([`NotifyOnceMessenger`])
pub struct Relay {
    config: RelayConfig,
    broadcaster: Arc<Broadcaster>,
    notifier: Arc<ChangeNotifier>,
    gateway: MutationGateway,
    bookings: BookingDesk,
    messenger: NotifyOnceMessenger,
}

impl Relay {
    /// Wire a relay over `store`.
    pub fn new(config: RelayConfig, store: Arc<dyn DocumentStore>) -> Self {
        let broadcaster = Arc::new(Broadcaster::with_config(&config));
        let notifier = Arc::new(ChangeNotifier::with_broadcaster(Arc::clone(&broadcaster)));
        let gateway = MutationGateway::new(store, Arc::clone(&notifier));
        let bookings = BookingDesk::new(gateway.clone(), config.overlap_policy);
        let messenger =
            NotifyOnceMessenger::new(gateway.clone(), config.notifications_collection.clone());

        Self {
            config,
            broadcaster,
            notifier,
            gateway,
            bookings,
            messenger,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn broadcaster(&self) -> &Arc<Broadcaster> {
        &self.broadcaster
    }

    pub fn notifier(&self) -> &Arc<ChangeNotifier> {
        &self.notifier
    }

    pub fn gateway(&self) -> &MutationGateway {
        &self.gateway
    }

    pub fn bookings(&self) -> &BookingDesk {
        &self.bookings
    }

    pub fn messenger(&self) -> &NotifyOnceMessenger {
        &self.messenger
    }

    /// [`reconcile`] against this relay's notifications collection.
    pub fn reconcile(
        &self,
        message: &ServerMessage,
        viewer: &str,
        mine: &[Reservation],
        benches: &[Bench],
    ) -> Reconciliation {
        reconcile(
            message,
            viewer,
            mine,
            benches,
            &self.config.notifications_collection,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::{ConnectionId, UserId};
    use serde_json::json;

    #[test]
    fn test_components_share_broadcaster() {
        let relay = Relay::new(RelayConfig::default(), Arc::new(MemoryStore::new()));
        let handle = relay.broadcaster().connect(ConnectionId::new("c1"));
        relay
            .broadcaster()
            .subscribe(&handle.id, UserId::new("u1"), Some(vec!["benches".into()]))
            .unwrap();
        handle.drain();

        relay.gateway().set("benches", json!({"name": "North"})).unwrap();
        assert_eq!(handle.drain().len(), 1);
        assert_eq!(relay.config().notifications_collection, "messages");
    }

    #[test]
    fn test_reconcile_uses_configured_inbox() {
        let relay = Relay::new(
            RelayConfig {
                notifications_collection: "inbox".into(),
                ..Default::default()
            },
            Arc::new(MemoryStore::new()),
        );
        let handle = relay.broadcaster().connect(ConnectionId::new("c1"));
        relay
            .broadcaster()
            .subscribe(&handle.id, UserId::new("owner"), None)
            .unwrap();
        handle.drain();

        relay
            .messenger()
            .send_once(
                &crate::messenger::NotifyKey::from_id("m1"),
                &crate::messenger::NotificationPayload::new("owner", "t", "c"),
            )
            .unwrap();

        let changes = handle.drain();
        assert_eq!(changes.len(), 1);
        let outcome = relay.reconcile(&changes[0], "owner", &[], &[]);
        assert!(outcome.refetch_messages);
        assert!(outcome.alerts.is_empty());
    }
}
