//! Connection and user subscription registry.

use crate::events::{AckCollections, SubscriptionUpdate};
use crate::types::{ConnectionId, UserId};
use std::collections::HashMap;
use tracing::{debug, info};

use super::types::{matches, Subscription, SubscriptionState};

/// Maps connections to their interest sets and users to their most recent
/// connection.
///
/// The registry is a plain owned value. Whoever owns it (the broadcaster)
/// decides how access is serialized.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    /// Every live connection, subscribed or not.
    connections: HashMap<ConnectionId, SubscriptionState>,
    /// userId -> the connection that subscribed last as that user.
    users: HashMap<UserId, ConnectionId>,
}

impl SubscriptionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection with no subscription.
    ///
    /// Returns false (and changes nothing) if the id is already registered.
    pub fn on_connect(&mut self, connection: &ConnectionId) -> bool {
        if self.connections.contains_key(connection) {
            debug!(%connection, "reconnect with known id");
            return false;
        }
        self.connections
            .insert(connection.clone(), SubscriptionState::Idle);
        debug!(%connection, "connection registered");
        true
    }

    /// Subscribe a connection as `user_id`.
    ///
    /// `None` or an empty list subscribes to every collection. If the user
    /// was mapped to another connection, that mapping is replaced; the other
    /// connection keeps its own subscription and keeps receiving events.
    pub fn subscribe(
        &mut self,
        connection: &ConnectionId,
        user_id: UserId,
        collections: Option<Vec<String>>,
    ) -> AckCollections {
        let collections = collections.unwrap_or_default();
        let ack = AckCollections::from_interest(&collections);

        let state = self.connections.entry(connection.clone()).or_default();

        // Re-subscribing under a new user drops this connection's old user
        // mapping, but only if it still points here.
        if let Some(previous_user) = state.user_id() {
            if *previous_user != user_id
                && self.users.get(previous_user) == Some(connection)
            {
                self.users.remove(previous_user);
            }
        }

        *state = SubscriptionState::Subscribed(Subscription::new(user_id.clone(), collections));

        if let Some(orphaned) = self.users.insert(user_id.clone(), connection.clone()) {
            if orphaned != *connection {
                debug!(
                    user = %user_id,
                    %connection,
                    previous = %orphaned,
                    "user remapped to new connection"
                );
            }
        }

        info!(user = %user_id, %connection, collections = ?ack, "subscribed");
        ack
    }

    /// Merge the provided fields into an existing subscription.
    ///
    /// Returns false if the connection has not subscribed.
    pub fn update_subscription(
        &mut self,
        connection: &ConnectionId,
        update: SubscriptionUpdate,
    ) -> bool {
        let Some(SubscriptionState::Subscribed(sub)) = self.connections.get_mut(connection)
        else {
            debug!(%connection, "update for unsubscribed connection ignored");
            return false;
        };

        if let Some(collections) = update.collections {
            sub.collections = collections;
        }
        if let Some(filters) = update.filters {
            sub.filters = filters;
        }
        debug!(%connection, collections = ?sub.collections, "subscription updated");
        true
    }

    /// Remove a connection and everything that references it.
    ///
    /// Returns the subscription it held, if any. Unknown connections are a
    /// no-op.
    pub fn on_disconnect(&mut self, connection: &ConnectionId) -> Option<Subscription> {
        let state = self.connections.remove(connection)?;
        let SubscriptionState::Subscribed(sub) = state else {
            debug!(%connection, "idle connection removed");
            return None;
        };

        if self.users.get(&sub.user_id) == Some(connection) {
            self.users.remove(&sub.user_id);
        }
        info!(user = %sub.user_id, %connection, "disconnected");
        Some(sub)
    }

    /// Connections whose subscription matches `collection`.
    pub fn interested(&self, collection: &str) -> Vec<ConnectionId> {
        self.connections
            .iter()
            .filter_map(|(id, state)| match state {
                SubscriptionState::Subscribed(sub) if matches(sub, collection) => {
                    Some(id.clone())
                }
                _ => None,
            })
            .collect()
    }

    /// Subscription held by a connection.
    pub fn subscription(&self, connection: &ConnectionId) -> Option<&Subscription> {
        self.connections.get(connection)?.subscription()
    }

    /// Connection currently mapped to a user.
    pub fn connection_for_user(&self, user_id: &UserId) -> Option<&ConnectionId> {
        self.users.get(user_id)
    }

    pub fn is_connected(&self, connection: &ConnectionId) -> bool {
        self.connections.contains_key(connection)
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Number of subscribed connections.
    pub fn subscription_count(&self) -> usize {
        self.connections
            .values()
            .filter(|s| matches!(s, SubscriptionState::Subscribed(_)))
            .count()
    }
}
