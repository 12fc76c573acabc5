//! Subscription state for connected clients.

use crate::types::UserId;
use serde_json::{Map, Value};

/// Interest set held by a subscribed connection.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Subscription {
    /// User the connection subscribed as.
    pub user_id: UserId,

    /// Collections of interest. Empty means every collection.
    pub collections: Vec<String>,

    /// Per-collection filter objects. Stored and returned but not consulted
    /// by [`matches`].
    pub filters: Map<String, Value>,
}

impl Subscription {
    pub fn new(user_id: UserId, collections: Vec<String>) -> Self {
        Self {
            user_id,
            collections,
            filters: Map::new(),
        }
    }

    /// Whether the interest set is the "all collections" sentinel.
    pub fn is_all(&self) -> bool {
        self.collections.is_empty()
    }

    /// Filter registered for a collection, if any.
    pub fn filter_for(&self, collection: &str) -> Option<&Value> {
        self.filters.get(collection)
    }
}

/// Lifecycle of a connection's subscription.
///
/// `Idle` until the first subscribe; each later subscribe replaces the
/// subscription in place, possibly under a different user.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum SubscriptionState {
    #[default]
    Idle,
    Subscribed(Subscription),
}

impl SubscriptionState {
    pub fn subscription(&self) -> Option<&Subscription> {
        match self {
            SubscriptionState::Idle => None,
            SubscriptionState::Subscribed(sub) => Some(sub),
        }
    }

    pub fn user_id(&self) -> Option<&UserId> {
        self.subscription().map(|sub| &sub.user_id)
    }
}

/// Check if a subscription is interested in a collection.
pub fn matches(subscription: &Subscription, collection: &str) -> bool {
    subscription.collections.is_empty()
        || subscription.collections.iter().any(|c| c == collection)
}
