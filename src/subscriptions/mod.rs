//! Subscription registry for live collection changes.
//!
//! Every connection passes through three events:
//! - connect: an idle slot is registered
//! - subscribe / update: the slot gains or changes an interest set
//! - disconnect: the slot and any user mapping pointing at it are removed
//!
//! Interest is decided solely by [`matches`]: an empty collection list
//! means every collection, otherwise the event's collection must be listed.
//!
//! # Example
//!
//! ```ignore
//! let mut registry = SubscriptionRegistry::new();
//! let conn = ConnectionId::new("socket-1");
//!
//! registry.on_connect(&conn);
//! registry.subscribe(&conn, UserId::new("u1"), Some(vec!["benches".into()]));
//!
//! assert_eq!(registry.interested("benches"), vec![conn.clone()]);
//! assert!(registry.interested("reservations").is_empty());
//! ```

mod registry;
mod types;

pub use registry::SubscriptionRegistry;
pub use types::{matches, Subscription, SubscriptionState};
