//! # Benchwire
//!
//! Real-time change propagation and booking-conflict resolution for a
//! campus study-bench reservation system.
//!
//! ## Core Concepts
//!
//! - **Gateway**: Commits document mutations, then announces each one
//! - **Broadcaster**: Fans change events out to interested connections
//! - **Subscriptions**: Per-connection interest sets over collections
//! - **Booking**: Half-open interval overlap checks per bench and day
//! - **Messenger**: Notify-once messages keyed for deduplication
//!
//! ## Example
//!
//! ```ignore
//! use benchwire::{ConnectionId, MemoryStore, Relay, RelayConfig, UserId};
//! use std::sync::Arc;
//!
//! let relay = Relay::new(RelayConfig::default(), Arc::new(MemoryStore::new()));
//!
//! // A client connects and subscribes to reservations
//! let conn = relay.broadcaster().connect(ConnectionId::new("socket-1"));
//! relay.broadcaster().subscribe(&conn.id, UserId::new("u1"), Some(vec!["reservations".into()]))?;
//!
//! // Any committed reservation write reaches it
//! relay.gateway().set("reservations", json!({"benchId": "b1", ...}))?;
//! let change = conn.recv()?;
//! ```

pub mod booking;
pub mod broadcaster;
pub mod config;
pub mod error;
pub mod events;
pub mod gateway;
pub mod messenger;
pub mod notifier;
pub mod relay;
pub mod store;
pub mod subscriptions;
pub mod types;

// Re-exports
pub use booking::{
    find_overlap, has_overlap, reconcile, Alert, Bench, BookingDesk, BookingRequest, ClockTime,
    Reconciliation, Reservation, ReservationStatus, Role, TimeRange, ValidatedBooking,
};
pub use broadcaster::{Broadcaster, ConnectionHandle, PublishReport};
pub use config::{OverlapPolicy, RelayConfig};
pub use error::{RelayError, Result};
pub use events::{
    AckCollections, ChangeEvent, ClientEvent, ServerMessage, SubscribeRequest, SubscriptionUpdate,
};
pub use gateway::MutationGateway;
pub use messenger::{NotificationPayload, NotificationRecord, NotifyKey, NotifyOnceMessenger, SendOutcome};
pub use notifier::{change_event, ChangeNotifier};
pub use relay::Relay;
pub use store::{DocumentStore, MemoryStore, MutationResult, Query};
pub use subscriptions::{matches, Subscription, SubscriptionRegistry, SubscriptionState};
pub use types::*;
