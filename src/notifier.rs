//! Turns committed mutations into change events.

use crate::broadcaster::{Broadcaster, PublishReport};
use crate::error::{RelayError, Result};
use crate::events::ChangeEvent;
use crate::store::MutationResult;
use crate::types::{Operation, Timestamp, NOT_FOUND_ID};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::warn;

/// Build the change event for a mutation result.
///
/// `document_id` falls back to `NOT_FOUND` so it is always present.
pub fn change_event(operation: Operation, collection: &str, result: &MutationResult) -> ChangeEvent {
    ChangeEvent {
        operation,
        collection: collection.to_string(),
        document_id: result
            .document_id()
            .unwrap_or_else(|| NOT_FOUND_ID.to_string()),
        document: result.document.clone(),
        timestamp: Timestamp::now(),
    }
}

/// Hands change events to the broadcaster once one is attached.
///
/// Notification never fails the mutation that triggered it: a missing
/// broadcaster is logged and absorbed.
#[derive(Default)]
pub struct ChangeNotifier {
    broadcaster: RwLock<Option<Arc<Broadcaster>>>,
}

impl ChangeNotifier {
    /// A notifier with no broadcaster yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier wired to `broadcaster`.
    pub fn with_broadcaster(broadcaster: Arc<Broadcaster>) -> Self {
        Self {
            broadcaster: RwLock::new(Some(broadcaster)),
        }
    }

    /// Attach (or replace) the broadcaster.
    pub fn attach(&self, broadcaster: Arc<Broadcaster>) {
        *self.broadcaster.write() = Some(broadcaster);
    }

    fn broadcaster(&self) -> Result<Arc<Broadcaster>> {
        self.broadcaster
            .read()
            .clone()
            .ok_or(RelayError::BroadcasterUnavailable)
    }

    /// Publish the change for a committed mutation.
    ///
    /// Returns `None` when the event could not be handed off.
    pub fn notify(
        &self,
        operation: Operation,
        collection: &str,
        result: &MutationResult,
    ) -> Option<PublishReport> {
        let event = change_event(operation, collection, result);
        match self.broadcaster() {
            Ok(broadcaster) => Some(broadcaster.publish(&event)),
            Err(e) => {
                warn!(
                    %operation,
                    collection,
                    document_id = %event.document_id,
                    error = %e,
                    "change notification dropped"
                );
                None
            }
        }
    }
}
