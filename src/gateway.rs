//! Mutation gateway: commit to the store, then announce the change.

use crate::error::Result;
use crate::notifier::ChangeNotifier;
use crate::store::{DocumentStore, MutationResult, Query};
use crate::types::{Document, Operation};
use std::sync::Arc;
use tracing::debug;

/// Performs CRUD against the document store and notifies subscribers of
/// every committed write.
///
/// A write that commits is reported as committed regardless of whether its
/// notification reached anyone.
#[derive(Clone)]
pub struct MutationGateway {
    store: Arc<dyn DocumentStore>,
    notifier: Arc<ChangeNotifier>,
}

impl MutationGateway {
    pub fn new(store: Arc<dyn DocumentStore>, notifier: Arc<ChangeNotifier>) -> Self {
        Self { store, notifier }
    }

    /// Insert a document (`SET_DATA`).
    pub fn set(&self, collection: &str, document: Document) -> Result<MutationResult> {
        let result = self.store.insert(collection, document)?;
        self.committed(Operation::Create, collection, &result);
        Ok(result)
    }

    /// Merge `patch` into the first match of `query` (`UPDATE_DATA`).
    pub fn update(&self, collection: &str, query: &Query, patch: Document) -> Result<MutationResult> {
        let result = self.store.update_one(collection, query, patch)?;
        self.committed(Operation::Update, collection, &result);
        Ok(result)
    }

    /// Delete the first match of `query` (`DELETE_DATA`).
    pub fn delete(&self, collection: &str, query: &Query) -> Result<MutationResult> {
        let result = self.store.delete_one(collection, query)?;
        self.committed(Operation::Delete, collection, &result);
        Ok(result)
    }

    /// Read documents (`GET_DATA`). Reads are not announced.
    pub fn get(&self, collection: &str, query: &Query) -> Result<Vec<Document>> {
        self.store.find(collection, query)
    }

    /// First document matching `query`.
    pub fn get_one(&self, collection: &str, query: &Query) -> Result<Option<Document>> {
        self.store.find_one(collection, query)
    }

    fn committed(&self, operation: Operation, collection: &str, result: &MutationResult) {
        debug!(%operation, collection, "mutation committed");
        self.notifier.notify(operation, collection, result);
    }
}
