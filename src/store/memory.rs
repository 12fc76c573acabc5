//! In-memory document store.

use super::{validate_collection, DocumentStore, MutationResult, Query};
use crate::error::{RelayError, Result};
use crate::types::{document_id, Document, ID_FIELD};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use uuid::Uuid;

/// Collections held in memory, in insertion order.
///
/// The `_id` uniqueness check and the insert happen under one write lock,
/// so concurrent inserts of the same id see exactly one winner.
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Document>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents in a collection.
    pub fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .get(collection)
            .map_or(0, |docs| docs.len())
    }
}

impl DocumentStore for MemoryStore {
    fn find(&self, collection: &str, query: &Query) -> Result<Vec<Document>> {
        validate_collection(collection)?;

        let collections = self.collections.read();
        Ok(collections
            .get(collection)
            .map(|docs| docs.iter().filter(|d| query.matches(d)).cloned().collect())
            .unwrap_or_default())
    }

    fn insert(&self, collection: &str, document: Document) -> Result<MutationResult> {
        validate_collection(collection)?;

        let Value::Object(mut fields) = document else {
            return Err(RelayError::Validation("Document must be an object".into()));
        };

        let id = match fields.get(ID_FIELD) {
            Some(Value::String(id)) if !id.is_empty() => id.clone(),
            Some(Value::String(_)) | Some(Value::Null) | None => {
                let id = Uuid::new_v4().to_string();
                fields.insert(ID_FIELD.to_string(), Value::String(id.clone()));
                id
            }
            Some(_) => {
                return Err(RelayError::Validation("_id must be a string".into()));
            }
        };

        let document = Value::Object(fields);

        let mut collections = self.collections.write();
        let docs = collections.entry(collection.to_string()).or_default();
        if docs.iter().any(|d| document_id(d).as_deref() == Some(id.as_str())) {
            return Err(RelayError::DuplicateKey {
                collection: collection.to_string(),
                id,
            });
        }
        docs.push(document.clone());

        Ok(MutationResult::new(document))
    }

    fn update_one(
        &self,
        collection: &str,
        query: &Query,
        patch: Document,
    ) -> Result<MutationResult> {
        validate_collection(collection)?;
        if query.is_empty() {
            return Err(RelayError::Validation(
                "Query is required and must be an object".into(),
            ));
        }
        let Value::Object(patch) = patch else {
            return Err(RelayError::Validation(
                "Update is required and must be an object".into(),
            ));
        };

        let mut collections = self.collections.write();
        let target = collections
            .get_mut(collection)
            .and_then(|docs| docs.iter_mut().find(|d| query.matches(d)))
            .ok_or_else(|| RelayError::NotFound("No matching record found to update".into()))?;

        if let Value::Object(fields) = target {
            for (key, value) in patch {
                // The key is immutable once assigned.
                if key == ID_FIELD {
                    continue;
                }
                fields.insert(key, value);
            }
        }

        Ok(MutationResult::new(target.clone()))
    }

    fn delete_one(&self, collection: &str, query: &Query) -> Result<MutationResult> {
        validate_collection(collection)?;
        if query.is_empty() {
            return Err(RelayError::Validation(
                "Query is required and must be an object".into(),
            ));
        }

        let mut collections = self.collections.write();
        let docs = collections
            .get_mut(collection)
            .ok_or_else(|| RelayError::NotFound("No matching record found to delete".into()))?;
        let pos = docs
            .iter()
            .position(|d| query.matches(d))
            .ok_or_else(|| RelayError::NotFound("No matching record found to delete".into()))?;

        Ok(MutationResult::new(docs.remove(pos)))
    }
}
