//! Document store seam.
//!
//! The relay never owns persistence. Everything it reads or writes goes
//! through [`DocumentStore`], a collection-oriented CRUD interface over a
//! schemaless store:
//! - `find` / `find_one` with field-equality queries
//! - `insert` with a unique `_id` per collection
//! - `update_one` as a shallow field merge
//! - `delete_one` returning the removed document
//!
//! [`MemoryStore`] is the in-process implementation used by tests and
//! single-node deployments.

mod memory;

pub use memory::MemoryStore;

use crate::error::{RelayError, Result};
use crate::types::{document_id, Document, ID_FIELD};
use serde_json::{Map, Value};

/// Field-equality query. Every pair must match; an empty query matches all.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Query(pub Map<String, Value>);

impl Query {
    /// Query matching every document.
    pub fn all() -> Self {
        Self::default()
    }

    /// Query on a single `_id`.
    pub fn by_id(id: impl Into<String>) -> Self {
        let id: String = id.into();
        Self::default().with(ID_FIELD, id)
    }

    /// Add an equality constraint.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), value.into());
        self
    }

    /// Build from a JSON object. Anything else is a validation error.
    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Query(map)),
            _ => Err(RelayError::Validation(
                "Query is required and must be an object".into(),
            )),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Check if a document satisfies every constraint.
    pub fn matches(&self, doc: &Document) -> bool {
        self.0
            .iter()
            .all(|(field, expected)| doc.get(field) == Some(expected))
    }
}

/// What a committed mutation hands back to its caller.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MutationResult {
    /// The affected document: inserted, post-update, or pre-delete.
    pub document: Option<Document>,
}

impl MutationResult {
    pub fn new(document: Document) -> Self {
        Self {
            document: Some(document),
        }
    }

    /// Id of the affected document, if it can be resolved.
    pub fn document_id(&self) -> Option<String> {
        self.document.as_ref().and_then(document_id)
    }
}

/// Collection CRUD against a schemaless store.
pub trait DocumentStore: Send + Sync {
    /// All documents in `collection` matching `query`.
    fn find(&self, collection: &str, query: &Query) -> Result<Vec<Document>>;

    /// First document matching `query`.
    fn find_one(&self, collection: &str, query: &Query) -> Result<Option<Document>> {
        Ok(self.find(collection, query)?.into_iter().next())
    }

    /// Insert a document. A missing `_id` is assigned by the store; an
    /// existing one must be unique within the collection.
    fn insert(&self, collection: &str, document: Document) -> Result<MutationResult>;

    /// Merge `patch` into the first document matching `query`.
    fn update_one(&self, collection: &str, query: &Query, patch: Document)
        -> Result<MutationResult>;

    /// Remove the first document matching `query`.
    fn delete_one(&self, collection: &str, query: &Query) -> Result<MutationResult>;
}

/// Reject empty or missing collection names.
pub(crate) fn validate_collection(collection: &str) -> Result<()> {
    if collection.trim().is_empty() {
        return Err(RelayError::Validation("Collection name is required".into()));
    }
    Ok(())
}
