//! Error types for the relay and booking layers.

use crate::booking::TimeRange;
use crate::types::ConnectionId;
use thiserror::Error;

/// Main error type for relay operations.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Document with _id \"{id}\" already exists in {collection}")]
    DuplicateKey { collection: String, id: String },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bench {resource_id} is already booked on {date} between {existing}")]
    Overlap {
        resource_id: String,
        date: String,
        existing: TimeRange,
    },

    #[error("Invalid time: {0}")]
    InvalidTime(String),

    #[error("Broadcaster not initialized")]
    BroadcasterUnavailable,

    #[error("Connection closed: {0}")]
    ConnectionClosed(ConnectionId),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Store error: {0}")]
    Store(String),
}

impl RelayError {
    /// Whether this is a duplicate-class failure (another writer already
    /// holds the key).
    pub fn is_duplicate(&self) -> bool {
        matches!(self, RelayError::DuplicateKey { .. })
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(e: serde_json::Error) -> Self {
        RelayError::Serialization(e.to_string())
    }
}

/// Result type for relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;
