//! Notify-once messaging.
//!
//! Messages to a user (typically a bench owner) are written as documents
//! keyed by a caller-chosen id. Sending twice with the same key stores one
//! record. The guarantee is only as strong as the store's unique `_id`
//! constraint: there is no transaction around check and insert.
//!
//! The same records back each user's inbox: listing, read state and
//! deletion all go through the mutation gateway so clients are told to
//! refresh.

use crate::error::{RelayError, Result};
use crate::gateway::MutationGateway;
use crate::store::Query;
use crate::types::Timestamp;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::{debug, warn};
use uuid::Uuid;

const KEY_PREFIX: &str = "notify-";
const KEY_SEPARATOR: u8 = 0x1f;

/// Deduplication key of a notification; becomes the record's `_id`.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotifyKey(String);

impl NotifyKey {
    /// Deterministic key from its parts, e.g. `["reservation", id, "created"]`.
    ///
    /// The same parts always yield the same key; parts are separated so
    /// `["ab", "c"]` and `["a", "bc"]` differ.
    pub fn composite<S: AsRef<str>>(parts: &[S]) -> Self {
        let mut hasher = Sha256::new();
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                hasher.update([KEY_SEPARATOR]);
            }
            hasher.update(part.as_ref().as_bytes());
        }
        NotifyKey(format!("{}{}", KEY_PREFIX, hex::encode(hasher.finalize())))
    }

    /// Fresh random key. Only deduplicates retries that reuse it.
    pub fn server_assigned() -> Self {
        NotifyKey(Uuid::new_v4().to_string())
    }

    /// Use an existing id as the key.
    pub fn from_id(id: impl Into<String>) -> Self {
        NotifyKey(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for NotifyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NotifyKey({})", self.0)
    }
}

impl fmt::Display for NotifyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who to notify and what to say.
#[derive(Clone, Debug, PartialEq)]
pub struct NotificationPayload {
    pub user_id: String,
    pub title: String,
    pub content: String,
}

impl NotificationPayload {
    pub fn new(
        user_id: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            title: title.into(),
            content: content.into(),
        }
    }

    fn validate(&self) -> Result<()> {
        if self.user_id.trim().is_empty() {
            return Err(RelayError::Validation(
                "userId is required to create a message".into(),
            ));
        }
        if self.title.trim().is_empty() || self.content.trim().is_empty() {
            return Err(RelayError::Validation(
                "title and content are required to create a message".into(),
            ));
        }
        Ok(())
    }
}

/// Stored notification document.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    #[serde(rename = "_id")]
    pub id: NotifyKey,
    pub user_id: String,
    pub title: String,
    pub content: String,
    pub created_at: Timestamp,
    pub is_opened: bool,
}

/// Result of a `send_once` call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// This call stored the record.
    Sent,
    /// A record with this key already existed, or a concurrent call won.
    AlreadySent,
}

/// Writes notification records at most once per key.
pub struct NotifyOnceMessenger {
    gateway: MutationGateway,
    collection: String,
}

impl NotifyOnceMessenger {
    pub fn new(gateway: MutationGateway, collection: impl Into<String>) -> Self {
        Self {
            gateway,
            collection: collection.into(),
        }
    }

    /// Store a notification under `key` unless one already exists.
    ///
    /// A duplicate-key failure on insert counts as `AlreadySent`; any other
    /// failure is returned.
    pub fn send_once(&self, key: &NotifyKey, payload: &NotificationPayload) -> Result<SendOutcome> {
        payload.validate()?;

        if self
            .gateway
            .get_one(&self.collection, &Query::by_id(key.as_str()))?
            .is_some()
        {
            debug!(%key, "notification already sent");
            return Ok(SendOutcome::AlreadySent);
        }

        let record = NotificationRecord {
            id: key.clone(),
            user_id: payload.user_id.clone(),
            title: payload.title.clone(),
            content: payload.content.clone(),
            created_at: Timestamp::now(),
            is_opened: false,
        };

        match self.gateway.set(&self.collection, serde_json::to_value(&record)?) {
            Ok(_) => {
                debug!(%key, user = %payload.user_id, "notification sent");
                Ok(SendOutcome::Sent)
            }
            Err(e) if e.is_duplicate() => {
                debug!(%key, "lost insert race, notification already sent");
                Ok(SendOutcome::AlreadySent)
            }
            Err(e) => Err(e),
        }
    }

    /// The stored record for a key, if any.
    pub fn record(&self, key: &NotifyKey) -> Result<Option<NotificationRecord>> {
        self.gateway
            .get_one(&self.collection, &Query::by_id(key.as_str()))?
            .map(|doc| serde_json::from_value(doc).map_err(RelayError::from))
            .transpose()
    }

    /// A user's notifications, newest first.
    ///
    /// Documents that do not parse as records are skipped.
    pub fn inbox(&self, user_id: &str) -> Result<Vec<NotificationRecord>> {
        let docs = self
            .gateway
            .get(&self.collection, &Query::default().with("userId", user_id))?;

        let mut records: Vec<NotificationRecord> = docs
            .into_iter()
            .filter_map(|doc| match serde_json::from_value(doc) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(user = user_id, error = %e, "skipping malformed notification");
                    None
                }
            })
            .collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    /// Number of notifications the user has not opened.
    pub fn unread_count(&self, user_id: &str) -> Result<usize> {
        Ok(self.inbox(user_id)?.iter().filter(|r| !r.is_opened).count())
    }

    /// Flag a notification as read. Fails with `NotFound` for unknown keys.
    pub fn mark_opened(&self, key: &NotifyKey) -> Result<NotificationRecord> {
        let result = self.gateway.update(
            &self.collection,
            &Query::by_id(key.as_str()),
            json!({ "isOpened": true }),
        )?;
        let doc = result
            .document
            .ok_or_else(|| RelayError::NotFound(key.to_string()))?;
        Ok(serde_json::from_value(doc)?)
    }

    /// Remove one notification. Fails with `NotFound` for unknown keys.
    pub fn delete(&self, key: &NotifyKey) -> Result<()> {
        self.gateway
            .delete(&self.collection, &Query::by_id(key.as_str()))?;
        debug!(%key, "notification deleted");
        Ok(())
    }

    /// Remove every notification of a user, returning how many went.
    ///
    /// Each removal is announced on its own.
    pub fn delete_all(&self, user_id: &str) -> Result<usize> {
        let records = self.inbox(user_id)?;
        for record in &records {
            self.delete(&record.id)?;
        }
        Ok(records.len())
    }
}
