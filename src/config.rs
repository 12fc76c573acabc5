//! Relay configuration.

use crate::error::Result;
use serde::Deserialize;

/// What a booking check does when it cannot fetch the existing reservations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlapPolicy {
    /// Let the booking through unchecked.
    #[default]
    FailOpen,
    /// Block the booking with the fetch error.
    FailClosed,
}

/// Relay configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Max queued outbound messages per connection. A full queue drops the
    /// message for that connection only.
    /// Default: 256
    pub buffer_size: usize,

    /// Attach the document snapshot as `data` on change envelopes.
    /// Default: true
    pub include_documents: bool,

    /// Behavior of the booking guard when the overlap fetch fails.
    pub overlap_policy: OverlapPolicy,

    /// Collection notify-once records are written to.
    /// Default: "messages"
    pub notifications_collection: String,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            buffer_size: 256,
            include_documents: true,
            overlap_policy: OverlapPolicy::FailOpen,
            notifications_collection: "messages".to_string(),
        }
    }
}

impl RelayConfig {
    /// Parse a config from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
