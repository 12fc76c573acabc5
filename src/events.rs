//! Change events and the wire messages exchanged with connected clients.

use crate::types::{Document, Operation, Timestamp, UserId};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// A single committed mutation, built once and discarded after broadcast.
#[derive(Clone, Debug, PartialEq)]
pub struct ChangeEvent {
    pub operation: Operation,
    pub collection: String,
    /// Always present; `NOT_FOUND` when the mutation result had no id.
    pub document_id: String,
    /// Snapshot of the affected document, if it could be resolved.
    pub document: Option<Document>,
    /// When the event was emitted (not when the write committed).
    pub timestamp: Timestamp,
}

/// Collections echoed in a subscribe acknowledgement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AckCollections {
    /// Empty interest set: every collection.
    All,
    List(Vec<String>),
}

impl AckCollections {
    pub fn from_interest(collections: &[String]) -> Self {
        if collections.is_empty() {
            AckCollections::All
        } else {
            AckCollections::List(collections.to_vec())
        }
    }
}

impl Serialize for AckCollections {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            AckCollections::All => serializer.serialize_str("all"),
            AckCollections::List(list) => list.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for AckCollections {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::String(s) if s == "all" => Ok(AckCollections::All),
            Value::Array(items) => items
                .into_iter()
                .map(|v| match v {
                    Value::String(s) => Ok(s),
                    other => Err(serde::de::Error::custom(format!(
                        "expected collection name, got {}",
                        other
                    ))),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(AckCollections::List),
            other => Err(serde::de::Error::custom(format!(
                "expected \"all\" or a list of collections, got {}",
                other
            ))),
        }
    }
}

/// Messages sent from the relay to a connection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A collection the connection is interested in changed.
    DatabaseChange {
        timestamp: Timestamp,
        operation: Operation,
        collection: String,
        #[serde(rename = "documentId")]
        document_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        data: Option<Document>,
    },

    /// Acknowledges a subscribe request.
    Subscribed {
        success: bool,
        message: String,
        collections: AckCollections,
    },

    /// Acknowledges a subscription update.
    SubscriptionUpdated { success: bool },
}

impl ServerMessage {
    /// Envelope for a change event.
    pub fn database_change(event: &ChangeEvent, include_document: bool) -> Self {
        ServerMessage::DatabaseChange {
            timestamp: event.timestamp,
            operation: event.operation,
            collection: event.collection.clone(),
            document_id: event.document_id.clone(),
            data: if include_document {
                event.document.clone()
            } else {
                None
            },
        }
    }

    /// Name of the transport event this message is emitted under.
    pub fn event_name(&self) -> &'static str {
        match self {
            ServerMessage::DatabaseChange { .. } => "database_change",
            ServerMessage::Subscribed { .. } => "subscribed",
            ServerMessage::SubscriptionUpdated { .. } => "subscription_updated",
        }
    }
}

/// Subscribe request payload: `{userId, collections?}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubscribeRequest {
    #[serde(rename = "userId")]
    pub user_id: UserId,
    #[serde(default)]
    pub collections: Option<Vec<String>>,
}

/// Subscription update payload. Only the provided fields are merged.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionUpdate {
    #[serde(default)]
    pub collections: Option<Vec<String>>,
    #[serde(default)]
    pub filters: Option<Map<String, Value>>,
}

/// Events a client sends over its connection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    Subscribe(SubscribeRequest),
    UpdateSubscription(SubscriptionUpdate),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_database_change_wire_shape() {
        let event = ChangeEvent {
            operation: Operation::Update,
            collection: "benches".into(),
            document_id: "b1".into(),
            document: Some(json!({"_id": "b1", "name": "North"})),
            timestamp: Timestamp::parse("2024-06-01T09:00:00Z").unwrap(),
        };

        let value = serde_json::to_value(ServerMessage::database_change(&event, true)).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "database_change",
                "timestamp": "2024-06-01T09:00:00.000Z",
                "operation": "UPDATE_DATA",
                "collection": "benches",
                "documentId": "b1",
                "data": {"_id": "b1", "name": "North"},
            })
        );

        let bare = serde_json::to_value(ServerMessage::database_change(&event, false)).unwrap();
        assert!(bare.get("data").is_none());
    }

    #[test]
    fn test_subscribed_ack_collections() {
        let all = ServerMessage::Subscribed {
            success: true,
            message: "ok".into(),
            collections: AckCollections::from_interest(&[]),
        };
        assert_eq!(serde_json::to_value(&all).unwrap()["collections"], json!("all"));

        let some = AckCollections::from_interest(&["benches".to_string()]);
        assert_eq!(serde_json::to_value(&some).unwrap(), json!(["benches"]));

        let parsed: AckCollections = serde_json::from_value(json!("all")).unwrap();
        assert_eq!(parsed, AckCollections::All);
    }

    #[test]
    fn test_client_event_parsing() {
        let event: ClientEvent = serde_json::from_value(json!({
            "event": "subscribe",
            "data": {"userId": "u1"}
        }))
        .unwrap();
        assert_eq!(
            event,
            ClientEvent::Subscribe(SubscribeRequest {
                user_id: UserId::new("u1"),
                collections: None,
            })
        );

        let event: ClientEvent = serde_json::from_value(json!({
            "event": "update_subscription",
            "data": {"filters": {"reservations": {"benchId": "b1"}}}
        }))
        .unwrap();
        match event {
            ClientEvent::UpdateSubscription(update) => {
                assert!(update.collections.is_none());
                assert!(update.filters.unwrap().contains_key("reservations"));
            }
            other => panic!("Expected UpdateSubscription, got {:?}", other),
        }
    }
}
