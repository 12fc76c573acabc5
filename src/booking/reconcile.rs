//! Client-side reaction to incoming change events.
//!
//! Change events are invalidation hints. The payload is used only to word
//! alerts; the client's state is always refreshed by re-fetching.

use super::reservation::{Bench, Reservation, BENCHES, RESERVATIONS};
use super::time::TimeRange;
use crate::events::ServerMessage;
use crate::types::{Document, Operation};
use std::fmt;

/// Something the user should be told after the fact.
#[derive(Clone, Debug, PartialEq)]
pub enum Alert {
    /// One of the viewer's reservations was deleted, typically because a
    /// conflicting booking won.
    ReservationRemoved {
        bench_name: String,
        date: Option<String>,
        range: Option<TimeRange>,
    },
    /// Another user booked a bench.
    ReservedByOther { bench_name: String },
    /// A bench the viewer holds an active reservation on was deleted.
    BenchDeleted { bench_name: String },
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Alert::ReservationRemoved {
                bench_name,
                date,
                range,
            } => {
                write!(f, "{} was booked", bench_name)?;
                if let Some(date) = date {
                    write!(f, " on {}", date)?;
                }
                if let Some(range) = range {
                    write!(f, " between {}", range)?;
                }
                write!(f, ". Your reservation was removed.")
            }
            Alert::ReservedByOther { bench_name } => {
                write!(f, "Someone else has reserved {}.", bench_name)
            }
            Alert::BenchDeleted { bench_name } => write!(
                f,
                "The bench \"{}\" has been deleted. Your reservation may no longer be valid.",
                bench_name
            ),
        }
    }
}

/// What the client should do about one change event.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Reconciliation {
    pub alerts: Vec<Alert>,
    pub refetch_reservations: bool,
    pub refetch_benches: bool,
    pub refetch_messages: bool,
}

/// Decide alerts and re-fetches for a change event.
///
/// `mine` is the viewer's currently known reservations; `benches` is only
/// used to name things. `notifications` names the collection notification
/// records live in (`RelayConfig::notifications_collection`).
pub fn reconcile(
    message: &ServerMessage,
    viewer: &str,
    mine: &[Reservation],
    benches: &[Bench],
    notifications: &str,
) -> Reconciliation {
    let ServerMessage::DatabaseChange {
        operation,
        collection,
        document_id,
        data,
        ..
    } = message
    else {
        return Reconciliation::default();
    };

    let mut outcome = Reconciliation::default();
    if collection == notifications {
        outcome.refetch_messages = true;
        return outcome;
    }

    let bench_name = |id: Option<&str>, fallback: &str| {
        id.and_then(|id| benches.iter().find(|b| b.id == id))
            .map_or_else(|| fallback.to_string(), |b| b.name.clone())
    };

    match collection.as_str() {
        RESERVATIONS => {
            let known = mine.iter().any(|r| r.id == *document_id);
            match operation {
                Operation::Delete if known => {
                    outcome.alerts.push(Alert::ReservationRemoved {
                        bench_name: bench_name(field(data, "benchId"), "bench"),
                        date: field(data, "date").map(str::to_string),
                        range: field(data, "startTime")
                            .zip(field(data, "endTime"))
                            .and_then(|(s, e)| TimeRange::parse(s, e).ok()),
                    });
                }
                Operation::Create if !known => {
                    if let Some(owner) = field(data, "userId") {
                        if owner != viewer {
                            outcome.alerts.push(Alert::ReservedByOther {
                                bench_name: bench_name(field(data, "benchId"), "a bench"),
                            });
                        }
                    }
                }
                _ => {}
            }
            outcome.refetch_reservations = true;
        }
        BENCHES => {
            if *operation == Operation::Delete
                && mine
                    .iter()
                    .any(|r| r.bench_id == *document_id && r.is_active())
            {
                outcome.alerts.push(Alert::BenchDeleted {
                    bench_name: bench_name(Some(document_id.as_str()), "you reserved"),
                });
            }
            outcome.refetch_benches = true;
            outcome.refetch_reservations = true;
        }
        _ => {}
    }

    outcome
}

fn field<'a>(data: &'a Option<Document>, name: &str) -> Option<&'a str> {
    data.as_ref()?.get(name)?.as_str()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::reservation::ReservationStatus;
    use crate::types::Timestamp;
    use serde_json::json;

    fn change(operation: Operation, collection: &str, id: &str, data: Document) -> ServerMessage {
        ServerMessage::DatabaseChange {
            timestamp: Timestamp::now(),
            operation,
            collection: collection.into(),
            document_id: id.into(),
            data: Some(data),
        }
    }

    fn mine() -> Vec<Reservation> {
        vec![Reservation {
            id: "r1".into(),
            user_id: "me".into(),
            bench_id: "b1".into(),
            date: "2024-06-01".into(),
            start_time: "09:00".parse().unwrap(),
            end_time: "10:00".parse().unwrap(),
            status: ReservationStatus::Active,
        }]
    }

    fn benches() -> Vec<Bench> {
        vec![Bench {
            id: "b1".into(),
            name: "North Window".into(),
            location: None,
        }]
    }

    #[test]
    fn test_my_reservation_deleted() {
        let msg = change(
            Operation::Delete,
            RESERVATIONS,
            "r1",
            json!({"_id": "r1", "benchId": "b1", "date": "2024-06-01",
                   "startTime": "09:00", "endTime": "10:00"}),
        );

        let outcome = reconcile(&msg, "me", &mine(), &benches(), "messages");
        assert!(outcome.refetch_reservations);
        assert!(!outcome.refetch_benches);
        assert_eq!(outcome.alerts.len(), 1);
        let text = outcome.alerts[0].to_string();
        assert!(text.contains("North Window"));
        assert!(text.contains("09:00\u{2013}10:00"));
    }

    #[test]
    fn test_new_reservation_by_other_user() {
        let msg = change(
            Operation::Create,
            RESERVATIONS,
            "r9",
            json!({"_id": "r9", "userId": "someone", "benchId": "b1"}),
        );
        let outcome = reconcile(&msg, "me", &mine(), &benches(), "messages");
        assert_eq!(
            outcome.alerts,
            vec![Alert::ReservedByOther {
                bench_name: "North Window".into()
            }]
        );

        // My own new booking raises nothing.
        let own = change(
            Operation::Create,
            RESERVATIONS,
            "r10",
            json!({"_id": "r10", "userId": "me", "benchId": "b1"}),
        );
        assert!(reconcile(&own, "me", &mine(), &benches(), "messages").alerts.is_empty());
    }

    #[test]
    fn test_bench_deleted_under_reservation() {
        let msg = change(Operation::Delete, BENCHES, "b1", json!({"_id": "b1"}));
        let outcome = reconcile(&msg, "me", &mine(), &benches(), "messages");

        assert!(outcome.refetch_benches);
        assert!(outcome.refetch_reservations);
        assert_eq!(
            outcome.alerts,
            vec![Alert::BenchDeleted {
                bench_name: "North Window".into()
            }]
        );
    }

    #[test]
    fn test_acks_need_nothing() {
        let ack = ServerMessage::SubscriptionUpdated { success: true };
        assert_eq!(
            reconcile(&ack, "me", &mine(), &benches(), "messages"),
            Reconciliation::default()
        );
    }

    #[test]
    fn test_notification_change_refetches_inbox() {
        let msg = change(
            Operation::Create,
            "messages",
            "m1",
            json!({"_id": "m1", "userId": "me"}),
        );
        let outcome = reconcile(&msg, "me", &mine(), &benches(), "messages");
        assert!(outcome.refetch_messages);
        assert!(!outcome.refetch_reservations);
        assert!(!outcome.refetch_benches);
        assert!(outcome.alerts.is_empty());

        // The collection name is configurable.
        let renamed = change(Operation::Delete, "inbox", "m1", json!({}));
        assert!(reconcile(&renamed, "me", &mine(), &benches(), "inbox").refetch_messages);
        assert!(!reconcile(&renamed, "me", &mine(), &benches(), "messages").refetch_messages);
    }
}
