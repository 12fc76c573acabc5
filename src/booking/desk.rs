//! Booking validation and the reservation writes that follow it.

use super::conflict::find_overlap;
use super::reservation::{parse_date, Reservation, ReservationStatus, Role, RESERVATIONS};
use super::time::TimeRange;
use crate::config::OverlapPolicy;
use crate::error::{RelayError, Result};
use crate::gateway::MutationGateway;
use crate::store::{MutationResult, Query};
use serde_json::json;
use tracing::{debug, warn};

/// A booking as submitted from the reservation form.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BookingRequest {
    /// Set when editing an existing reservation.
    pub reservation_id: Option<String>,
    pub bench_id: String,
    pub date: String,
    pub start_time: String,
    pub end_time: String,
}

/// A booking that passed validation and the overlap check.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidatedBooking {
    pub reservation_id: Option<String>,
    pub bench_id: String,
    pub date: String,
    pub range: TimeRange,
}

/// Validates bookings against the current snapshot of active reservations
/// and writes them through the gateway.
///
/// Check and write are separate steps with no lock between them: two
/// clients can both pass the check and both write. The loser learns about
/// it afterwards from the change event of the winner's write.
pub struct BookingDesk {
    gateway: MutationGateway,
    policy: OverlapPolicy,
}

impl BookingDesk {
    pub fn new(gateway: MutationGateway, policy: OverlapPolicy) -> Self {
        Self { gateway, policy }
    }

    /// Active reservations on a bench and day, fetched fresh.
    ///
    /// Documents that do not parse as reservations are skipped.
    pub fn active_reservations(&self, bench_id: &str, date: &str) -> Result<Vec<Reservation>> {
        let query = Query::default()
            .with("benchId", bench_id)
            .with("date", date)
            .with("status", ReservationStatus::Active.as_str());

        let docs = self.gateway.get(RESERVATIONS, &query)?;
        Ok(docs
            .into_iter()
            .filter_map(|doc| match serde_json::from_value::<Reservation>(doc) {
                Ok(reservation) => Some(reservation),
                Err(e) => {
                    warn!(bench_id, date, error = %e, "skipping malformed reservation");
                    None
                }
            })
            .collect())
    }

    /// Validate a booking request.
    ///
    /// Fails with `Validation` or `InvalidTime` on bad input and with
    /// `Overlap` naming the conflicting range. Admins skip the overlap
    /// check. If the existing reservations cannot be fetched, the
    /// configured [`OverlapPolicy`] decides.
    pub fn check(&self, request: &BookingRequest, role: Role) -> Result<ValidatedBooking> {
        let bench_id = request.bench_id.trim();
        if bench_id.is_empty()
            || request.date.trim().is_empty()
            || request.start_time.trim().is_empty()
            || request.end_time.trim().is_empty()
        {
            return Err(RelayError::Validation("Please fill in all fields".into()));
        }

        let date = parse_date(&request.date)?;
        let range = TimeRange::parse(&request.start_time, &request.end_time)?;
        let reservation_id = request.reservation_id.as_deref();

        if role != Role::Admin {
            match self.active_reservations(bench_id, &date) {
                Ok(existing) => {
                    if let Some(conflict) =
                        find_overlap(bench_id, &date, &range, &existing, reservation_id)
                    {
                        debug!(bench_id, %date, conflict = %conflict.id, "booking overlaps");
                        return Err(RelayError::Overlap {
                            resource_id: bench_id.to_string(),
                            date: conflict.date.clone(),
                            existing: conflict.range().unwrap_or(range),
                        });
                    }
                }
                Err(e) => match self.policy {
                    OverlapPolicy::FailOpen => {
                        warn!(bench_id, %date, error = %e, "overlap check failed, proceeding");
                    }
                    OverlapPolicy::FailClosed => return Err(e),
                },
            }
        }

        Ok(ValidatedBooking {
            reservation_id: request.reservation_id.clone(),
            bench_id: bench_id.to_string(),
            date,
            range,
        })
    }

    /// Check a booking and, if it passes, create or update the reservation.
    pub fn save(&self, user_id: &str, role: Role, request: &BookingRequest) -> Result<MutationResult> {
        if user_id.trim().is_empty() {
            return Err(RelayError::Validation(
                "User ID is required. Please login again.".into(),
            ));
        }

        let booking = self.check(request, role)?;
        let fields = json!({
            "benchId": booking.bench_id,
            "date": booking.date,
            "startTime": booking.range.start(),
            "endTime": booking.range.end(),
            "status": ReservationStatus::Active.as_str(),
        });

        match &booking.reservation_id {
            Some(id) => self.gateway.update(RESERVATIONS, &Query::by_id(id.as_str()), fields),
            None => {
                let mut document = fields;
                document["userId"] = json!(user_id);
                self.gateway.set(RESERVATIONS, document)
            }
        }
    }

    /// Mark a reservation cancelled. It no longer blocks its slot.
    pub fn cancel(&self, reservation_id: &str) -> Result<MutationResult> {
        self.gateway.update(
            RESERVATIONS,
            &Query::by_id(reservation_id),
            json!({"status": ReservationStatus::Cancelled.as_str()}),
        )
    }

    /// Remove a reservation entirely.
    pub fn delete(&self, reservation_id: &str) -> Result<MutationResult> {
        self.gateway.delete(RESERVATIONS, &Query::by_id(reservation_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::ChangeNotifier;
    use crate::store::{DocumentStore, MemoryStore};
    use crate::types::Document;
    use std::sync::Arc;

    /// Store whose reads always fail.
    struct UnreachableStore;

    impl DocumentStore for UnreachableStore {
        fn find(&self, _: &str, _: &Query) -> Result<Vec<Document>> {
            Err(RelayError::Store("connection refused".into()))
        }

        fn insert(&self, _: &str, document: Document) -> Result<MutationResult> {
            Ok(MutationResult::new(document))
        }

        fn update_one(&self, _: &str, _: &Query, patch: Document) -> Result<MutationResult> {
            Ok(MutationResult::new(patch))
        }

        fn delete_one(&self, _: &str, _: &Query) -> Result<MutationResult> {
            Ok(MutationResult::default())
        }
    }

    fn desk_with(store: Arc<dyn DocumentStore>, policy: OverlapPolicy) -> BookingDesk {
        BookingDesk::new(
            MutationGateway::new(store, Arc::new(ChangeNotifier::new())),
            policy,
        )
    }

    fn request(start: &str, end: &str) -> BookingRequest {
        BookingRequest {
            reservation_id: None,
            bench_id: "R".into(),
            date: "2024-06-01".into(),
            start_time: start.into(),
            end_time: end.into(),
        }
    }

    #[test]
    fn test_overlap_message_names_range() {
        let desk = desk_with(Arc::new(MemoryStore::new()), OverlapPolicy::FailOpen);
        desk.save("u1", Role::User, &request("09:00", "10:00")).unwrap();

        let err = desk.check(&request("09:30", "10:30"), Role::User).unwrap_err();
        assert!(matches!(err, RelayError::Overlap { .. }));
        assert!(err.to_string().contains("09:00\u{2013}10:00"));
        assert!(err.to_string().contains("2024-06-01"));
    }

    #[test]
    fn test_admin_skips_overlap() {
        let desk = desk_with(Arc::new(MemoryStore::new()), OverlapPolicy::FailOpen);
        desk.save("u1", Role::User, &request("09:00", "10:00")).unwrap();

        assert!(desk.check(&request("09:30", "10:30"), Role::Admin).is_ok());
    }

    #[test]
    fn test_input_validation() {
        let desk = desk_with(Arc::new(MemoryStore::new()), OverlapPolicy::FailOpen);

        let mut missing = request("09:00", "10:00");
        missing.bench_id = "  ".into();
        assert!(matches!(
            desk.check(&missing, Role::User),
            Err(RelayError::Validation(_))
        ));

        assert!(matches!(
            desk.check(&request("10:00", "10:00"), Role::User),
            Err(RelayError::InvalidTime(_))
        ));

        assert!(matches!(
            desk.save("", Role::User, &request("09:00", "10:00")),
            Err(RelayError::Validation(_))
        ));
    }

    #[test]
    fn test_fetch_failure_policy() {
        let open = desk_with(Arc::new(UnreachableStore), OverlapPolicy::FailOpen);
        assert!(open.check(&request("09:00", "10:00"), Role::User).is_ok());

        let closed = desk_with(Arc::new(UnreachableStore), OverlapPolicy::FailClosed);
        assert!(matches!(
            closed.check(&request("09:00", "10:00"), Role::User),
            Err(RelayError::Store(_))
        ));
    }

    #[test]
    fn test_edit_and_cancel_free_the_slot() {
        let desk = desk_with(Arc::new(MemoryStore::new()), OverlapPolicy::FailOpen);
        let created = desk.save("u1", Role::User, &request("09:00", "10:00")).unwrap();
        let id = created.document_id().unwrap();

        // Moving the reservation within its own slot is allowed.
        let mut edit = request("09:30", "10:30");
        edit.reservation_id = Some(id.clone());
        let updated = desk.save("u1", Role::User, &edit).unwrap();
        assert_eq!(updated.document.unwrap()["startTime"], "09:30");

        desk.cancel(&id).unwrap();
        assert!(desk.check(&request("09:30", "10:30"), Role::User).is_ok());
        assert!(desk.active_reservations("R", "2024-06-01").unwrap().is_empty());
    }
}
