//! Bench booking: overlap detection and post-hoc conflict handling.
//!
//! For a fixed bench and day, no two active reservations may overlap.
//! Times are half-open `[start, end)` ranges, so back-to-back bookings are
//! allowed.
//!
//! Enforcement is optimistic. [`BookingDesk::check`] validates against a
//! fresh snapshot, then the write happens separately. A booking that loses
//! a race surfaces later through [`reconcile`] as an [`Alert`].

mod conflict;
mod desk;
mod reconcile;
mod reservation;
mod time;

pub use conflict::{find_overlap, has_overlap, is_end_blocked, is_start_blocked, occupancy_for_date};
pub use desk::{BookingDesk, BookingRequest, ValidatedBooking};
pub use reconcile::{reconcile, Alert, Reconciliation};
pub use reservation::{parse_date, Bench, Reservation, ReservationStatus, Role, BENCHES, RESERVATIONS};
pub use time::{ClockTime, TimeRange};
