//! Interval-overlap detection over a snapshot of active reservations.

use super::reservation::Reservation;
use super::time::{ClockTime, TimeRange};

/// First active reservation on `(resource_id, date)` overlapping `candidate`.
///
/// `exclude_id` skips the reservation being edited so an in-place change
/// does not conflict with itself. Reservations on other benches or days,
/// or not active, are ignored even if the snapshot contains them.
pub fn find_overlap<'a>(
    resource_id: &str,
    date: &str,
    candidate: &TimeRange,
    existing: &'a [Reservation],
    exclude_id: Option<&str>,
) -> Option<&'a Reservation> {
    same_slot(existing, resource_id, date, exclude_id).find(|r| {
        r.range()
            .map_or(false, |range| candidate.overlaps(&range))
    })
}

/// Whether `candidate` overlaps any active reservation on `(resource_id, date)`.
pub fn has_overlap(
    resource_id: &str,
    date: &str,
    candidate: &TimeRange,
    existing: &[Reservation],
    exclude_id: Option<&str>,
) -> bool {
    find_overlap(resource_id, date, candidate, existing, exclude_id).is_some()
}

/// Active reservations on a bench and day, earliest first.
pub fn occupancy_for_date<'a>(
    existing: &'a [Reservation],
    resource_id: &str,
    date: &str,
    exclude_id: Option<&str>,
) -> Vec<&'a Reservation> {
    let mut slots: Vec<&Reservation> = same_slot(existing, resource_id, date, exclude_id).collect();
    slots.sort_by_key(|r| r.start_time);
    slots
}

/// Whether a new booking may not start at `time`.
pub fn is_start_blocked(
    existing: &[Reservation],
    resource_id: &str,
    date: &str,
    exclude_id: Option<&str>,
    time: ClockTime,
) -> bool {
    same_slot(existing, resource_id, date, exclude_id)
        .filter_map(Reservation::range)
        .any(|range| range.blocks_start(time))
}

/// Whether a new booking may not end at `time`.
pub fn is_end_blocked(
    existing: &[Reservation],
    resource_id: &str,
    date: &str,
    exclude_id: Option<&str>,
    time: ClockTime,
) -> bool {
    same_slot(existing, resource_id, date, exclude_id)
        .filter_map(Reservation::range)
        .any(|range| range.blocks_end(time))
}

fn same_slot<'a, 'b>(
    existing: &'a [Reservation],
    resource_id: &'b str,
    date: &'b str,
    exclude_id: Option<&'b str>,
) -> impl Iterator<Item = &'a Reservation> + 'b
where
    'a: 'b,
{
    existing.iter().filter(move |r| {
        r.is_active()
            && r.bench_id == resource_id
            && r.date == date
            && exclude_id.map_or(true, |id| r.id != id)
    })
}
