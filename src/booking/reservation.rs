//! Reservation and bench documents as stored by the gateway.

use super::time::{ClockTime, TimeRange};
use crate::error::{RelayError, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Collection reservations live in.
pub const RESERVATIONS: &str = "reservations";

/// Collection benches live in.
pub const BENCHES: &str = "benches";

/// Reservation lifecycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    #[default]
    Active,
    Cancelled,
    Completed,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Active => "active",
            ReservationStatus::Cancelled => "cancelled",
            ReservationStatus::Completed => "completed",
        }
    }
}

/// A booked time range on one bench and day.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reservation {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub bench_id: String,
    /// Calendar day, `YYYY-MM-DD`.
    pub date: String,
    pub start_time: ClockTime,
    pub end_time: ClockTime,
    #[serde(default)]
    pub status: ReservationStatus,
}

impl Reservation {
    pub fn is_active(&self) -> bool {
        self.status == ReservationStatus::Active
    }

    /// The booked interval. `None` if the stored times are inverted.
    pub fn range(&self) -> Option<TimeRange> {
        TimeRange::new(self.start_time, self.end_time).ok()
    }
}

/// A bench as far as the booking layer cares.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Bench {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub location: Option<String>,
}

/// Who is booking.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    User,
    /// Admins may book over existing reservations.
    Admin,
}

/// Validate and normalize a `YYYY-MM-DD` calendar day.
pub fn parse_date(date: &str) -> Result<String> {
    let date = date.trim();
    NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .map(|d| d.format("%Y-%m-%d").to_string())
        .map_err(|_| RelayError::Validation(format!("Invalid date \"{}\", expected YYYY-MM-DD", date)))
}
