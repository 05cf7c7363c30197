use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::court::{BlockedSlot, CourtLabels};

/// Half-open interval `[start, end)`. Intervals that merely touch
/// (`a.end == b.start`) do not overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn overlaps(&self, other: &TimeRange) -> bool {
        other.start < self.end && other.end > self.start
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confirmed" => Ok(BookingStatus::Confirmed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            other => Err(format!("unknown booking status: {other}")),
        }
    }
}

pub const PAYMENT_PENDING: &str = "pending";
pub const DEFAULT_PAYMENT_METHOD: &str = "pay_at_venue";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Uuid,
    pub court_id: Uuid,
    pub requester_id: Uuid,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub status: BookingStatus,
    pub total_price: Decimal,
    pub payment_method: String,
    pub payment_status: String,
    pub payment_reference: String,
    pub cancellation_reason: Option<String>,
    pub cancelled_by: Option<Uuid>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn range(&self) -> TimeRange {
        TimeRange::new(self.start, self.end)
    }
}

/// Raw `bookings` row; status is stored as text.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BookingRow {
    pub id: Uuid,
    pub court_id: Uuid,
    pub requester_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: String,
    pub total_price: Decimal,
    pub payment_method: String,
    pub payment_status: String,
    pub payment_reference: String,
    pub cancellation_reason: Option<String>,
    pub cancelled_by: Option<Uuid>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = sqlx::Error;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse()
            .map_err(|e: String| sqlx::Error::Decode(e.into()))?;
        Ok(Booking {
            id: row.id,
            court_id: row.court_id,
            requester_id: row.requester_id,
            start: row.start_time,
            end: row.end_time,
            status,
            total_price: row.total_price,
            payment_method: row.payment_method,
            payment_status: row.payment_status,
            payment_reference: row.payment_reference,
            cancellation_reason: row.cancellation_reason,
            cancelled_by: row.cancelled_by,
            cancelled_at: row.cancelled_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// A booking that passed admission and is ready to be written.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub court_id: Uuid,
    pub requester_id: Uuid,
    pub range: TimeRange,
    pub total_price: Decimal,
    pub payment_method: String,
    pub payment_reference: String,
}

#[derive(Debug, Clone)]
pub struct CancellationMeta {
    pub reason: Option<String>,
    pub cancelled_by: Uuid,
    pub cancelled_at: DateTime<Utc>,
}

/// Creation response: the stored booking plus joined display names.
#[derive(Debug, Clone, Serialize)]
pub struct BookingView {
    #[serde(flatten)]
    pub booking: Booking,
    #[serde(flatten)]
    pub labels: Option<CourtLabels>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BookingListItem {
    pub id: Uuid,
    pub court_id: Uuid,
    pub requester_id: Uuid,
    #[sqlx(rename = "start_time")]
    pub start: DateTime<Utc>,
    #[sqlx(rename = "end_time")]
    pub end: DateTime<Utc>,
    pub status: String,
    pub total_price: Decimal,
    pub payment_method: String,
    pub payment_status: String,
    pub payment_reference: String,
    pub court_name: String,
    pub facility_name: String,
    pub sport_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    pub court_id: Uuid,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub payment_method: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelBookingRequest {
    pub reason: Option<String>,
}

impl BlockedSlot {
    pub fn range(&self) -> TimeRange {
        TimeRange::new(self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, h, m, 0).unwrap()
    }

    #[test]
    fn touching_ranges_do_not_overlap() {
        let a = TimeRange::new(at(10, 0), at(12, 0));
        let b = TimeRange::new(at(12, 0), at(13, 0));
        assert!(!a.overlaps(&b));
        assert!(!b.overlaps(&a));
    }

    #[test]
    fn overlap_is_symmetric_for_partial_and_nested_ranges() {
        let outer = TimeRange::new(at(9, 0), at(17, 0));
        let inner = TimeRange::new(at(11, 30), at(12, 15));
        let straddle = TimeRange::new(at(16, 59), at(18, 0));
        for other in [inner, straddle] {
            assert!(outer.overlaps(&other));
            assert!(other.overlaps(&outer));
        }
    }

    #[test]
    fn empty_when_start_not_before_end() {
        assert!(TimeRange::new(at(10, 0), at(10, 0)).is_empty());
        assert!(TimeRange::new(at(11, 0), at(10, 0)).is_empty());
        assert!(!TimeRange::new(at(10, 0), at(10, 1)).is_empty());
    }

    #[test]
    fn unknown_status_fails_decoding() {
        let row = BookingRow {
            id: Uuid::new_v4(),
            court_id: Uuid::new_v4(),
            requester_id: Uuid::new_v4(),
            start_time: at(8, 0),
            end_time: at(9, 0),
            status: "held".into(),
            total_price: Decimal::new(2500, 2),
            payment_method: DEFAULT_PAYMENT_METHOD.into(),
            payment_status: PAYMENT_PENDING.into(),
            payment_reference: "PAY-1".into(),
            cancellation_reason: None,
            cancelled_by: None,
            cancelled_at: None,
            created_at: at(7, 0),
            updated_at: at(7, 0),
        };
        assert!(Booking::try_from(row).is_err());
    }
}
