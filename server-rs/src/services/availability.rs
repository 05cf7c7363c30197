use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::error::BookingError;
use crate::models::TimeRange;
use crate::services::admission::BookingEngine;

pub const CLOSED_NOTE: &str = "closed this day";

/// Fixed one-hour candidates from `next` while the slot still ends by `close`.
#[derive(Debug, Clone)]
pub struct HourlySlots {
    next: DateTime<Utc>,
    close: DateTime<Utc>,
}

impl HourlySlots {
    pub fn new(open: DateTime<Utc>, close: DateTime<Utc>) -> Self {
        Self { next: open, close }
    }

    fn empty() -> Self {
        let epoch = DateTime::<Utc>::UNIX_EPOCH;
        Self {
            next: epoch,
            close: epoch,
        }
    }
}

impl Iterator for HourlySlots {
    type Item = TimeRange;

    fn next(&mut self) -> Option<TimeRange> {
        // ends at the upper edge of the calendar instead of overflowing
        let end = self.next.checked_add_signed(Duration::hours(1))?;
        if end > self.close {
            return None;
        }
        let slot = TimeRange::new(self.next, end);
        self.next = end;
        Some(slot)
    }
}

/// Free hour slots for one court and day. Iterating does not consume it.
#[derive(Debug, Clone)]
pub struct AvailableSlots {
    candidates: HourlySlots,
    busy: Vec<TimeRange>,
}

impl AvailableSlots {
    pub fn new(candidates: HourlySlots, busy: Vec<TimeRange>) -> Self {
        Self { candidates, busy }
    }

    pub fn closed() -> Self {
        Self::new(HourlySlots::empty(), Vec::new())
    }

    pub fn iter(&self) -> impl Iterator<Item = TimeRange> + '_ {
        self.candidates
            .clone()
            .filter(move |slot| !self.busy.iter().any(|b| b.overlaps(slot)))
    }
}

#[derive(Debug, Clone)]
pub struct Availability {
    pub court_id: Uuid,
    pub date: NaiveDate,
    pub slots: AvailableSlots,
    pub note: Option<&'static str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityResponse {
    pub court_id: Uuid,
    pub date: NaiveDate,
    pub slots: Vec<TimeRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<&'static str>,
}

impl From<&Availability> for AvailabilityResponse {
    fn from(a: &Availability) -> Self {
        Self {
            court_id: a.court_id,
            date: a.date,
            slots: a.slots.iter().collect(),
            note: a.note,
        }
    }
}

/// Weekday index with Sunday = 0.
pub fn weekday_index(date: NaiveDate) -> i16 {
    date.weekday().num_days_from_sunday() as i16
}

impl BookingEngine {
    /// One-hour slots inside the court's opening window for `date` that touch
    /// no confirmed booking and no blocked slot. Times are read as UTC.
    pub async fn list_available_slots(
        &self,
        court_id: Uuid,
        date: NaiveDate,
    ) -> Result<Availability, BookingError> {
        let store = self.store();
        store
            .find_court(court_id)
            .await?
            .ok_or(BookingError::NotFound("Court"))?;

        let Some(hours) = store.get_operating_hours(court_id, weekday_index(date)).await? else {
            return Ok(Availability {
                court_id,
                date,
                slots: AvailableSlots::closed(),
                note: Some(CLOSED_NOTE),
            });
        };

        let window = TimeRange::new(
            date.and_time(hours.open_time).and_utc(),
            date.and_time(hours.close_time).and_utc(),
        );

        let mut busy: Vec<TimeRange> = store
            .find_overlapping_confirmed_bookings(court_id, &window)
            .await?
            .iter()
            .map(|b| b.range())
            .collect();
        busy.extend(
            store
                .find_overlapping_blocked_slots(court_id, &window)
                .await?
                .iter()
                .map(|b| b.range()),
        );

        Ok(Availability {
            court_id,
            date,
            slots: AvailableSlots::new(HourlySlots::new(window.start, window.end), busy),
            note: None,
        })
    }
}
