//! In-process `BookingStore` used by the engine tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{NaiveTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::{
    BlockedSlot, Booking, BookingStatus, CancellationMeta, Court, CourtLabels, NewBooking,
    OperatingHours, TimeRange, PAYMENT_PENDING,
};
use crate::services::booking_store::{BookingRecord, BookingStore};

#[derive(Default)]
struct Tables {
    courts: HashMap<Uuid, (Court, Uuid)>,
    hours: Vec<OperatingHours>,
    bookings: Vec<Booking>,
    blocks: Vec<BlockedSlot>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_writes: AtomicBool,
    stale_reads: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an active court owned by `owner_id` and returns its id.
    pub async fn add_court(&self, owner_id: Uuid, hourly_rate: Decimal) -> Uuid {
        let court = Court {
            id: Uuid::new_v4(),
            facility_id: Uuid::new_v4(),
            sport_id: Uuid::new_v4(),
            name: "Court 1".into(),
            hourly_rate,
            is_active: true,
            created_at: Utc::now(),
        };
        let id = court.id;
        self.tables.lock().await.courts.insert(id, (court, owner_id));
        id
    }

    /// Sets the same opening window for every weekday.
    pub async fn set_daily_hours(&self, court_id: Uuid, open: NaiveTime, close: NaiveTime) {
        let mut tables = self.tables.lock().await;
        tables.hours.retain(|h| h.court_id != court_id);
        for weekday in 0..7 {
            tables.hours.push(OperatingHours {
                court_id,
                weekday,
                open_time: open,
                close_time: close,
            });
        }
    }

    pub async fn set_hours(&self, hours: OperatingHours) {
        let mut tables = self.tables.lock().await;
        tables
            .hours
            .retain(|h| !(h.court_id == hours.court_id && h.weekday == hours.weekday));
        tables.hours.push(hours);
    }

    pub async fn add_block(&self, court_id: Uuid, range: TimeRange) -> Uuid {
        let block = BlockedSlot {
            id: Uuid::new_v4(),
            court_id,
            start: range.start,
            end: range.end,
            reason: Some("maintenance".into()),
            created_by: Uuid::new_v4(),
            created_at: Utc::now(),
        };
        let id = block.id;
        self.tables.lock().await.blocks.push(block);
        id
    }

    pub async fn booking_count(&self) -> usize {
        self.tables.lock().await.bookings.len()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Makes `find_booking` report every booking as confirmed, as a reader
    /// racing a concurrent cancellation would see it.
    pub fn stale_reads(&self, stale: bool) {
        self.stale_reads.store(stale, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<(), sqlx::Error> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(sqlx::Error::PoolTimedOut);
        }
        Ok(())
    }
}

#[async_trait]
impl BookingStore for MemoryStore {
    async fn find_court(&self, court_id: Uuid) -> Result<Option<Court>, sqlx::Error> {
        let tables = self.tables.lock().await;
        Ok(tables
            .courts
            .get(&court_id)
            .map(|(c, _)| c.clone())
            .filter(|c| c.is_active))
    }

    async fn find_overlapping_confirmed_bookings(
        &self,
        court_id: Uuid,
        range: &TimeRange,
    ) -> Result<Vec<Booking>, sqlx::Error> {
        let tables = self.tables.lock().await;
        Ok(tables
            .bookings
            .iter()
            .filter(|b| {
                b.court_id == court_id
                    && b.status == BookingStatus::Confirmed
                    && b.range().overlaps(range)
            })
            .cloned()
            .collect())
    }

    async fn find_overlapping_blocked_slots(
        &self,
        court_id: Uuid,
        range: &TimeRange,
    ) -> Result<Vec<BlockedSlot>, sqlx::Error> {
        let tables = self.tables.lock().await;
        Ok(tables
            .blocks
            .iter()
            .filter(|b| b.court_id == court_id && b.range().overlaps(range))
            .cloned()
            .collect())
    }

    async fn insert_booking(&self, new: NewBooking) -> Result<Booking, sqlx::Error> {
        self.check_writable()?;
        let now = Utc::now();
        let booking = Booking {
            id: Uuid::new_v4(),
            court_id: new.court_id,
            requester_id: new.requester_id,
            start: new.range.start,
            end: new.range.end,
            status: BookingStatus::Confirmed,
            total_price: new.total_price,
            payment_method: new.payment_method,
            payment_status: PAYMENT_PENDING.to_string(),
            payment_reference: new.payment_reference,
            cancellation_reason: None,
            cancelled_by: None,
            cancelled_at: None,
            created_at: now,
            updated_at: now,
        };
        self.tables.lock().await.bookings.push(booking.clone());
        Ok(booking)
    }

    async fn find_booking(&self, booking_id: Uuid) -> Result<Option<BookingRecord>, sqlx::Error> {
        let tables = self.tables.lock().await;
        let stale = self.stale_reads.load(Ordering::SeqCst);
        Ok(tables
            .bookings
            .iter()
            .find(|b| b.id == booking_id)
            .map(|b| BookingRecord {
                booking: if stale {
                    Booking {
                        status: BookingStatus::Confirmed,
                        ..b.clone()
                    }
                } else {
                    b.clone()
                },
                facility_owner_id: tables
                    .courts
                    .get(&b.court_id)
                    .map(|(_, owner)| *owner)
                    .unwrap_or_default(),
            }))
    }

    async fn update_booking_status(
        &self,
        booking_id: Uuid,
        status: BookingStatus,
        meta: CancellationMeta,
    ) -> Result<Option<Booking>, sqlx::Error> {
        self.check_writable()?;
        let mut tables = self.tables.lock().await;
        let Some(booking) = tables
            .bookings
            .iter_mut()
            .find(|b| b.id == booking_id && b.status == BookingStatus::Confirmed)
        else {
            return Ok(None);
        };
        booking.status = status;
        booking.cancellation_reason = meta.reason;
        booking.cancelled_by = Some(meta.cancelled_by);
        booking.cancelled_at = Some(meta.cancelled_at);
        booking.updated_at = Utc::now();
        Ok(Some(booking.clone()))
    }

    async fn get_operating_hours(
        &self,
        court_id: Uuid,
        weekday: i16,
    ) -> Result<Option<OperatingHours>, sqlx::Error> {
        let tables = self.tables.lock().await;
        Ok(tables
            .hours
            .iter()
            .find(|h| h.court_id == court_id && h.weekday == weekday)
            .cloned())
    }

    async fn court_labels(&self, court_id: Uuid) -> Result<Option<CourtLabels>, sqlx::Error> {
        let tables = self.tables.lock().await;
        Ok(tables.courts.get(&court_id).map(|(c, _)| CourtLabels {
            court_name: c.name.clone(),
            facility_name: "Riverside Sports Hub".into(),
            sport_name: "Badminton".into(),
        }))
    }
}
