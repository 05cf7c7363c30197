use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{
    BlockedSlot, Booking, BookingRow, BookingStatus, CancellationMeta, Court, CourtLabels,
    NewBooking, OperatingHours, TimeRange, PAYMENT_PENDING,
};

/// A booking together with the owner of the facility it was made at, which
/// is what cancellation needs to authorise the actor.
#[derive(Debug, Clone)]
pub struct BookingRecord {
    pub booking: Booking,
    pub facility_owner_id: Uuid,
}

/// Persistence seen by the admission engine. Overlap queries use the
/// half-open rule `existing.start < wanted.end AND existing.end > wanted.start`.
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Bookable court: active, on an approved facility.
    async fn find_court(&self, court_id: Uuid) -> Result<Option<Court>, sqlx::Error>;

    async fn find_overlapping_confirmed_bookings(
        &self,
        court_id: Uuid,
        range: &TimeRange,
    ) -> Result<Vec<Booking>, sqlx::Error>;

    async fn find_overlapping_blocked_slots(
        &self,
        court_id: Uuid,
        range: &TimeRange,
    ) -> Result<Vec<BlockedSlot>, sqlx::Error>;

    async fn insert_booking(&self, booking: NewBooking) -> Result<Booking, sqlx::Error>;

    async fn find_booking(&self, booking_id: Uuid) -> Result<Option<BookingRecord>, sqlx::Error>;

    /// Moves a still-confirmed booking to `status`. `None` when the booking
    /// is no longer confirmed, so a lost race never rewrites the metadata.
    async fn update_booking_status(
        &self,
        booking_id: Uuid,
        status: BookingStatus,
        meta: CancellationMeta,
    ) -> Result<Option<Booking>, sqlx::Error>;

    async fn get_operating_hours(
        &self,
        court_id: Uuid,
        weekday: i16,
    ) -> Result<Option<OperatingHours>, sqlx::Error>;

    async fn court_labels(&self, court_id: Uuid) -> Result<Option<CourtLabels>, sqlx::Error>;
}

#[derive(Clone)]
pub struct PgBookingStore {
    db: PgPool,
}

impl PgBookingStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn find_court(&self, court_id: Uuid) -> Result<Option<Court>, sqlx::Error> {
        sqlx::query_as(
            r#"SELECT c.id, c.facility_id, c.sport_id, c.name, c.hourly_rate, c.is_active, c.created_at
            FROM courts c JOIN facilities f ON f.id = c.facility_id
            WHERE c.id = $1 AND c.is_active = true AND f.status = 'approved'"#,
        )
        .bind(court_id)
        .fetch_optional(&self.db)
        .await
    }

    async fn find_overlapping_confirmed_bookings(
        &self,
        court_id: Uuid,
        range: &TimeRange,
    ) -> Result<Vec<Booking>, sqlx::Error> {
        let rows: Vec<BookingRow> = sqlx::query_as(
            r#"SELECT * FROM bookings
            WHERE court_id = $1 AND status = 'confirmed'
              AND start_time < $3 AND end_time > $2
            ORDER BY start_time"#,
        )
        .bind(court_id)
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(Booking::try_from).collect()
    }

    async fn find_overlapping_blocked_slots(
        &self,
        court_id: Uuid,
        range: &TimeRange,
    ) -> Result<Vec<BlockedSlot>, sqlx::Error> {
        sqlx::query_as(
            r#"SELECT * FROM blocked_slots
            WHERE court_id = $1 AND start_time < $3 AND end_time > $2
            ORDER BY start_time"#,
        )
        .bind(court_id)
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&self.db)
        .await
    }

    async fn insert_booking(&self, booking: NewBooking) -> Result<Booking, sqlx::Error> {
        let row: BookingRow = sqlx::query_as(
            r#"INSERT INTO bookings (id, court_id, requester_id, start_time, end_time, status,
                total_price, payment_method, payment_status, payment_reference, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, 'confirmed', $6, $7, $8, $9, NOW(), NOW())
            RETURNING *"#,
        )
        .bind(Uuid::new_v4())
        .bind(booking.court_id)
        .bind(booking.requester_id)
        .bind(booking.range.start)
        .bind(booking.range.end)
        .bind(booking.total_price)
        .bind(&booking.payment_method)
        .bind(PAYMENT_PENDING)
        .bind(&booking.payment_reference)
        .fetch_one(&self.db)
        .await?;

        Booking::try_from(row)
    }

    async fn find_booking(&self, booking_id: Uuid) -> Result<Option<BookingRecord>, sqlx::Error> {
        let row: Option<BookingRow> = sqlx::query_as("SELECT * FROM bookings WHERE id = $1")
            .bind(booking_id)
            .fetch_optional(&self.db)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let facility_owner_id: Uuid = sqlx::query_scalar(
            r#"SELECT f.owner_id FROM courts c JOIN facilities f ON f.id = c.facility_id
            WHERE c.id = $1"#,
        )
        .bind(row.court_id)
        .fetch_one(&self.db)
        .await?;

        Ok(Some(BookingRecord {
            booking: Booking::try_from(row)?,
            facility_owner_id,
        }))
    }

    async fn update_booking_status(
        &self,
        booking_id: Uuid,
        status: BookingStatus,
        meta: CancellationMeta,
    ) -> Result<Option<Booking>, sqlx::Error> {
        let row: Option<BookingRow> = sqlx::query_as(
            r#"UPDATE bookings SET status = $2, cancellation_reason = $3, cancelled_by = $4,
                cancelled_at = $5, updated_at = NOW()
            WHERE id = $1 AND status = 'confirmed'
            RETURNING *"#,
        )
        .bind(booking_id)
        .bind(status.as_str())
        .bind(&meta.reason)
        .bind(meta.cancelled_by)
        .bind(meta.cancelled_at)
        .fetch_optional(&self.db)
        .await?;

        row.map(Booking::try_from).transpose()
    }

    async fn get_operating_hours(
        &self,
        court_id: Uuid,
        weekday: i16,
    ) -> Result<Option<OperatingHours>, sqlx::Error> {
        sqlx::query_as(
            "SELECT court_id, weekday, open_time, close_time FROM operating_hours WHERE court_id = $1 AND weekday = $2",
        )
        .bind(court_id)
        .bind(weekday)
        .fetch_optional(&self.db)
        .await
    }

    async fn court_labels(&self, court_id: Uuid) -> Result<Option<CourtLabels>, sqlx::Error> {
        sqlx::query_as(
            r#"SELECT c.name AS court_name, f.name AS facility_name, s.name AS sport_name
            FROM courts c
            JOIN facilities f ON f.id = c.facility_id
            JOIN sports s ON s.id = c.sport_id
            WHERE c.id = $1"#,
        )
        .bind(court_id)
        .fetch_optional(&self.db)
        .await
    }
}
