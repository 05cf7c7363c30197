use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::Rng;
use uuid::Uuid;

use crate::error::BookingError;
use crate::models::{
    Booking, BookingStatus, BookingView, CancellationMeta, NewBooking, Role, TimeRange,
    DEFAULT_PAYMENT_METHOD,
};
use crate::services::booking_store::BookingStore;
use crate::services::pricing;

/// Who is acting on a booking.
#[derive(Debug, Clone, Copy)]
pub struct Actor {
    pub user_id: Uuid,
    pub role: Role,
}

#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub court_id: Uuid,
    pub range: TimeRange,
    pub requester_id: Uuid,
    pub payment_method: Option<String>,
}

/// Slot admission, pricing and cancellation over a `BookingStore`.
///
/// The overlap checks and the insert are separate store calls. Two concurrent
/// requests for overlapping ranges on one court can both pass the checks;
/// nothing here serialises them.
#[derive(Clone)]
pub struct BookingEngine {
    store: Arc<dyn BookingStore>,
}

impl BookingEngine {
    pub fn new(store: Arc<dyn BookingStore>) -> Self {
        Self { store }
    }

    pub(crate) fn store(&self) -> &dyn BookingStore {
        self.store.as_ref()
    }

    pub async fn try_book(&self, req: BookingRequest) -> Result<BookingView, BookingError> {
        let court = self
            .store
            .find_court(req.court_id)
            .await?
            .ok_or(BookingError::NotFound("Court"))?;

        if req.range.is_empty() {
            return Err(BookingError::InvalidInterval(
                "start must be before end".into(),
            ));
        }

        let clashes = self
            .store
            .find_overlapping_confirmed_bookings(court.id, &req.range)
            .await?;
        if !clashes.is_empty() {
            tracing::info!(
                court_id = %court.id,
                start = %req.range.start,
                end = %req.range.end,
                clashes = clashes.len(),
                "booking rejected: slot conflict"
            );
            return Err(BookingError::SlotConflict);
        }

        let blocks = self
            .store
            .find_overlapping_blocked_slots(court.id, &req.range)
            .await?;
        if !blocks.is_empty() {
            tracing::info!(
                court_id = %court.id,
                start = %req.range.start,
                end = %req.range.end,
                "booking rejected: slot blocked"
            );
            return Err(BookingError::SlotBlocked);
        }

        let total_price = pricing::booking_total(court.hourly_rate, &req.range);
        let payment_method = req
            .payment_method
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_PAYMENT_METHOD.to_string());

        let booking = self
            .store
            .insert_booking(NewBooking {
                court_id: court.id,
                requester_id: req.requester_id,
                range: req.range,
                total_price,
                payment_method,
                payment_reference: payment_reference(Utc::now()),
            })
            .await?;

        tracing::info!(
            booking_id = %booking.id,
            court_id = %booking.court_id,
            total_price = %booking.total_price,
            "booking confirmed"
        );

        let labels = self.store.court_labels(booking.court_id).await?;
        Ok(BookingView { booking, labels })
    }

    pub async fn cancel(
        &self,
        booking_id: Uuid,
        actor: Actor,
        reason: Option<String>,
    ) -> Result<Booking, BookingError> {
        self.cancel_at(booking_id, actor, reason, Utc::now()).await
    }

    /// Cancels as of `now`. A booking that has started is never cancellable,
    /// whoever asks.
    pub async fn cancel_at(
        &self,
        booking_id: Uuid,
        actor: Actor,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Booking, BookingError> {
        let record = self
            .store
            .find_booking(booking_id)
            .await?
            .ok_or(BookingError::NotFound("Booking"))?;

        if record.booking.start <= now {
            return Err(BookingError::AlreadyPast);
        }

        let allowed = actor.user_id == record.booking.requester_id
            || actor.user_id == record.facility_owner_id
            || actor.role == Role::Admin;
        if !allowed {
            return Err(BookingError::Forbidden);
        }

        if record.booking.status == BookingStatus::Cancelled {
            return Err(BookingError::AlreadyCancelled);
        }

        let booking = self
            .store
            .update_booking_status(
                booking_id,
                BookingStatus::Cancelled,
                CancellationMeta {
                    reason,
                    cancelled_by: actor.user_id,
                    cancelled_at: now,
                },
            )
            .await?
            .ok_or(BookingError::AlreadyCancelled)?;

        tracing::info!(
            booking_id = %booking.id,
            cancelled_by = %actor.user_id,
            reason = booking.cancellation_reason.as_deref().unwrap_or(""),
            "booking cancelled"
        );
        Ok(booking)
    }
}

fn payment_reference(now: DateTime<Utc>) -> String {
    let suffix: u16 = rand::thread_rng().gen_range(0..10_000);
    format!("PAY-{}-{:04}", now.timestamp_millis(), suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::memory_store::MemoryStore;
    use chrono::{Duration, NaiveTime, TimeZone};
    use rust_decimal::Decimal;

    struct Fixture {
        store: Arc<MemoryStore>,
        engine: BookingEngine,
        court_id: Uuid,
        owner: Actor,
        player: Actor,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let owner = Actor {
            user_id: Uuid::new_v4(),
            role: Role::FacilityOwner,
        };
        let player = Actor {
            user_id: Uuid::new_v4(),
            role: Role::User,
        };
        let court_id = store.add_court(owner.user_id, Decimal::new(2500, 2)).await;
        store
            .set_daily_hours(
                court_id,
                NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
                NaiveTime::from_hms_opt(23, 0, 0).unwrap(),
            )
            .await;
        let engine = BookingEngine::new(store.clone());
        Fixture {
            store,
            engine,
            court_id,
            owner,
            player,
        }
    }

    fn day() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2031, 5, 17, 0, 0, 0).unwrap()
    }

    fn hours(from: u32, to: u32) -> TimeRange {
        TimeRange::new(
            day() + Duration::hours(from as i64),
            day() + Duration::hours(to as i64),
        )
    }

    fn request(f: &Fixture, range: TimeRange) -> BookingRequest {
        BookingRequest {
            court_id: f.court_id,
            range,
            requester_id: f.player.user_id,
            payment_method: None,
        }
    }

    #[tokio::test]
    async fn evening_booking_scenario() {
        let f = fixture().await;

        let first = f.engine.try_book(request(&f, hours(18, 20))).await.unwrap();
        assert_eq!(first.booking.total_price, Decimal::new(5000, 2));
        assert_eq!(first.booking.status, BookingStatus::Confirmed);
        assert_eq!(first.booking.payment_status, "pending");
        assert!(first.booking.payment_reference.starts_with("PAY-"));

        let clash = f.engine.try_book(request(&f, hours(19, 21))).await;
        assert!(matches!(clash, Err(BookingError::SlotConflict)));

        let later = f.engine.try_book(request(&f, hours(21, 22))).await.unwrap();
        assert_eq!(later.booking.total_price, Decimal::new(2500, 2));
        assert_eq!(f.store.booking_count().await, 2);
    }

    #[tokio::test]
    async fn maintenance_block_scenario() {
        let f = fixture().await;
        f.store.add_block(f.court_id, hours(10, 12)).await;

        let blocked = f.engine.try_book(request(&f, hours(11, 13))).await;
        assert!(matches!(blocked, Err(BookingError::SlotBlocked)));

        let after = f.engine.try_book(request(&f, hours(12, 13))).await;
        assert!(after.is_ok());
    }

    #[tokio::test]
    async fn conflict_is_reported_before_block() {
        let f = fixture().await;
        f.engine.try_book(request(&f, hours(8, 9))).await.unwrap();
        f.store.add_block(f.court_id, hours(8, 10)).await;

        let res = f.engine.try_book(request(&f, hours(8, 10))).await;
        assert!(matches!(res, Err(BookingError::SlotConflict)));
    }

    #[tokio::test]
    async fn any_overlapping_pair_conflicts() {
        let f = fixture().await;
        let base = TimeRange::new(
            day() + Duration::hours(14),
            day() + Duration::hours(15) + Duration::minutes(30),
        );
        f.engine.try_book(request(&f, base)).await.unwrap();

        let overlapping = [
            TimeRange::new(base.start - Duration::minutes(15), base.start + Duration::minutes(1)),
            TimeRange::new(base.start + Duration::minutes(10), base.end - Duration::minutes(10)),
            TimeRange::new(base.end - Duration::minutes(1), base.end + Duration::hours(1)),
            TimeRange::new(base.start - Duration::hours(1), base.end + Duration::hours(1)),
            base,
        ];
        for range in overlapping {
            let res = f.engine.try_book(request(&f, range)).await;
            assert!(matches!(res, Err(BookingError::SlotConflict)), "{range:?}");
        }
    }

    #[tokio::test]
    async fn adjacent_bookings_are_admitted() {
        let f = fixture().await;
        for h in 6..12 {
            f.engine.try_book(request(&f, hours(h, h + 1))).await.unwrap();
        }
        assert_eq!(f.store.booking_count().await, 6);
    }

    #[tokio::test]
    async fn empty_or_inverted_interval_is_invalid() {
        let f = fixture().await;
        let at = day() + Duration::hours(9);

        let empty = f.engine.try_book(request(&f, TimeRange::new(at, at))).await;
        assert!(matches!(empty, Err(BookingError::InvalidInterval(_))));

        let inverted = f
            .engine
            .try_book(request(&f, TimeRange::new(at, at - Duration::minutes(30))))
            .await;
        assert!(matches!(inverted, Err(BookingError::InvalidInterval(_))));
    }

    #[tokio::test]
    async fn unknown_court_is_not_found() {
        let f = fixture().await;
        let mut req = request(&f, hours(9, 10));
        req.court_id = Uuid::new_v4();
        let res = f.engine.try_book(req).await;
        assert!(matches!(res, Err(BookingError::NotFound("Court"))));
    }

    #[tokio::test]
    async fn created_booking_carries_display_names() {
        let f = fixture().await;
        let view = f.engine.try_book(request(&f, hours(9, 10))).await.unwrap();

        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["courtName"], "Court 1");
        assert_eq!(json["sportName"], "Badminton");
        assert_eq!(json["totalPrice"], "25.00");
        assert_eq!(json["paymentMethod"], DEFAULT_PAYMENT_METHOD);
        assert_eq!(json["status"], "confirmed");
    }

    #[tokio::test]
    async fn failed_insert_leaves_nothing_behind() {
        let f = fixture().await;
        f.store.fail_writes(true);
        let res = f.engine.try_book(request(&f, hours(9, 10))).await;
        assert!(matches!(res, Err(BookingError::Storage(_))));
        assert_eq!(f.store.booking_count().await, 0);

        f.store.fail_writes(false);
        assert!(f.engine.try_book(request(&f, hours(9, 10))).await.is_ok());
    }

    #[tokio::test]
    async fn cancellation_frees_the_slot() {
        let f = fixture().await;
        let view = f.engine.try_book(request(&f, hours(18, 19))).await.unwrap();
        let now = day() - Duration::days(1);

        let cancelled = f
            .engine
            .cancel_at(view.booking.id, f.player, Some("rain".into()), now)
            .await
            .unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert_eq!(cancelled.cancelled_by, Some(f.player.user_id));
        assert_eq!(cancelled.cancellation_reason.as_deref(), Some("rain"));
        assert_eq!(cancelled.cancelled_at, Some(now));

        assert!(f.engine.try_book(request(&f, hours(18, 19))).await.is_ok());
    }

    #[tokio::test]
    async fn owner_and_admin_may_cancel_but_strangers_may_not() {
        let f = fixture().await;
        let now = day() - Duration::days(1);
        let stranger = Actor {
            user_id: Uuid::new_v4(),
            role: Role::FacilityOwner,
        };
        let admin = Actor {
            user_id: Uuid::new_v4(),
            role: Role::Admin,
        };

        let a = f.engine.try_book(request(&f, hours(7, 8))).await.unwrap();
        let res = f.engine.cancel_at(a.booking.id, stranger, None, now).await;
        assert!(matches!(res, Err(BookingError::Forbidden)));
        assert!(f.engine.cancel_at(a.booking.id, f.owner, None, now).await.is_ok());

        let b = f.engine.try_book(request(&f, hours(8, 9))).await.unwrap();
        assert!(f.engine.cancel_at(b.booking.id, admin, None, now).await.is_ok());
    }

    #[tokio::test]
    async fn second_cancel_reports_already_cancelled() {
        let f = fixture().await;
        let now = day() - Duration::days(1);
        let view = f.engine.try_book(request(&f, hours(7, 8))).await.unwrap();
        f.engine.cancel_at(view.booking.id, f.player, None, now).await.unwrap();

        let again = f.engine.cancel_at(view.booking.id, f.player, None, now).await;
        assert!(matches!(again, Err(BookingError::AlreadyCancelled)));
    }

    #[tokio::test]
    async fn losing_a_cancel_race_keeps_the_first_cancellation() {
        let f = fixture().await;
        let now = day() - Duration::days(1);
        let view = f.engine.try_book(request(&f, hours(7, 8))).await.unwrap();
        f.engine
            .cancel_at(view.booking.id, f.player, Some("rain".into()), now)
            .await
            .unwrap();

        // the second caller read the booking before the first update landed
        f.store.stale_reads(true);
        let late = f
            .engine
            .cancel_at(view.booking.id, f.owner, Some("court repair".into()), now)
            .await;
        assert!(matches!(late, Err(BookingError::AlreadyCancelled)));

        f.store.stale_reads(false);
        let record = f.store.find_booking(view.booking.id).await.unwrap().unwrap();
        assert_eq!(record.booking.cancelled_by, Some(f.player.user_id));
        assert_eq!(record.booking.cancellation_reason.as_deref(), Some("rain"));
    }

    #[tokio::test]
    async fn started_booking_is_already_past_for_every_actor() {
        let f = fixture().await;
        let view = f.engine.try_book(request(&f, hours(7, 8))).await.unwrap();
        let admin = Actor {
            user_id: Uuid::new_v4(),
            role: Role::Admin,
        };
        let stranger = Actor {
            user_id: Uuid::new_v4(),
            role: Role::User,
        };

        for now in [view.booking.start, view.booking.start + Duration::minutes(5)] {
            for actor in [f.player, f.owner, admin, stranger] {
                let res = f.engine.cancel_at(view.booking.id, actor, None, now).await;
                assert!(matches!(res, Err(BookingError::AlreadyPast)));
            }
        }
    }

    #[tokio::test]
    async fn cancel_unknown_booking_is_not_found() {
        let f = fixture().await;
        let res = f.engine.cancel(Uuid::new_v4(), f.player, None).await;
        assert!(matches!(res, Err(BookingError::NotFound("Booking"))));
    }
}
