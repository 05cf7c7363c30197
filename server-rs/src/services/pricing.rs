use rust_decimal::prelude::*;

use crate::models::TimeRange;

/// Currency minor unit: two decimal places.
const DECIMAL_PLACES: u32 = 2;

const MILLIS_PER_HOUR: i64 = 3_600_000;

/// Charge for `range` at `hourly_rate`, prorated to the millisecond. The only
/// rounding happens on the final value, half-up to the minor unit.
pub fn booking_total(hourly_rate: Decimal, range: &TimeRange) -> Decimal {
    let millis = Decimal::from(range.duration().num_milliseconds());
    let mut total = (hourly_rate * millis / Decimal::from(MILLIS_PER_HOUR))
        .round_dp_with_strategy(DECIMAL_PLACES, RoundingStrategy::MidpointAwayFromZero);
    total.rescale(DECIMAL_PLACES);
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 18, 0, 0).unwrap()
    }

    fn range_of(d: Duration) -> TimeRange {
        TimeRange::new(start(), start() + d)
    }

    #[test]
    fn two_hours_cost_twice_one_hour() {
        let rate = Decimal::new(2500, 2);
        let one = booking_total(rate, &range_of(Duration::hours(1)));
        let two = booking_total(rate, &range_of(Duration::hours(2)));
        assert_eq!(one, Decimal::new(2500, 2));
        assert_eq!(two, one * Decimal::TWO);
        assert_eq!(one.to_string(), "25.00");
    }

    #[test]
    fn sub_hour_intervals_are_prorated() {
        let rate = Decimal::new(2500, 2);
        assert_eq!(
            booking_total(rate, &range_of(Duration::minutes(90))),
            Decimal::new(3750, 2)
        );
        assert_eq!(
            booking_total(rate, &range_of(Duration::minutes(20))),
            Decimal::new(833, 2)
        );
    }

    #[test]
    fn midpoint_rounds_up() {
        // 0.30/h for 5 minutes is exactly 0.025
        let rate = Decimal::new(30, 2);
        assert_eq!(
            booking_total(rate, &range_of(Duration::minutes(5))),
            Decimal::new(3, 2)
        );
    }

    #[test]
    fn no_intermediate_rounding() {
        // 10.00/h is 0.1666.. per minute
        let rate = Decimal::new(1000, 2);
        assert_eq!(
            booking_total(rate, &range_of(Duration::minutes(1))),
            Decimal::new(17, 2)
        );
        assert_eq!(
            booking_total(rate, &range_of(Duration::minutes(3))),
            Decimal::new(50, 2)
        );
    }
}
