use rust_decimal::Decimal;

use crate::model::{Ms, RateMode, Span, Vehicle};

use super::BookingError;

pub const MS_PER_HOUR: Ms = 3_600_000;
pub const MS_PER_DAY: Ms = 24 * MS_PER_HOUR;

/// Started 24-hour periods in the window, never less than one.
pub fn billable_days(span: &Span) -> i64 {
    let d = span.duration_ms();
    ((d + MS_PER_DAY - 1) / MS_PER_DAY).max(1)
}

/// Total charge for `span` at the vehicle's current rates.
///
/// Daily windows bill whole days (ceiling). Hourly windows bill the exact
/// fractional hour count with no rounding or minimum. Callers validate the
/// window first. A total outside the `Decimal` range fails `LimitExceeded`.
pub fn compute_price(
    vehicle: &Vehicle,
    mode: RateMode,
    span: &Span,
) -> Result<Decimal, BookingError> {
    debug_assert!(span.start < span.end, "pricing an empty or inverted window");
    let total = match mode {
        RateMode::Daily => vehicle
            .daily_rate
            .checked_mul(Decimal::from(billable_days(span))),
        // Multiply before dividing so thirds of an hour stay exact.
        RateMode::Hourly => vehicle
            .hourly_rate
            .checked_mul(Decimal::from(span.duration_ms()))
            .and_then(|n| n.checked_div(Decimal::from(MS_PER_HOUR)))
            .map(|p| p.normalize()),
    };
    total.ok_or(BookingError::LimitExceeded("price overflow"))
}
