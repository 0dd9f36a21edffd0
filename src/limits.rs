use crate::model::Ms;

pub const MIN_VALID_TIMESTAMP_MS: Ms = 0;
/// 9999-12-31T23:59:59.999Z
pub const MAX_VALID_TIMESTAMP_MS: Ms = 253_402_300_799_999;
pub const MAX_SPAN_DURATION_MS: Ms = 366 * 24 * 3_600_000;

pub const MAX_NOTES_LEN: usize = 2000;
pub const MAX_NAME_LEN: usize = 256;
pub const MAX_RESERVATIONS_PER_VEHICLE: usize = 100_000;
/// Upper bound on an hourly or daily rate accepted from the catalog. Keeps the
/// widest window's total well inside the `Decimal` range.
pub const MAX_RATE: i64 = 1_000_000_000;

/// Fresh identifiers tried before giving up on a create.
pub const MAX_ID_ATTEMPTS: usize = 3;
/// Reload-and-revalidate rounds after losing a booking-generation race.
pub const MAX_GENERATION_RETRIES: usize = 5;
