use thiserror::Error;
use ulid::Ulid;

use crate::model::{Ms, ReservationState};
use crate::store::StoreError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BookingError {
    #[error("invalid window: start {start} must be before end {end}")]
    InvalidWindow { start: Ms, end: Ms },

    #[error("member not found: {0}")]
    MemberNotFound(Ulid),

    #[error("member is inactive: {0}")]
    MemberInactive(Ulid),

    #[error("vehicle not found: {0}")]
    VehicleNotFound(Ulid),

    #[error("vehicle is not available for booking: {0}")]
    VehicleUnavailable(Ulid),

    #[error("vehicle {vehicle_id} already booked over this window by reservation {conflicting}")]
    WindowConflict { vehicle_id: Ulid, conflicting: Ulid },

    #[error("invalid rate mode: {0:?} (expected \"hourly\" or \"daily\")")]
    InvalidRateMode(String),

    #[error("invalid transition: {from} -> {to}")]
    InvalidTransition {
        from: ReservationState,
        to: ReservationState,
    },

    #[error("reservation not found: {0}")]
    ReservationNotFound(Ulid),

    #[error("concurrent modification of {0}, retry the request")]
    ConcurrentModification(Ulid),

    #[error("no unused reservation identifier after {attempts} attempts")]
    IdentifierExhausted { attempts: usize },

    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),

    #[error(transparent)]
    Storage(#[from] StoreError),
}

impl BookingError {
    /// Stable code for transports to map onto their own status vocabulary.
    pub fn kind(&self) -> &'static str {
        match self {
            BookingError::InvalidWindow { .. } => "invalid_window",
            BookingError::MemberNotFound(_) => "member_not_found",
            BookingError::MemberInactive(_) => "member_inactive",
            BookingError::VehicleNotFound(_) => "vehicle_not_found",
            BookingError::VehicleUnavailable(_) => "vehicle_unavailable",
            BookingError::WindowConflict { .. } => "window_conflict",
            BookingError::InvalidRateMode(_) => "invalid_rate_mode",
            BookingError::InvalidTransition { .. } => "invalid_transition",
            BookingError::ReservationNotFound(_) => "reservation_not_found",
            BookingError::ConcurrentModification(_) => "concurrent_modification",
            BookingError::IdentifierExhausted { .. } => "identifier_exhausted",
            BookingError::LimitExceeded(_) => "limit_exceeded",
            BookingError::Storage(_) => "storage",
        }
    }

    /// Only a lost optimistic-concurrency race is safe to retry unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BookingError::ConcurrentModification(_))
    }
}

impl From<crate::model::UnknownRateMode> for BookingError {
    fn from(e: crate::model::UnknownRateMode) -> Self {
        BookingError::InvalidRateMode(e.0)
    }
}
