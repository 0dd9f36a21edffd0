use crate::model::{Reservation, ReservationState};

use super::BookingError;

/// Edges of the reservation state graph.
pub fn can_transition(from: ReservationState, to: ReservationState) -> bool {
    use ReservationState::*;
    matches!(
        (from, to),
        (Pending, Confirmed)
            | (Confirmed, Active)
            | (Active, Completed)
            | (Pending | Confirmed | Active, Cancelled)
    )
}

/// Return a copy of `reservation` moved to `to`. The input is never modified,
/// so a rejected transition leaves the caller's record as it was.
pub fn apply(reservation: &Reservation, to: ReservationState) -> Result<Reservation, BookingError> {
    if !can_transition(reservation.state, to) {
        return Err(BookingError::InvalidTransition {
            from: reservation.state,
            to,
        });
    }
    let mut next = reservation.clone();
    next.state = to;
    Ok(next)
}
