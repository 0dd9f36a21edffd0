use std::time::Instant;

use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability;
use crate::store::{PutCondition, Repository, StoreError};

use super::availability::find_conflict;
use super::lifecycle;
use super::pricing::compute_price;
use super::validate::{normalize_notes, validate_window};
use super::{BookingEngine, BookingError, not_found_as};

impl<R: Repository> BookingEngine<R> {
    /// Validate, price, and store a new `pending` reservation.
    ///
    /// The write is conditioned on the vehicle's booking generation read before
    /// the availability check. Losing that race reloads and re-checks, so two
    /// overlapping requests cannot both land.
    pub async fn create_reservation(
        &self,
        request: ReservationRequest,
    ) -> Result<Reservation, BookingError> {
        let started = Instant::now();
        let result = self.try_create(request).await;
        observability::record_operation("create", started, &result);
        result
    }

    async fn try_create(&self, request: ReservationRequest) -> Result<Reservation, BookingError> {
        let span = validate_window(request.start, request.end)?;
        let notes = normalize_notes(request.notes)?;

        let member = self.load_member(request.member_id).await?;
        if !member.active {
            return Err(BookingError::MemberInactive(member.id));
        }
        let vehicle = self.load_vehicle(request.vehicle_id).await?;
        if !vehicle.available {
            return Err(BookingError::VehicleUnavailable(vehicle.id));
        }

        'rounds: for round in 0..MAX_GENERATION_RETRIES {
            let (generation, siblings) = self.load_calendar(vehicle.id).await?;
            if let Some(existing) = find_conflict(&siblings, &span, None) {
                return Err(self.window_conflict(vehicle.id, existing.id, &span));
            }

            let total_price = compute_price(&vehicle, request.rate_mode, &span)?;
            let now = (self.clock)();

            for attempt in 1..=MAX_ID_ATTEMPTS {
                let reservation = Reservation {
                    id: (self.ids)(),
                    member_id: member.id,
                    vehicle_id: vehicle.id,
                    span,
                    rate_mode: request.rate_mode,
                    total_price,
                    state: ReservationState::Pending,
                    created_at: now,
                    updated_at: now,
                    notes: notes.clone(),
                    vehicle_name: vehicle.name.clone(),
                    member_email: member.email.clone(),
                    version: 1,
                };

                match self
                    .repo
                    .put_reservation(&reservation, PutCondition::create(generation))
                    .await
                {
                    Ok(()) => {
                        info!(
                            reservation = %reservation.id,
                            vehicle = %vehicle.id,
                            member = %member.id,
                            start = span.start,
                            end = span.end,
                            price = %reservation.total_price,
                            "reservation created"
                        );
                        self.notify.send(Notice::Created(reservation.clone()));
                        return Ok(reservation);
                    }
                    Err(StoreError::AlreadyExists(id)) => {
                        debug!(%id, attempt, "reservation identifier collision");
                    }
                    Err(StoreError::GenerationMismatch { found, .. }) => {
                        metrics::counter!(observability::GENERATION_RETRIES_TOTAL).increment(1);
                        debug!(vehicle = %vehicle.id, round, found, "booking generation moved, revalidating");
                        continue 'rounds;
                    }
                    Err(StoreError::LimitExceeded(what)) => {
                        return Err(BookingError::LimitExceeded(what));
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            return Err(BookingError::IdentifierExhausted {
                attempts: MAX_ID_ATTEMPTS,
            });
        }

        Err(BookingError::ConcurrentModification(vehicle.id))
    }

    /// Apply the fields present in `patch`. A window change is revalidated
    /// (excluding this reservation) and repriced before any state transition
    /// is attempted; every failure leaves the stored record untouched.
    pub async fn update_reservation(
        &self,
        id: Ulid,
        patch: ReservationPatch,
    ) -> Result<Reservation, BookingError> {
        let started = Instant::now();
        let result = self.try_update(id, &patch).await;
        observability::record_operation("update", started, &result);
        result
    }

    /// Move a reservation to `cancelled`. Cancelling an already-cancelled
    /// reservation returns it unchanged.
    pub async fn cancel_reservation(&self, id: Ulid) -> Result<Reservation, BookingError> {
        let started = Instant::now();
        let result = self.try_update(id, &ReservationPatch::cancel()).await;
        observability::record_operation("cancel", started, &result);
        result
    }

    async fn try_update(
        &self,
        id: Ulid,
        patch: &ReservationPatch,
    ) -> Result<Reservation, BookingError> {
        let notes = match &patch.notes {
            Some(n) => Some(normalize_notes(Some(n.clone()))?),
            None => None,
        };

        for round in 0..MAX_GENERATION_RETRIES {
            let current = self.load_reservation(id).await?;
            let mut next = current.clone();
            let mut generation = None;

            if patch.touches_window() {
                let span = validate_window(
                    patch.start.unwrap_or(current.span.start),
                    patch.end.unwrap_or(current.span.end),
                )?;
                if span != current.span {
                    let (g, siblings) = self.load_calendar(current.vehicle_id).await?;
                    if let Some(existing) = find_conflict(&siblings, &span, Some(id)) {
                        return Err(self.window_conflict(current.vehicle_id, existing.id, &span));
                    }
                    let vehicle = self.load_vehicle(current.vehicle_id).await?;
                    next.span = span;
                    next.total_price = compute_price(&vehicle, next.rate_mode, &span)?;
                    generation = Some(g);
                }
            }

            if let Some(notes) = &notes {
                next.notes = notes.clone();
            }

            if let Some(to) = patch.state {
                let repeat_cancel =
                    to == ReservationState::Cancelled && current.state == ReservationState::Cancelled;
                if !repeat_cancel {
                    next = lifecycle::apply(&next, to)?;
                }
            }

            if next == current {
                debug!(reservation = %id, "update is a no-op");
                return Ok(current);
            }

            next.updated_at = (self.clock)();
            next.version = current.version + 1;

            match self
                .repo
                .put_reservation(&next, PutCondition::replace(current.version, generation))
                .await
            {
                Ok(()) => {
                    info!(
                        reservation = %id,
                        from = %current.state,
                        to = %next.state,
                        version = next.version,
                        "reservation updated"
                    );
                    self.notify.send(Notice::Updated {
                        previous: current.state,
                        reservation: next.clone(),
                    });
                    return Ok(next);
                }
                Err(StoreError::VersionMismatch { .. }) => {
                    return Err(BookingError::ConcurrentModification(id));
                }
                Err(StoreError::GenerationMismatch { found, .. }) => {
                    metrics::counter!(observability::GENERATION_RETRIES_TOTAL).increment(1);
                    debug!(reservation = %id, round, found, "booking generation moved, revalidating");
                }
                Err(e) => return Err(not_found_as(e, BookingError::ReservationNotFound(id))),
            }
        }

        Err(BookingError::ConcurrentModification(id))
    }

    /// Administrative hard delete. Bypasses the state machine.
    pub async fn delete_reservation(&self, id: Ulid) -> Result<Reservation, BookingError> {
        let started = Instant::now();
        let result = self
            .repo
            .delete_reservation(id)
            .await
            .map_err(|e| not_found_as(e, BookingError::ReservationNotFound(id)));
        if let Ok(removed) = &result {
            warn!(reservation = %id, vehicle = %removed.vehicle_id, state = %removed.state, "reservation hard-deleted");
            self.notify.send(Notice::Deleted {
                id,
                vehicle_id: removed.vehicle_id,
            });
        }
        observability::record_operation("delete", started, &result);
        result
    }

    fn window_conflict(&self, vehicle_id: Ulid, conflicting: Ulid, span: &Span) -> BookingError {
        metrics::counter!(observability::WINDOW_CONFLICTS_TOTAL).increment(1);
        warn!(vehicle = %vehicle_id, %conflicting, start = span.start, end = span.end, "window conflict");
        BookingError::WindowConflict {
            vehicle_id,
            conflicting,
        }
    }
}
