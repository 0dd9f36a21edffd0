//! Booking orchestration.
//!
//! [`BookingEngine`] composes the availability checker, the pricing
//! calculator, and the reservation state machine over a [`Repository`].
//! Each call works on its own snapshot and ends in at most one conditional
//! write; no lock is held across the read/validate/write steps.

mod availability;
mod error;
pub mod lifecycle;
mod mutations;
pub mod pricing;
mod queries;
mod validate;

pub use availability::{find_conflict, free_windows, is_free, merge_overlapping, subtract_intervals};
pub use error::BookingError;
pub use lifecycle::can_transition;
pub use pricing::compute_price;

use std::sync::Arc;

use ulid::Ulid;

use crate::model::*;
use crate::notify::NotifyHub;
use crate::store::{Repository, StoreError};

/// Source of fresh reservation identifiers.
pub type IdSource = Arc<dyn Fn() -> Ulid + Send + Sync>;
/// Source of "now" for created/updated stamps.
pub type Clock = Arc<dyn Fn() -> Ms + Send + Sync>;

pub struct BookingEngine<R> {
    repo: Arc<R>,
    notify: Arc<NotifyHub>,
    ids: IdSource,
    clock: Clock,
}

impl<R: Repository> BookingEngine<R> {
    pub fn new(repo: Arc<R>, notify: Arc<NotifyHub>) -> Self {
        Self {
            repo,
            notify,
            ids: Arc::new(Ulid::new),
            clock: Arc::new(validate::now_ms),
        }
    }

    pub fn with_id_source(mut self, ids: impl Fn() -> Ulid + Send + Sync + 'static) -> Self {
        self.ids = Arc::new(ids);
        self
    }

    pub fn with_clock(mut self, clock: impl Fn() -> Ms + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repo
    }

    pub fn notify(&self) -> &Arc<NotifyHub> {
        &self.notify
    }

    pub(super) async fn load_member(&self, id: Ulid) -> Result<Member, BookingError> {
        self.repo
            .get_member(id)
            .await
            .map_err(|e| not_found_as(e, BookingError::MemberNotFound(id)))
    }

    pub(super) async fn load_vehicle(&self, id: Ulid) -> Result<Vehicle, BookingError> {
        self.repo
            .get_vehicle(id)
            .await
            .map_err(|e| not_found_as(e, BookingError::VehicleNotFound(id)))
    }

    pub(super) async fn load_reservation(&self, id: Ulid) -> Result<Reservation, BookingError> {
        self.repo
            .get_reservation(id)
            .await
            .map_err(|e| not_found_as(e, BookingError::ReservationNotFound(id)))
    }

    /// Booking generation and every reservation on the vehicle, read in that
    /// order so a write that lands after the listing also moves the generation.
    pub(super) async fn load_calendar(
        &self,
        vehicle_id: Ulid,
    ) -> Result<(u64, Vec<Reservation>), BookingError> {
        let vehicle_missing = || BookingError::VehicleNotFound(vehicle_id);
        let generation = self
            .repo
            .booking_generation(vehicle_id)
            .await
            .map_err(|e| not_found_as(e, vehicle_missing()))?;
        let reservations = self
            .repo
            .list_reservations_for_vehicle(vehicle_id)
            .await
            .map_err(|e| not_found_as(e, vehicle_missing()))?;
        Ok((generation, reservations))
    }
}

fn not_found_as(err: StoreError, kind: BookingError) -> BookingError {
    if err.is_not_found() {
        kind
    } else {
        BookingError::Storage(err)
    }
}
