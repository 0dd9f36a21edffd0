//! Persistence seam of the booking engine.
//!
//! The engine only talks to storage through [`Repository`]. Writes are
//! conditional: a put states what it expects the stored reservation to look
//! like ([`Expected`]) and, for writes that claim calendar time, which booking
//! generation of the vehicle it validated against.

mod journal;
mod memory;

pub use memory::{InMemoryStore, VehicleBook};

use async_trait::async_trait;
use thiserror::Error;
use ulid::Ulid;

use crate::model::{Member, Reservation, ReservationFilter, Vehicle};

/// Precondition on the stored reservation for a conditional put.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expected {
    /// The identifier must be unused.
    MustNotExist,
    /// The stored record must carry exactly this version.
    Version(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PutCondition {
    pub expected: Expected,
    /// When set, the vehicle's booking generation must still equal this value;
    /// a successful put bumps it by one.
    pub generation: Option<u64>,
}

impl PutCondition {
    pub fn create(generation: u64) -> Self {
        Self {
            expected: Expected::MustNotExist,
            generation: Some(generation),
        }
    }

    pub fn replace(version: u64, generation: Option<u64>) -> Self {
        Self {
            expected: Expected::Version(version),
            generation,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Ulid },

    #[error("reservation already exists: {0}")]
    AlreadyExists(Ulid),

    #[error("reservation {id} version mismatch: expected {expected}, found {found}")]
    VersionMismatch { id: Ulid, expected: u64, found: u64 },

    #[error("vehicle {vehicle_id} booking generation moved: expected {expected}, found {found}")]
    GenerationMismatch {
        vehicle_id: Ulid,
        expected: u64,
        found: u64,
    },

    #[error("email already registered: {0}")]
    DuplicateEmail(String),

    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),

    #[error("journal error: {0}")]
    Journal(String),
}

impl StoreError {
    pub(crate) fn member(id: Ulid) -> Self {
        StoreError::NotFound { entity: "member", id }
    }

    pub(crate) fn vehicle(id: Ulid) -> Self {
        StoreError::NotFound { entity: "vehicle", id }
    }

    pub(crate) fn reservation(id: Ulid) -> Self {
        StoreError::NotFound { entity: "reservation", id }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Durable storage as seen by the booking engine.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn get_member(&self, id: Ulid) -> Result<Member, StoreError>;

    async fn get_vehicle(&self, id: Ulid) -> Result<Vehicle, StoreError>;

    async fn get_reservation(&self, id: Ulid) -> Result<Reservation, StoreError>;

    /// Every reservation ever written for the vehicle, whatever its state.
    async fn list_reservations_for_vehicle(
        &self,
        vehicle_id: Ulid,
    ) -> Result<Vec<Reservation>, StoreError>;

    /// Reservations matching `filter`, newest `created_at` first.
    async fn list_reservations(
        &self,
        filter: &ReservationFilter,
    ) -> Result<Vec<Reservation>, StoreError>;

    /// Current booking generation of the vehicle's calendar.
    async fn booking_generation(&self, vehicle_id: Ulid) -> Result<u64, StoreError>;

    /// Conditional write. Checks the generation first, then the reservation precondition.
    async fn put_reservation(
        &self,
        reservation: &Reservation,
        condition: PutCondition,
    ) -> Result<(), StoreError>;

    /// Administrative hard delete. Returns the removed record.
    async fn delete_reservation(&self, id: Ulid) -> Result<Reservation, StoreError>;
}
