use std::collections::HashMap;
use std::io;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock};
use ulid::Ulid;

use crate::limits::MAX_RESERVATIONS_PER_VEHICLE;
use crate::model::{Event, Member, Reservation, ReservationFilter, Vehicle};

use super::journal::Journal;
use super::{Expected, PutCondition, Repository, StoreError};

/// A vehicle's catalog entry together with its booking calendar.
#[derive(Debug, Clone)]
pub struct VehicleBook {
    pub vehicle: Vehicle,
    /// Bumped by every put that claims calendar time on this vehicle.
    pub generation: u64,
    /// Secondary index: every reservation ever written for this vehicle.
    pub reservation_ids: Vec<Ulid>,
}

impl VehicleBook {
    fn new(vehicle: Vehicle, generation: u64) -> Self {
        Self {
            vehicle,
            generation,
            reservation_ids: Vec::new(),
        }
    }

    fn index(&mut self, id: Ulid) {
        if !self.reservation_ids.contains(&id) {
            self.reservation_ids.push(id);
        }
    }
}

pub type SharedVehicleBook = Arc<RwLock<VehicleBook>>;

/// DashMap-backed store, optionally journaled to disk.
///
/// Every reservation write takes its vehicle's book write lock for the
/// duration of the check-journal-apply sequence, which makes the conditional
/// put atomic per vehicle. Catalog writes (members, vehicles) are serialized by
/// a separate mutex.
pub struct InMemoryStore {
    members: DashMap<Ulid, Member>,
    emails: DashMap<String, Ulid>,
    vehicles: DashMap<Ulid, SharedVehicleBook>,
    reservations: DashMap<Ulid, Reservation>,
    catalog_lock: Mutex<()>,
    journal: Option<Journal>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    /// Volatile store with no journal.
    pub fn new() -> Self {
        Self {
            members: DashMap::new(),
            emails: DashMap::new(),
            vehicles: DashMap::new(),
            reservations: DashMap::new(),
            catalog_lock: Mutex::new(()),
            journal: None,
        }
    }

    /// Replay the journal at `path` and keep appending to it. Must be called
    /// from inside a tokio runtime.
    pub fn open(path: &Path) -> io::Result<Self> {
        let (journal, events) = Journal::open(path)?;
        let replayed = events.len();
        let mut store = Self::new();
        store.restore(events);
        store.journal = Some(journal);
        tracing::info!(
            path = %path.display(),
            events = replayed,
            members = store.members.len(),
            vehicles = store.vehicles.len(),
            reservations = store.reservations.len(),
            "store opened"
        );
        Ok(store)
    }

    /// Rebuild state from journal events. Runs before the store is shared.
    fn restore(&mut self, events: Vec<Event>) {
        let mut books: HashMap<Ulid, VehicleBook> = HashMap::new();
        for event in events {
            match event {
                Event::MemberUpserted { member } => {
                    self.index_member(member);
                }
                Event::VehicleUpserted {
                    vehicle,
                    generation,
                } => match books.get_mut(&vehicle.id) {
                    Some(book) => {
                        book.vehicle = vehicle;
                        book.generation = generation;
                    }
                    None => {
                        books.insert(vehicle.id, VehicleBook::new(vehicle, generation));
                    }
                },
                Event::ReservationPut {
                    reservation,
                    generation,
                } => {
                    if let Some(book) = books.get_mut(&reservation.vehicle_id) {
                        book.index(reservation.id);
                        if let Some(g) = generation {
                            book.generation = g;
                        }
                    }
                    self.reservations.insert(reservation.id, reservation);
                }
                Event::ReservationDeleted { id, vehicle_id } => {
                    if let Some(book) = books.get_mut(&vehicle_id) {
                        book.reservation_ids.retain(|r| *r != id);
                    }
                    self.reservations.remove(&id);
                }
            }
        }
        for (id, book) in books {
            self.vehicles.insert(id, Arc::new(RwLock::new(book)));
        }
    }

    async fn persist(&self, event: &Event) -> Result<(), StoreError> {
        match &self.journal {
            Some(journal) => journal.append(event).await,
            None => Ok(()),
        }
    }

    fn book(&self, vehicle_id: Ulid) -> Result<SharedVehicleBook, StoreError> {
        self.vehicles
            .get(&vehicle_id)
            .map(|e| e.value().clone())
            .ok_or(StoreError::vehicle(vehicle_id))
    }

    fn index_member(&self, member: Member) {
        if let Some(previous) = self.members.get(&member.id).map(|m| m.email.clone())
            && previous != member.email
        {
            self.emails.remove(&previous);
        }
        self.emails.insert(member.email.clone(), member.id);
        self.members.insert(member.id, member);
    }

    // ── Catalog collaborator surface ─────────────────────────

    /// Insert or replace a member. Emails are unique across members.
    pub async fn upsert_member(&self, member: Member) -> Result<(), StoreError> {
        let _catalog = self.catalog_lock.lock().await;
        self.put_member_locked(member).await
    }

    /// Soft delete / reactivate a member. The read and the write happen under
    /// one catalog lock, so a concurrent upsert is never overwritten with stale
    /// fields.
    pub async fn set_member_active(&self, id: Ulid, active: bool) -> Result<Member, StoreError> {
        let _catalog = self.catalog_lock.lock().await;
        let mut member = self
            .members
            .get(&id)
            .map(|m| m.value().clone())
            .ok_or(StoreError::member(id))?;
        member.active = active;
        self.put_member_locked(member.clone()).await?;
        Ok(member)
    }

    /// Caller holds `catalog_lock`.
    async fn put_member_locked(&self, member: Member) -> Result<(), StoreError> {
        if let Some(owner) = self.emails.get(&member.email).map(|e| *e.value())
            && owner != member.id
        {
            return Err(StoreError::DuplicateEmail(member.email));
        }
        self.persist(&Event::MemberUpserted {
            member: member.clone(),
        })
        .await?;
        self.index_member(member);
        Ok(())
    }

    /// Insert or replace a vehicle's catalog entry. The booking calendar and
    /// generation of an existing vehicle are preserved.
    pub async fn upsert_vehicle(&self, vehicle: Vehicle) -> Result<(), StoreError> {
        let _catalog = self.catalog_lock.lock().await;
        match self.vehicles.get(&vehicle.id).map(|e| e.value().clone()) {
            Some(book) => {
                let mut guard = book.write().await;
                self.persist(&Event::VehicleUpserted {
                    vehicle: vehicle.clone(),
                    generation: guard.generation,
                })
                .await?;
                guard.vehicle = vehicle;
            }
            None => {
                self.persist(&Event::VehicleUpserted {
                    vehicle: vehicle.clone(),
                    generation: 0,
                })
                .await?;
                let id = vehicle.id;
                self.vehicles
                    .insert(id, Arc::new(RwLock::new(VehicleBook::new(vehicle, 0))));
            }
        }
        Ok(())
    }

    /// Catalog soft delete / restore. Does not touch existing reservations.
    pub async fn set_vehicle_available(
        &self,
        id: Ulid,
        available: bool,
    ) -> Result<Vehicle, StoreError> {
        let _catalog = self.catalog_lock.lock().await;
        let book = self.book(id)?;
        let mut guard = book.write().await;
        let mut vehicle = guard.vehicle.clone();
        vehicle.available = available;
        self.persist(&Event::VehicleUpserted {
            vehicle: vehicle.clone(),
            generation: guard.generation,
        })
        .await?;
        guard.vehicle = vehicle.clone();
        Ok(vehicle)
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn vehicle_count(&self) -> usize {
        self.vehicles.len()
    }

    pub fn reservation_count(&self) -> usize {
        self.reservations.len()
    }

    // ── Journal maintenance ──────────────────────────────────

    pub async fn appends_since_compact(&self) -> u64 {
        match &self.journal {
            Some(journal) => journal.appends_since_compact().await,
            None => 0,
        }
    }

    /// Rewrite the journal with only the events needed to rebuild current state.
    ///
    /// Holds the catalog lock and every vehicle book's read lock until the
    /// rewrite lands, so no write can slip between the snapshot and the swap.
    pub async fn compact(&self) -> Result<(), StoreError> {
        let Some(journal) = &self.journal else {
            return Ok(());
        };
        let _catalog = self.catalog_lock.lock().await;

        let mut vehicle_ids: Vec<Ulid> = self.vehicles.iter().map(|e| *e.key()).collect();
        vehicle_ids.sort();
        let mut guards = Vec::with_capacity(vehicle_ids.len());
        for id in &vehicle_ids {
            if let Ok(book) = self.book(*id) {
                guards.push(book.read_owned().await);
            }
        }

        let mut events: Vec<Event> = self
            .members
            .iter()
            .map(|e| Event::MemberUpserted {
                member: e.value().clone(),
            })
            .collect();
        for guard in &guards {
            events.push(Event::VehicleUpserted {
                vehicle: guard.vehicle.clone(),
                generation: guard.generation,
            });
            for id in &guard.reservation_ids {
                if let Some(r) = self.reservations.get(id) {
                    events.push(Event::ReservationPut {
                        reservation: r.value().clone(),
                        generation: None,
                    });
                }
            }
        }

        let count = events.len();
        journal.compact(events).await?;
        metrics::counter!(crate::observability::WAL_COMPACTIONS_TOTAL).increment(1);
        tracing::info!(events = count, "journal compacted");
        Ok(())
    }
}

#[async_trait]
impl Repository for InMemoryStore {
    async fn get_member(&self, id: Ulid) -> Result<Member, StoreError> {
        self.members
            .get(&id)
            .map(|m| m.value().clone())
            .ok_or(StoreError::member(id))
    }

    async fn get_vehicle(&self, id: Ulid) -> Result<Vehicle, StoreError> {
        let book = self.book(id)?;
        let guard = book.read().await;
        Ok(guard.vehicle.clone())
    }

    async fn get_reservation(&self, id: Ulid) -> Result<Reservation, StoreError> {
        self.reservations
            .get(&id)
            .map(|r| r.value().clone())
            .ok_or(StoreError::reservation(id))
    }

    async fn list_reservations_for_vehicle(
        &self,
        vehicle_id: Ulid,
    ) -> Result<Vec<Reservation>, StoreError> {
        let book = self.book(vehicle_id)?;
        let guard = book.read().await;
        Ok(guard
            .reservation_ids
            .iter()
            .filter_map(|id| self.reservations.get(id).map(|r| r.value().clone()))
            .collect())
    }

    async fn list_reservations(
        &self,
        filter: &ReservationFilter,
    ) -> Result<Vec<Reservation>, StoreError> {
        let mut out: Vec<Reservation> = match filter.vehicle_id {
            Some(vehicle_id) => self
                .list_reservations_for_vehicle(vehicle_id)
                .await?
                .into_iter()
                .filter(|r| filter.matches(r))
                .collect(),
            None => self
                .reservations
                .iter()
                .filter(|e| filter.matches(e.value()))
                .map(|e| e.value().clone())
                .collect(),
        };
        out.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(out)
    }

    async fn booking_generation(&self, vehicle_id: Ulid) -> Result<u64, StoreError> {
        let book = self.book(vehicle_id)?;
        let guard = book.read().await;
        Ok(guard.generation)
    }

    async fn put_reservation(
        &self,
        reservation: &Reservation,
        condition: PutCondition,
    ) -> Result<(), StoreError> {
        let book = self.book(reservation.vehicle_id)?;
        let mut guard = book.write().await;

        if let Some(expected) = condition.generation
            && guard.generation != expected
        {
            return Err(StoreError::GenerationMismatch {
                vehicle_id: reservation.vehicle_id,
                expected,
                found: guard.generation,
            });
        }

        let stored = self.reservations.get(&reservation.id).map(|r| r.version);
        match (condition.expected, stored) {
            (Expected::MustNotExist, Some(_)) => {
                return Err(StoreError::AlreadyExists(reservation.id));
            }
            (Expected::MustNotExist, None) => {
                if guard.reservation_ids.len() >= MAX_RESERVATIONS_PER_VEHICLE {
                    return Err(StoreError::LimitExceeded("too many reservations on vehicle"));
                }
            }
            (Expected::Version(_), None) => {
                return Err(StoreError::reservation(reservation.id));
            }
            (Expected::Version(expected), Some(found)) if expected != found => {
                return Err(StoreError::VersionMismatch {
                    id: reservation.id,
                    expected,
                    found,
                });
            }
            (Expected::Version(_), Some(_)) => {}
        }

        let generation = condition.generation.map(|g| g + 1);
        self.persist(&Event::ReservationPut {
            reservation: reservation.clone(),
            generation,
        })
        .await?;

        if let Some(g) = generation {
            guard.generation = g;
        }
        guard.index(reservation.id);
        self.reservations.insert(reservation.id, reservation.clone());
        Ok(())
    }

    async fn delete_reservation(&self, id: Ulid) -> Result<Reservation, StoreError> {
        let vehicle_id = self.get_reservation(id).await?.vehicle_id;
        let book = self.book(vehicle_id)?;
        let mut guard = book.write().await;
        // Re-read under the lock; a concurrent delete may have won.
        let existing = self.get_reservation(id).await?;

        self.persist(&Event::ReservationDeleted { id, vehicle_id })
            .await?;
        guard.reservation_ids.retain(|r| *r != id);
        self.reservations.remove(&id);
        Ok(existing)
    }
}
