//! Fleet seed file: members and vehicles installed into the store at startup.
//!
//! ```json
//! {
//!   "members":  [{ "id": "01J...", "email": "ana@example.com" }],
//!   "vehicles": [{ "id": "01J...", "name": "Cargo van", "hourly_rate": 1500 }]
//! }
//! ```
//!
//! Rates may be JSON numbers or decimal strings. A vehicle without
//! `daily_rate` is billed at eight hours per day.

use std::path::Path;

use rust_decimal::Decimal;
use serde::Deserialize;
use ulid::Ulid;

use crate::limits::{MAX_NAME_LEN, MAX_RATE};
use crate::model::{Member, Vehicle};
use crate::store::{InMemoryStore, StoreError};

const DEFAULT_DAILY_HOURS: i64 = 8;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read fleet file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed fleet file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("vehicle {id}: {field} must be positive, got {value}")]
    NonPositiveRate {
        id: Ulid,
        field: &'static str,
        value: Decimal,
    },

    #[error("vehicle {id}: {field} must be at most {max}, got {value}", max = MAX_RATE)]
    RateTooHigh {
        id: Ulid,
        field: &'static str,
        value: Decimal,
    },

    #[error("{entity} {id}: {field} must be non-blank and at most {max} bytes", max = MAX_NAME_LEN)]
    BadText {
        entity: &'static str,
        id: Ulid,
        field: &'static str,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FleetFile {
    #[serde(default)]
    pub members: Vec<MemberEntry>,
    #[serde(default)]
    pub vehicles: Vec<VehicleEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MemberEntry {
    pub id: Ulid,
    pub email: String,
    #[serde(default = "yes")]
    pub active: bool,
    #[serde(default)]
    pub points: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VehicleEntry {
    pub id: Ulid,
    pub name: String,
    pub hourly_rate: Decimal,
    #[serde(default)]
    pub daily_rate: Option<Decimal>,
    #[serde(default = "yes")]
    pub available: bool,
}

fn yes() -> bool {
    true
}

impl MemberEntry {
    fn into_member(self) -> Result<Member, CatalogError> {
        check_text("member", self.id, "email", &self.email)?;
        Ok(Member {
            id: self.id,
            email: self.email.trim().to_string(),
            active: self.active,
            points: self.points,
        })
    }
}

impl VehicleEntry {
    fn into_vehicle(self) -> Result<Vehicle, CatalogError> {
        check_text("vehicle", self.id, "name", &self.name)?;
        check_rate(self.id, "hourly_rate", self.hourly_rate)?;
        let daily_rate = match self.daily_rate {
            Some(rate) => rate,
            None => self
                .hourly_rate
                .checked_mul(Decimal::from(DEFAULT_DAILY_HOURS))
                .ok_or(CatalogError::RateTooHigh {
                    id: self.id,
                    field: "daily_rate",
                    value: self.hourly_rate,
                })?,
        };
        check_rate(self.id, "daily_rate", daily_rate)?;
        Ok(Vehicle {
            id: self.id,
            name: self.name,
            hourly_rate: self.hourly_rate,
            daily_rate,
            available: self.available,
        })
    }
}

fn check_rate(id: Ulid, field: &'static str, value: Decimal) -> Result<(), CatalogError> {
    if value <= Decimal::ZERO {
        return Err(CatalogError::NonPositiveRate { id, field, value });
    }
    if value > Decimal::from(MAX_RATE) {
        return Err(CatalogError::RateTooHigh { id, field, value });
    }
    Ok(())
}

fn check_text(
    entity: &'static str,
    id: Ulid,
    field: &'static str,
    value: &str,
) -> Result<(), CatalogError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.len() > MAX_NAME_LEN {
        return Err(CatalogError::BadText { entity, id, field });
    }
    Ok(())
}

pub fn parse(json: &str) -> Result<FleetFile, CatalogError> {
    Ok(serde_json::from_str(json)?)
}

pub fn load(path: &Path) -> Result<FleetFile, CatalogError> {
    let raw = std::fs::read_to_string(path)?;
    parse(&raw)
}

impl FleetFile {
    /// Validate every entry, then upsert them into `store`. Nothing is written
    /// if any entry fails validation.
    pub async fn install(self, store: &InMemoryStore) -> Result<(usize, usize), CatalogError> {
        let members = self
            .members
            .into_iter()
            .map(MemberEntry::into_member)
            .collect::<Result<Vec<_>, _>>()?;
        let vehicles = self
            .vehicles
            .into_iter()
            .map(VehicleEntry::into_vehicle)
            .collect::<Result<Vec<_>, _>>()?;

        let counts = (members.len(), vehicles.len());
        for member in members {
            store.upsert_member(member).await?;
        }
        for vehicle in vehicles {
            store.upsert_vehicle(vehicle).await?;
        }
        tracing::info!(members = counts.0, vehicles = counts.1, "fleet installed");
        Ok(counts)
    }
}
