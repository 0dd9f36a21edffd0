use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds, UTC.
pub type Ms = i64;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// Checked constructor for untrusted bounds.
    pub fn try_new(start: Ms, end: Ms) -> Option<Self> {
        (start < end).then_some(Self { start, end })
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// How a reservation is billed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateMode {
    Hourly,
    Daily,
}

impl RateMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateMode::Hourly => "hourly",
            RateMode::Daily => "daily",
        }
    }
}

impl fmt::Display for RateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownRateMode(pub String);

impl FromStr for RateMode {
    type Err = UnknownRateMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hourly" => Ok(RateMode::Hourly),
            "daily" => Ok(RateMode::Daily),
            other => Err(UnknownRateMode(other.to_string())),
        }
    }
}

/// Reservation lifecycle. `pending → confirmed → active → completed`, with
/// `cancelled` reachable from every non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationState {
    Pending,
    Confirmed,
    Active,
    Completed,
    Cancelled,
}

impl ReservationState {
    pub const ALL: [ReservationState; 5] = [
        ReservationState::Pending,
        ReservationState::Confirmed,
        ReservationState::Active,
        ReservationState::Completed,
        ReservationState::Cancelled,
    ];

    /// States that occupy the vehicle's calendar.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ReservationState::Pending | ReservationState::Confirmed | ReservationState::Active
        )
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationState::Pending => "pending",
            ReservationState::Confirmed => "confirmed",
            ReservationState::Active => "active",
            ReservationState::Completed => "completed",
            ReservationState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ReservationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Member {
    pub id: Ulid,
    pub email: String,
    pub active: bool,
    pub points: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Vehicle {
    pub id: Ulid,
    pub name: String,
    #[serde(with = "rust_decimal::serde::str")]
    pub hourly_rate: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub daily_rate: Decimal,
    /// Catalog soft-delete marker. Not a calendar lock.
    pub available: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Reservation {
    pub id: Ulid,
    pub member_id: Ulid,
    pub vehicle_id: Ulid,
    pub span: Span,
    pub rate_mode: RateMode,
    #[serde(with = "rust_decimal::serde::str")]
    pub total_price: Decimal,
    pub state: ReservationState,
    pub created_at: Ms,
    pub updated_at: Ms,
    pub notes: Option<String>,
    /// Captured from the vehicle at creation time.
    pub vehicle_name: String,
    /// Captured from the member at creation time.
    pub member_email: String,
    /// Optimistic concurrency token, bumped on every write.
    pub version: u64,
}

impl Reservation {
    pub fn occupies(&self) -> bool {
        self.state.is_active()
    }
}

/// A booking request as received from a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationRequest {
    pub member_id: Ulid,
    pub vehicle_id: Ulid,
    pub start: Ms,
    pub end: Ms,
    pub rate_mode: RateMode,
    pub notes: Option<String>,
}

/// Fields a caller may change on an existing reservation. Absent fields are left alone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationPatch {
    pub start: Option<Ms>,
    pub end: Option<Ms>,
    /// `Some("")` clears the notes.
    pub notes: Option<String>,
    pub state: Option<ReservationState>,
}

impl ReservationPatch {
    pub fn cancel() -> Self {
        Self {
            state: Some(ReservationState::Cancelled),
            ..Self::default()
        }
    }

    pub fn transition(to: ReservationState) -> Self {
        Self {
            state: Some(to),
            ..Self::default()
        }
    }

    pub fn window(start: Ms, end: Ms) -> Self {
        Self {
            start: Some(start),
            end: Some(end),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.start.is_none() && self.end.is_none() && self.notes.is_none() && self.state.is_none()
    }

    pub fn touches_window(&self) -> bool {
        self.start.is_some() || self.end.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationFilter {
    pub member_id: Option<Ulid>,
    pub vehicle_id: Option<Ulid>,
    pub state: Option<ReservationState>,
}

impl ReservationFilter {
    pub fn matches(&self, r: &Reservation) -> bool {
        self.member_id.is_none_or(|m| m == r.member_id)
            && self.vehicle_id.is_none_or(|v| v == r.vehicle_id)
            && self.state.is_none_or(|s| s == r.state)
    }
}

/// Journal record format. Flat, no nesting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    MemberUpserted {
        member: Member,
    },
    VehicleUpserted {
        vehicle: Vehicle,
        generation: u64,
    },
    ReservationPut {
        reservation: Reservation,
        /// New booking generation of the vehicle, when the write bumped it.
        generation: Option<u64>,
    },
    ReservationDeleted {
        id: Ulid,
        vehicle_id: Ulid,
    },
}

/// Lifecycle notifications published after a successful write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Created(Reservation),
    Updated {
        previous: ReservationState,
        reservation: Reservation,
    },
    Deleted {
        id: Ulid,
        vehicle_id: Ulid,
    },
}

impl Notice {
    pub fn vehicle_id(&self) -> Ulid {
        match self {
            Notice::Created(r) | Notice::Updated { reservation: r, .. } => r.vehicle_id,
            Notice::Deleted { vehicle_id, .. } => *vehicle_id,
        }
    }

    /// True when this notice records an `active → completed` transition.
    pub fn is_completion(&self) -> bool {
        matches!(
            self,
            Notice::Updated { previous, reservation }
                if *previous != ReservationState::Completed
                    && reservation.state == ReservationState::Completed
        )
    }
}
