//! JSON-lines request codec for the binary.
//!
//! One request object per line, tagged by `op`; one response object per line.
//! Successes carry `"ok": true` plus the payload, failures carry
//! `"ok": false` and an `error` object with a stable `kind`.

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;
use ulid::Ulid;

use crate::engine::{BookingEngine, BookingError};
use crate::model::*;
use crate::observability;
use crate::store::Repository;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    Create {
        member_id: Ulid,
        vehicle_id: Ulid,
        start: Ms,
        end: Ms,
        /// Kept as text so an unknown mode reports `invalid_rate_mode`.
        rate_mode: String,
        #[serde(default)]
        notes: Option<String>,
    },
    Update {
        id: Ulid,
        #[serde(flatten)]
        patch: ReservationPatch,
    },
    Cancel {
        id: Ulid,
    },
    Get {
        id: Ulid,
    },
    List {
        #[serde(flatten)]
        filter: ReservationFilter,
    },
    Delete {
        id: Ulid,
    },
    Availability {
        vehicle_id: Ulid,
        start: Ms,
        end: Ms,
    },
    Quote {
        vehicle_id: Ulid,
        rate_mode: String,
        start: Ms,
        end: Ms,
    },
}

pub fn parse_line(line: &str) -> Result<Command, serde_json::Error> {
    serde_json::from_str(line)
}

/// Decode one request line and run it. Always yields a response.
pub async fn handle_line<R: Repository>(engine: &BookingEngine<R>, line: &str) -> Value {
    match parse_line(line) {
        Ok(cmd) => dispatch(engine, cmd).await,
        Err(e) => {
            metrics::counter!(observability::MALFORMED_REQUESTS_TOTAL).increment(1);
            debug!("malformed request: {e}");
            json!({
                "ok": false,
                "error": {
                    "kind": "malformed_request",
                    "message": e.to_string(),
                    "retryable": false,
                }
            })
        }
    }
}

pub async fn dispatch<R: Repository>(engine: &BookingEngine<R>, cmd: Command) -> Value {
    let op = observability::command_label(&cmd);
    debug!(op, "dispatch");
    let result = match cmd {
        Command::Create {
            member_id,
            vehicle_id,
            start,
            end,
            rate_mode,
            notes,
        } => match rate_mode.parse::<RateMode>() {
            Ok(rate_mode) => engine
                .create_reservation(ReservationRequest {
                    member_id,
                    vehicle_id,
                    start,
                    end,
                    rate_mode,
                    notes,
                })
                .await
                .map(reservation_body),
            Err(e) => Err(e.into()),
        },
        Command::Update { id, patch } => engine
            .update_reservation(id, patch)
            .await
            .map(reservation_body),
        Command::Cancel { id } => engine.cancel_reservation(id).await.map(reservation_body),
        Command::Get { id } => engine.get_reservation(id).await.map(reservation_body),
        Command::Delete { id } => engine.delete_reservation(id).await.map(reservation_body),
        Command::List { filter } => engine
            .list_reservations(&filter)
            .await
            .map(|rs| json!({ "reservations": rs })),
        Command::Availability {
            vehicle_id,
            start,
            end,
        } => engine
            .free_windows(vehicle_id, start, end)
            .await
            .map(|free| json!({ "free": free })),
        Command::Quote {
            vehicle_id,
            rate_mode,
            start,
            end,
        } => engine
            .quote(vehicle_id, &rate_mode, start, end)
            .await
            .map(|price| json!({ "price": price.to_string() })),
    };

    match result {
        Ok(Value::Object(mut body)) => {
            body.insert("ok".into(), Value::Bool(true));
            Value::Object(body)
        }
        Ok(other) => json!({ "ok": true, "value": other }),
        Err(e) => error_body(&e),
    }
}

fn reservation_body(reservation: Reservation) -> Value {
    json!({ "reservation": reservation })
}

pub fn error_body(err: &BookingError) -> Value {
    json!({
        "ok": false,
        "error": {
            "kind": err.kind(),
            "message": err.to_string(),
            "retryable": err.is_retryable(),
        }
    })
}
