use std::time::Instant;

use rust_decimal::Decimal;
use ulid::Ulid;

use crate::model::*;
use crate::observability;
use crate::store::Repository;

use super::availability::{free_windows, is_free};
use super::pricing::compute_price;
use super::validate::validate_window;
use super::{BookingEngine, BookingError};

impl<R: Repository> BookingEngine<R> {
    pub async fn get_reservation(&self, id: Ulid) -> Result<Reservation, BookingError> {
        self.load_reservation(id).await
    }

    /// Reservations matching `filter`, newest first.
    pub async fn list_reservations(
        &self,
        filter: &ReservationFilter,
    ) -> Result<Vec<Reservation>, BookingError> {
        let started = Instant::now();
        let result = self.repo.list_reservations(filter).await.map_err(|e| {
            match (e.is_not_found(), filter.vehicle_id) {
                (true, Some(vid)) => BookingError::VehicleNotFound(vid),
                _ => BookingError::Storage(e),
            }
        });
        observability::record_operation("list", started, &result);
        result
    }

    /// Whether no active reservation other than `exclude` overlaps `[start, end)`.
    pub async fn is_available(
        &self,
        vehicle_id: Ulid,
        start: Ms,
        end: Ms,
        exclude: Option<Ulid>,
    ) -> Result<bool, BookingError> {
        let span = validate_window(start, end)?;
        let (_, reservations) = self.load_calendar(vehicle_id).await?;
        Ok(is_free(&reservations, &span, exclude))
    }

    /// Parts of `[start, end)` the vehicle is not booked for.
    pub async fn free_windows(
        &self,
        vehicle_id: Ulid,
        start: Ms,
        end: Ms,
    ) -> Result<Vec<Span>, BookingError> {
        let started = Instant::now();
        let result: Result<Vec<Span>, BookingError> = async {
            let span = validate_window(start, end)?;
            let (_, reservations) = self.load_calendar(vehicle_id).await?;
            Ok(free_windows(&reservations, &span))
        }
        .await;
        observability::record_operation("availability", started, &result);
        result
    }

    /// Price a window without booking it.
    pub async fn quote(
        &self,
        vehicle_id: Ulid,
        rate_mode: &str,
        start: Ms,
        end: Ms,
    ) -> Result<Decimal, BookingError> {
        let mode: RateMode = rate_mode.parse()?;
        let span = validate_window(start, end)?;
        let vehicle = self.load_vehicle(vehicle_id).await?;
        compute_price(&vehicle, mode, &span)
    }
}
