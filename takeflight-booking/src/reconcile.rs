use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;
use takeflight_core::{BookingError, BookingResult, BookingSearch, BookingStore, InventoryStore};

/// Seat accounting for one flight at a point in time
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ReconciliationReport {
    pub flight_id: Uuid,
    pub flight_number: String,
    pub total_seats: i32,
    pub available_seats: i32,
    /// total - available, as recorded on the flight
    pub consumed_seats: i32,
    /// Sum of passengers over bookings that still hold seats
    pub held_seats: i32,
    /// consumed - held; anything but zero is a leak or a double release
    pub drift: i32,
}

impl ReconciliationReport {
    pub fn is_consistent(&self) -> bool {
        self.drift == 0
    }
}

/// Read-only audit of flight seat counters against the bookings holding them
#[derive(Clone)]
pub struct InventoryReconciler {
    inventory: Arc<dyn InventoryStore>,
    bookings: Arc<dyn BookingStore>,
}

impl InventoryReconciler {
    pub fn new(inventory: Arc<dyn InventoryStore>, bookings: Arc<dyn BookingStore>) -> Self {
        Self { inventory, bookings }
    }

    pub async fn reconcile_flight(&self, flight_id: Uuid) -> BookingResult<ReconciliationReport> {
        let flight = self
            .inventory
            .get_flight(flight_id)
            .await?
            .ok_or(BookingError::FlightUnavailable(flight_id))?;
        let bookings = self.bookings.search(&BookingSearch::for_flight(flight_id)).await?;

        let held_seats: i32 = bookings.iter().map(|b| b.held_seats()).sum();
        let consumed_seats = flight.consumed_seats();
        let report = ReconciliationReport {
            flight_id,
            flight_number: flight.flight_number,
            total_seats: flight.total_seats,
            available_seats: flight.available_seats,
            consumed_seats,
            held_seats,
            drift: consumed_seats - held_seats,
        };

        if !report.is_consistent() {
            error!(
                "Seat drift on flight {} ({}): consumed={} held={} drift={}",
                report.flight_id, report.flight_number, report.consumed_seats, report.held_seats, report.drift
            );
        }
        Ok(report)
    }

    pub async fn reconcile_all(&self) -> BookingResult<Vec<ReconciliationReport>> {
        let ids = self.inventory.list_flight_ids().await?;
        let mut reports = Vec::with_capacity(ids.len());
        for id in ids {
            reports.push(self.reconcile_flight(id).await?);
        }

        let drifting = reports.iter().filter(|r| !r.is_consistent()).count();
        info!("Reconciled {} flights, {} with drift", reports.len(), drifting);
        Ok(reports)
    }
}
