use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;
use takeflight_core::{Flight, FlightSearch, InventoryStore, SeatAdjustment, StoreError};

/// In-memory inventory store.
///
/// The mutex stands in for the database row lock: each adjustment is checked
/// and applied while it is held, so callers see a single atomic write.
#[derive(Default)]
pub struct MemoryInventoryStore {
    flights: Mutex<HashMap<Uuid, Flight>>,
}

impl MemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the available seat counter without any checks.
    /// Only meant for simulating out-of-band corruption in audits.
    pub async fn overwrite_available_seats(&self, id: Uuid, available_seats: i32) -> Result<(), StoreError> {
        let mut flights = self.flights.lock().await;
        let flight = flights.get_mut(&id).ok_or(StoreError::Missing(id))?;
        flight.available_seats = available_seats;
        Ok(())
    }
}

#[async_trait]
impl InventoryStore for MemoryInventoryStore {
    async fn get_flight(&self, id: Uuid) -> Result<Option<Flight>, StoreError> {
        Ok(self.flights.lock().await.get(&id).cloned())
    }

    async fn adjust_seats(&self, id: Uuid, delta: i32) -> Result<SeatAdjustment, StoreError> {
        let mut flights = self.flights.lock().await;
        let flight = match flights.get_mut(&id) {
            Some(flight) => flight,
            None => return Ok(SeatAdjustment::NotFound),
        };

        if delta > 0 && flight.status.is_terminal() {
            return Ok(SeatAdjustment::Closed(flight.status));
        }

        let Some(next) = flight.available_seats.checked_sub(delta) else {
            return Ok(if delta > 0 {
                SeatAdjustment::Insufficient { available_seats: flight.available_seats }
            } else {
                SeatAdjustment::Overflow {
                    available_seats: flight.available_seats,
                    total_seats: flight.total_seats,
                }
            });
        };
        if next < 0 {
            return Ok(SeatAdjustment::Insufficient { available_seats: flight.available_seats });
        }
        if next > flight.total_seats {
            return Ok(SeatAdjustment::Overflow {
                available_seats: flight.available_seats,
                total_seats: flight.total_seats,
            });
        }

        flight.available_seats = next;
        flight.updated_at = Utc::now();
        Ok(SeatAdjustment::Applied { available_seats: next })
    }

    async fn save_flight(&self, flight: &Flight) -> Result<(), StoreError> {
        let mut flights = self.flights.lock().await;
        match flights.get_mut(&flight.id) {
            Some(existing) => {
                let total_seats = existing.total_seats;
                let available_seats = existing.available_seats;
                *existing = flight.clone();
                existing.total_seats = total_seats;
                existing.available_seats = available_seats;
            }
            None => {
                flights.insert(flight.id, flight.clone());
            }
        }
        Ok(())
    }

    async fn search_flights(&self, criteria: &FlightSearch) -> Result<Vec<Flight>, StoreError> {
        let flights = self.flights.lock().await;
        let mut matches: Vec<Flight> = flights.values().filter(|f| criteria.matches(f)).cloned().collect();
        matches.sort_by_key(|f| f.departure_time);
        Ok(matches)
    }

    async fn list_flight_ids(&self) -> Result<Vec<Uuid>, StoreError> {
        let mut ids: Vec<Uuid> = self.flights.lock().await.keys().copied().collect();
        ids.sort();
        Ok(ids)
    }
}
