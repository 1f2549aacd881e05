use chrono::Utc;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use takeflight_core::{
    BookingError, BookingResult, CacheCoherence, CacheKey, Flight, FlightSearch, FlightUpdate, InventoryStore,
    NewFlight, ReadPolicy,
};

/// Admin-side flight management and display reads
#[derive(Clone)]
pub struct FlightCatalog {
    inventory: Arc<dyn InventoryStore>,
    cache: CacheCoherence,
}

impl FlightCatalog {
    pub fn new(inventory: Arc<dyn InventoryStore>, cache: CacheCoherence) -> Self {
        Self { inventory, cache }
    }

    pub async fn create_flight(&self, details: NewFlight) -> BookingResult<Flight> {
        if details.flight_number.trim().is_empty() {
            return Err(BookingError::Validation("flight number is required".to_string()));
        }
        if details.total_seats <= 0 {
            return Err(BookingError::Validation("total seats must be positive".to_string()));
        }
        validate_schedule(&details.departure_time, &details.arrival_time)?;
        validate_price(details.price_amount)?;

        let flight = Flight::new(details);
        self.inventory.save_flight(&flight).await?;
        info!(
            "Flight scheduled: {} {} {} -> {} seats={}",
            flight.id, flight.flight_number, flight.departure_city, flight.arrival_city, flight.total_seats
        );
        Ok(flight)
    }

    pub async fn get_flight(&self, flight_id: Uuid, policy: ReadPolicy) -> BookingResult<Flight> {
        let inventory = self.inventory.clone();
        self.cache
            .read(&CacheKey::flight(flight_id), policy, || async move {
                let flight = inventory.get_flight(flight_id).await?;
                flight.ok_or(BookingError::FlightUnavailable(flight_id))
            })
            .await
    }

    /// Change schedule, fare or status. Seat counters are never written here.
    pub async fn update_flight(&self, flight_id: Uuid, update: FlightUpdate) -> BookingResult<Flight> {
        let mut flight = self
            .inventory
            .get_flight(flight_id)
            .await?
            .ok_or(BookingError::FlightUnavailable(flight_id))?;

        if let Some(status) = update.status {
            if flight.status.is_terminal() && status != flight.status {
                return Err(BookingError::Validation(format!(
                    "flight {} is {} and cannot become {}",
                    flight_id, flight.status, status
                )));
            }
            flight.status = status;
        }
        if let Some(departure_time) = update.departure_time {
            flight.departure_time = departure_time;
        }
        if let Some(arrival_time) = update.arrival_time {
            flight.arrival_time = arrival_time;
        }
        if let Some(price_amount) = update.price_amount {
            validate_price(price_amount)?;
            flight.price_amount = price_amount;
        }
        validate_schedule(&flight.departure_time, &flight.arrival_time)?;
        flight.updated_at = Utc::now();

        self.inventory.save_flight(&flight).await?;
        self.cache.invalidate_after_write(&CacheKey::flight(flight_id)).await;
        info!("Flight updated: {} status={} price={}", flight_id, flight.status, flight.price_amount);

        // Seat counters may have moved since the read above.
        self.inventory
            .get_flight(flight_id)
            .await?
            .ok_or(BookingError::FlightUnavailable(flight_id))
    }

    /// Bookable flights on a route and day with room for the party
    pub async fn search_flights(&self, criteria: &FlightSearch) -> BookingResult<Vec<Flight>> {
        if criteria.passengers < 1 {
            return Err(BookingError::Validation("passengers must be at least 1".to_string()));
        }
        if criteria.departure_city.trim().is_empty() || criteria.arrival_city.trim().is_empty() {
            return Err(BookingError::Validation("departure and arrival cities are required".to_string()));
        }

        let now = Utc::now();
        let flights = self.inventory.search_flights(criteria).await?;
        Ok(flights.into_iter().filter(|f| f.is_bookable(now)).collect())
    }
}

fn validate_schedule(departure: &chrono::DateTime<Utc>, arrival: &chrono::DateTime<Utc>) -> BookingResult<()> {
    if arrival <= departure {
        return Err(BookingError::Validation("arrival must be after departure".to_string()));
    }
    Ok(())
}

fn validate_price(price_amount: i64) -> BookingResult<()> {
    if price_amount <= 0 {
        return Err(BookingError::Validation("price must be positive".to_string()));
    }
    Ok(())
}
