use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;
use takeflight_core::{BookingError, BookingResult, CacheCoherence, CacheKey, InventoryStore, SeatAdjustment};

/// Change to a flight's held seats required by a booking operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeatEffect {
    None,
    Reserve(i32),
    Release(i32),
}

impl SeatEffect {
    /// Effect for moving a hold from `old` seats to `new` seats
    pub fn for_delta(old: i32, new: i32) -> Self {
        match new - old {
            0 => SeatEffect::None,
            d if d > 0 => SeatEffect::Reserve(d),
            d => SeatEffect::Release(-d),
        }
    }

    /// The compensating effect
    pub fn inverse(self) -> Self {
        match self {
            SeatEffect::None => SeatEffect::None,
            SeatEffect::Reserve(n) => SeatEffect::Release(n),
            SeatEffect::Release(n) => SeatEffect::Reserve(n),
        }
    }
}

/// Reserves and releases seats through the store's atomic conditional update.
///
/// The engine never reads the seat count to decide anything; the store
/// evaluates every bound inside the write itself.
#[derive(Clone)]
pub struct SeatReservationEngine {
    inventory: Arc<dyn InventoryStore>,
    cache: CacheCoherence,
}

impl SeatReservationEngine {
    pub fn new(inventory: Arc<dyn InventoryStore>, cache: CacheCoherence) -> Self {
        Self { inventory, cache }
    }

    /// Take `seats` seats. Returns the remaining availability.
    pub async fn reserve(&self, flight_id: Uuid, seats: i32) -> BookingResult<i32> {
        if seats <= 0 {
            return Err(BookingError::Validation(format!("cannot reserve {} seats", seats)));
        }
        self.adjust(flight_id, seats).await
    }

    /// Give back `seats` seats. Returns the new availability.
    pub async fn release(&self, flight_id: Uuid, seats: i32) -> BookingResult<i32> {
        if seats <= 0 {
            return Err(BookingError::Validation(format!("cannot release {} seats", seats)));
        }
        self.adjust(flight_id, -seats).await
    }

    /// Apply a planned effect; `None` is a no-op that reports nothing.
    pub async fn apply(&self, flight_id: Uuid, effect: SeatEffect) -> BookingResult<Option<i32>> {
        match effect {
            SeatEffect::None => Ok(None),
            SeatEffect::Reserve(n) => self.reserve(flight_id, n).await.map(Some),
            SeatEffect::Release(n) => self.release(flight_id, n).await.map(Some),
        }
    }

    async fn adjust(&self, flight_id: Uuid, delta: i32) -> BookingResult<i32> {
        match self.inventory.adjust_seats(flight_id, delta).await? {
            SeatAdjustment::Applied { available_seats } => {
                info!("Seats adjusted: flight={} delta={} available={}", flight_id, delta, available_seats);
                self.cache.invalidate_after_write(&CacheKey::flight(flight_id)).await;
                Ok(available_seats)
            }
            SeatAdjustment::Insufficient { available_seats } => Err(BookingError::InsufficientInventory {
                flight_id,
                requested: delta,
                available: available_seats,
            }),
            SeatAdjustment::Overflow { available_seats, total_seats } => {
                error!(
                    "Seat release would exceed capacity (double release?): flight={} released={} available={} total={}",
                    flight_id, -delta, available_seats, total_seats
                );
                Err(BookingError::InventoryOverflow {
                    flight_id,
                    released: -delta,
                    available: available_seats,
                    total: total_seats,
                })
            }
            SeatAdjustment::Closed(status) => {
                info!("Reservation rejected, flight {} is {}", flight_id, status);
                Err(BookingError::FlightUnavailable(flight_id))
            }
            SeatAdjustment::NotFound => Err(BookingError::FlightUnavailable(flight_id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryInventoryStore;
    use chrono::{Duration, Utc};
    use std::time::Duration as StdDuration;
    use takeflight_core::{Cache, ErrorKind, Flight, FlightStatus, MemoryCache, NewFlight};

    fn flight(total_seats: i32) -> Flight {
        let departure = Utc::now() + Duration::days(5);
        Flight::new(NewFlight {
            flight_number: "TF310".to_string(),
            airline: "Take Flight".to_string(),
            departure_city: "Johannesburg".to_string(),
            arrival_city: "Lusaka".to_string(),
            departure_time: departure,
            arrival_time: departure + Duration::minutes(110),
            price_amount: 25_000,
            price_currency: "USD".to_string(),
            total_seats,
        })
    }

    async fn setup(total_seats: i32) -> (Arc<MemoryInventoryStore>, Arc<MemoryCache>, SeatReservationEngine, Flight) {
        let store = Arc::new(MemoryInventoryStore::new());
        let cache = Arc::new(MemoryCache::new());
        let f = flight(total_seats);
        store.save_flight(&f).await.unwrap();
        let engine = SeatReservationEngine::new(store.clone(), CacheCoherence::new(cache.clone()));
        (store, cache, engine, f)
    }

    #[test]
    fn test_seat_effect_for_delta() {
        assert_eq!(SeatEffect::for_delta(2, 4), SeatEffect::Reserve(2));
        assert_eq!(SeatEffect::for_delta(4, 1), SeatEffect::Release(3));
        assert_eq!(SeatEffect::for_delta(3, 3), SeatEffect::None);
        assert_eq!(SeatEffect::Reserve(2).inverse(), SeatEffect::Release(2));
    }

    #[tokio::test]
    async fn test_reserve_and_release() {
        let (store, _, engine, f) = setup(5).await;

        assert_eq!(engine.reserve(f.id, 3).await.unwrap(), 2);
        assert_eq!(engine.release(f.id, 1).await.unwrap(), 3);
        assert_eq!(store.get_flight(f.id).await.unwrap().unwrap().available_seats, 3);
    }

    #[tokio::test]
    async fn test_insufficient_inventory_does_not_mutate() {
        let (store, _, engine, f) = setup(2).await;

        let err = engine.reserve(f.id, 3).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Capacity);
        assert!(matches!(err, BookingError::InsufficientInventory { requested: 3, available: 2, .. }));
        assert_eq!(store.get_flight(f.id).await.unwrap().unwrap().available_seats, 2);
    }

    #[tokio::test]
    async fn test_double_release_overflows_instead_of_clamping() {
        let (store, _, engine, f) = setup(4).await;
        engine.reserve(f.id, 2).await.unwrap();
        engine.release(f.id, 2).await.unwrap();

        let err = engine.release(f.id, 2).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Consistency);
        assert_eq!(store.get_flight(f.id).await.unwrap().unwrap().available_seats, 4);
    }

    #[tokio::test]
    async fn test_huge_release_is_an_overflow_not_a_panic() {
        let (store, _, engine, f) = setup(4).await;
        engine.reserve(f.id, 1).await.unwrap();

        let err = engine.release(f.id, i32::MAX).await.unwrap_err();
        assert!(matches!(err, BookingError::InventoryOverflow { released: i32::MAX, available: 3, total: 4, .. }));
        assert!(matches!(engine.reserve(f.id, i32::MAX).await, Err(BookingError::InsufficientInventory { .. })));
        assert_eq!(store.get_flight(f.id).await.unwrap().unwrap().available_seats, 3);
    }

    #[tokio::test]
    async fn test_terminal_and_unknown_flights_rejected() {
        let (store, _, engine, mut f) = setup(4).await;
        f.status = FlightStatus::Completed;
        store.save_flight(&f).await.unwrap();

        assert!(matches!(engine.reserve(f.id, 1).await, Err(BookingError::FlightUnavailable(_))));
        assert!(matches!(engine.reserve(Uuid::new_v4(), 1).await, Err(BookingError::FlightUnavailable(_))));
    }

    #[tokio::test]
    async fn test_non_positive_counts_rejected() {
        let (_, _, engine, f) = setup(4).await;
        assert!(matches!(engine.reserve(f.id, 0).await, Err(BookingError::Validation(_))));
        assert!(matches!(engine.release(f.id, -1).await, Err(BookingError::Validation(_))));
        assert_eq!(engine.apply(f.id, SeatEffect::None).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_successful_adjustment_invalidates_flight_entry() {
        let (_, cache, engine, f) = setup(4).await;
        let key = CacheKey::flight(f.id);
        cache.set(key.as_str(), "stale", StdDuration::from_secs(60)).await.unwrap();

        engine.reserve(f.id, 1).await.unwrap();
        assert!(cache.get(key.as_str()).await.unwrap().is_none());

        // Failed adjustments leave the cache alone.
        cache.set(key.as_str(), "kept", StdDuration::from_secs(60)).await.unwrap();
        let _ = engine.reserve(f.id, 10).await;
        assert_eq!(cache.get(key.as_str()).await.unwrap().as_deref(), Some("kept"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reservations_never_oversell() {
        let (store, _, engine, f) = setup(25).await;

        let mut handles = Vec::new();
        for _ in 0..60 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move { engine.reserve(f.id, 1).await }));
        }

        let mut won = 0;
        let mut lost = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(available) => {
                    assert!(available >= 0);
                    won += 1;
                }
                Err(BookingError::InsufficientInventory { .. }) => lost += 1,
                Err(other) => panic!("unexpected error: {}", other),
            }
        }

        assert_eq!(won, 25);
        assert_eq!(lost, 35);
        assert_eq!(store.get_flight(f.id).await.unwrap().unwrap().available_seats, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_interleaved_reserve_release_stays_in_bounds() {
        let (store, _, engine, f) = setup(10).await;

        let mut handles = Vec::new();
        for i in 0..80 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                if engine.reserve(f.id, 1 + (i % 3)).await.is_ok() {
                    tokio::task::yield_now().await;
                    engine.release(f.id, 1 + (i % 3)).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let stored = store.get_flight(f.id).await.unwrap().unwrap();
        assert_eq!(stored.available_seats, 10);
    }
}
