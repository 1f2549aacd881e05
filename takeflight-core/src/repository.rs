use async_trait::async_trait;
use uuid::Uuid;
use std::time::Duration;
use crate::booking::{Booking, BookingSearch, DailyCap};
use crate::error::{CacheError, StoreError};
use crate::flight::{Flight, FlightSearch, SeatAdjustment};

/// Authoritative flight inventory
#[async_trait]
pub trait InventoryStore: Send + Sync {
    async fn get_flight(&self, id: Uuid) -> Result<Option<Flight>, StoreError>;

    /// Atomically apply `available_seats -= delta`.
    ///
    /// The floor (`>= 0`), the ceiling (`<= total_seats`) and, for positive
    /// deltas, the closed-flight check must all be evaluated by the store in
    /// the same write. Nothing is changed unless the result is `Applied`.
    async fn adjust_seats(&self, id: Uuid, delta: i32) -> Result<SeatAdjustment, StoreError>;

    /// Insert a flight, or update its descriptive fields.
    /// Seat counters of an existing flight are never overwritten.
    async fn save_flight(&self, flight: &Flight) -> Result<(), StoreError>;

    async fn search_flights(&self, criteria: &FlightSearch) -> Result<Vec<Flight>, StoreError>;

    async fn list_flight_ids(&self) -> Result<Vec<Uuid>, StoreError>;
}

/// Booking records
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn create(&self, booking: &Booking) -> Result<(), StoreError>;

    /// Insert `booking` unless its user already has `cap.limit` bookings that
    /// `cap` counts. Counting and inserting are one atomic step per user;
    /// returns `false` without inserting when the cap is reached.
    async fn create_within_cap(&self, booking: &Booking, cap: &DailyCap) -> Result<bool, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Booking>, StoreError>;

    /// Replace the record only if its stored version equals `expected_version`.
    /// The stored version is incremented on success.
    async fn replace(&self, booking: &Booking, expected_version: i64) -> Result<(), StoreError>;

    /// Matching bookings, newest booking date first
    async fn search(&self, criteria: &BookingSearch) -> Result<Vec<Booking>, StoreError>;
}

/// Non-authoritative key/value cache for display reads
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Deleting a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}
