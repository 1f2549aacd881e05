use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;
use takeflight_core::{Booking, BookingSearch, BookingStore, DailyCap, StoreError};

/// In-memory booking store with optimistic versioning on replace
#[derive(Default)]
pub struct MemoryBookingStore {
    bookings: Mutex<HashMap<Uuid, Booking>>,
}

impl MemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.bookings.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.bookings.lock().await.is_empty()
    }
}

#[async_trait]
impl BookingStore for MemoryBookingStore {
    async fn create(&self, booking: &Booking) -> Result<(), StoreError> {
        let mut bookings = self.bookings.lock().await;
        if bookings.contains_key(&booking.id) {
            return Err(StoreError::Duplicate(booking.id));
        }
        bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn create_within_cap(&self, booking: &Booking, cap: &DailyCap) -> Result<bool, StoreError> {
        let mut bookings = self.bookings.lock().await;
        if bookings.contains_key(&booking.id) {
            return Err(StoreError::Duplicate(booking.id));
        }
        let taken = bookings.values().filter(|b| cap.counts(&booking.user_id, b)).count();
        if taken >= cap.limit as usize {
            return Ok(false);
        }
        bookings.insert(booking.id, booking.clone());
        Ok(true)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        Ok(self.bookings.lock().await.get(&id).cloned())
    }

    async fn replace(&self, booking: &Booking, expected_version: i64) -> Result<(), StoreError> {
        let mut bookings = self.bookings.lock().await;
        let stored = bookings.get_mut(&booking.id).ok_or(StoreError::Missing(booking.id))?;
        if stored.version != expected_version {
            return Err(StoreError::VersionConflict { id: booking.id, expected: expected_version });
        }
        *stored = booking.clone();
        stored.version = expected_version + 1;
        Ok(())
    }

    async fn search(&self, criteria: &BookingSearch) -> Result<Vec<Booking>, StoreError> {
        let bookings = self.bookings.lock().await;
        let mut matches: Vec<Booking> = bookings.values().filter(|b| criteria.matches(b)).cloned().collect();
        matches.sort_by(|a, b| b.booking_date.cmp(&a.booking_date));
        Ok(matches)
    }
}
