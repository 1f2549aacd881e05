use chrono::{TimeZone, Utc};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, warn};
use uuid::Uuid;
use takeflight_core::{
    Booking, BookingError, BookingResult, BookingRules, BookingSearch, BookingStatus, BookingStore,
    BookingSummary, BookingUpdate, CacheCoherence, CacheKey, DailyCap, ErrorKind, InventoryStore, ReadPolicy, StoreError,
};
use takeflight_inventory::{SeatEffect, SeatReservationEngine};
use crate::lifecycle::BookingLifecycle;

/// Create, update, cancel and search bookings while keeping every booking's
/// passenger count equal to the seats it holds on its flight.
///
/// Each mutation is a small saga over the seat counter and the booking record.
/// Seats move first and the booking is written second; if the write fails the
/// seat effect is undone, so the two never disagree once a call returns. That
/// section runs on its own task so a caller that goes away mid-request cannot
/// leave a hold without a booking.
///
/// No lock is held across a store call. Racing writers of one booking are
/// told apart by the booking version, and the slower one's seat effect is
/// compensated.
#[derive(Clone)]
pub struct BookingOrchestrator {
    inventory: Arc<dyn InventoryStore>,
    bookings: Arc<dyn BookingStore>,
    engine: SeatReservationEngine,
    cache: CacheCoherence,
    rules: Arc<RwLock<BookingRules>>,
}

impl BookingOrchestrator {
    pub fn new(
        inventory: Arc<dyn InventoryStore>,
        bookings: Arc<dyn BookingStore>,
        cache: CacheCoherence,
        rules: BookingRules,
    ) -> Self {
        let engine = SeatReservationEngine::new(inventory.clone(), cache.clone());
        Self {
            inventory,
            bookings,
            engine,
            cache,
            rules: Arc::new(RwLock::new(rules)),
        }
    }

    pub async fn rules(&self) -> BookingRules {
        self.rules.read().await.clone()
    }

    /// Swap in new admin rules; applies to requests that start afterwards
    pub async fn update_rules(&self, rules: BookingRules) {
        info!("Booking rules updated: {:?}", rules);
        *self.rules.write().await = rules;
    }

    pub async fn create_booking(&self, user_id: &str, flight_id: Uuid, passengers: i32) -> BookingResult<Booking> {
        // 1. Validate request against admin rules
        if user_id.trim().is_empty() {
            return Err(BookingError::Validation("user id is required".to_string()));
        }
        let plan = BookingLifecycle::create(passengers)?;
        let rules = self.rules().await;
        if !rules.accepting_bookings() {
            return Err(BookingError::BookingsDisabled);
        }
        if passengers > rules.max_passengers_per_booking {
            return Err(BookingError::Validation(format!(
                "at most {} passengers per booking",
                rules.max_passengers_per_booking
            )));
        }
        // Early rejection only; the store enforces the cap atomically on insert.
        let daily_cap = match rules.max_bookings_per_user_per_day {
            Some(cap) => Some(self.check_daily_cap(user_id, cap).await?),
            None => None,
        };

        // 2. Authoritative flight read for status and fare
        let flight = self
            .inventory
            .get_flight(flight_id)
            .await?
            .ok_or(BookingError::FlightUnavailable(flight_id))?;
        if flight.status.is_terminal() {
            return Err(BookingError::FlightUnavailable(flight_id));
        }

        let mut booking = Booking::new(
            user_id.to_string(),
            flight_id,
            passengers,
            total_price(passengers, flight.price_amount)?,
            flight.price_currency.clone(),
        );
        booking.status = plan.next;

        // 3. Reserve, persist, compensate on failure
        let this = self.clone();
        let effect = plan.seat_effect;
        let booking = run_detached(async move { this.commit_new(booking, effect, daily_cap).await }).await?;

        info!(
            "Booking created: {} user={} flight={} passengers={}",
            booking.id, booking.user_id, booking.flight_id, booking.passengers
        );
        Ok(booking)
    }

    pub async fn update_booking(&self, booking_id: Uuid, update: BookingUpdate) -> BookingResult<Booking> {
        let booking = self.load(booking_id).await?;

        if update.status == Some(BookingStatus::Cancelled) {
            let resizing = update.passengers.is_some_and(|p| p != booking.passengers);
            if resizing || update.payment_status.is_some() {
                return Err(BookingError::Validation(
                    "cancellation cannot be combined with other changes".to_string(),
                ));
            }
            return self.cancel_booking(booking_id).await;
        }

        if update.status.is_none() && update.passengers.is_none() && update.payment_status.is_none() {
            return Ok(booking);
        }
        if booking.status.is_terminal() {
            return Err(unexpected(BookingError::InvalidTransition {
                from: booking.status,
                to: "update".to_string(),
            }));
        }

        let mut next = booking.clone();
        let mut effect = SeatEffect::None;

        // 1. Passenger delta, priced at the flight's current fare
        if let Some(passengers) = update.passengers {
            if let Some(change) = BookingLifecycle::change_passengers(&booking, passengers).map_err(unexpected)? {
                let rules = self.rules().await;
                if passengers > rules.max_passengers_per_booking {
                    return Err(BookingError::Validation(format!(
                        "at most {} passengers per booking",
                        rules.max_passengers_per_booking
                    )));
                }
                let flight = self
                    .inventory
                    .get_flight(booking.flight_id)
                    .await?
                    .ok_or(BookingError::FlightUnavailable(booking.flight_id))?;
                next.passengers = passengers;
                next.total_price_amount = total_price(passengers, flight.price_amount)?;
                next.total_price_currency = flight.price_currency.clone();
                effect = change;
            }
        }

        // 2. Status transition
        if let Some(status) = update.status {
            if let Some(plan) = BookingLifecycle::transition(&booking, status).map_err(unexpected)? {
                if plan.seat_effect != SeatEffect::None {
                    if effect != SeatEffect::None {
                        return Err(BookingError::Validation(
                            "status change and passenger change both move seats".to_string(),
                        ));
                    }
                    effect = plan.seat_effect;
                }
                next.status = plan.next;
            }
        }

        // 3. Payment bookkeeping
        if let Some(payment_status) = update.payment_status {
            next.payment_status = payment_status;
        }

        if next == booking {
            return Ok(booking);
        }
        next.touch();

        let this = self.clone();
        let expected_version = booking.version;
        let updated =
            run_detached(async move { this.commit_replace(next, expected_version, effect).await }).await?;

        info!(
            "Booking updated: {} status={} passengers={} total={}",
            updated.id, updated.status, updated.passengers, updated.total_price_amount
        );
        Ok(updated)
    }

    /// Release every held seat and mark the booking cancelled.
    /// Cancelling an already cancelled booking succeeds without side effects.
    pub async fn cancel_booking(&self, booking_id: Uuid) -> BookingResult<Booking> {
        let booking = self.load(booking_id).await?;

        let plan = match BookingLifecycle::transition(&booking, BookingStatus::Cancelled).map_err(unexpected)? {
            Some(plan) => plan,
            None => {
                info!("Booking {} already cancelled", booking_id);
                return Ok(booking);
            }
        };

        let mut next = booking.clone();
        next.status = plan.next;
        next.touch();

        let this = self.clone();
        let effect = plan.seat_effect;
        let expected_version = booking.version;
        let result =
            run_detached(async move { this.commit_replace(next, expected_version, effect).await }).await;

        match result {
            Ok(cancelled) => {
                info!("Booking cancelled: {} released={} flight={}", cancelled.id, cancelled.passengers, cancelled.flight_id);
                Ok(cancelled)
            }
            // Lost a race: another writer changed the record or already gave
            // the seats back. Only a stored cancellation makes this a repeat.
            Err(err @ (BookingError::ConcurrentModification(_) | BookingError::InventoryOverflow { .. })) => {
                match self.bookings.find_by_id(booking_id).await? {
                    Some(current) if current.status == BookingStatus::Cancelled => {
                        info!("Booking {} was cancelled concurrently", booking_id);
                        Ok(current)
                    }
                    _ => Err(err),
                }
            }
            Err(err) => Err(err),
        }
    }

    pub async fn search_bookings(&self, criteria: &BookingSearch) -> BookingResult<Vec<BookingSummary>> {
        if let (Some(start), Some(end)) = (criteria.start_date, criteria.end_date) {
            if end < start {
                return Err(BookingError::Validation("invalid date range".to_string()));
            }
        }
        let bookings = self.bookings.search(criteria).await?;
        Ok(bookings.iter().map(Booking::to_summary).collect())
    }

    /// Display read; served through the cache according to `policy`
    pub async fn get_booking(&self, booking_id: Uuid, policy: ReadPolicy) -> BookingResult<Booking> {
        let bookings = self.bookings.clone();
        self.cache
            .read(&CacheKey::booking(booking_id), policy, || async move {
                let booking = bookings.find_by_id(booking_id).await?;
                booking.ok_or(BookingError::BookingNotFound(booking_id))
            })
            .await
    }

    async fn load(&self, booking_id: Uuid) -> BookingResult<Booking> {
        self.bookings
            .find_by_id(booking_id)
            .await?
            .ok_or(BookingError::BookingNotFound(booking_id))
    }

    /// Today's cap for `user_id`, rejected up front if it is already used up
    async fn check_daily_cap(&self, user_id: &str, limit: u32) -> BookingResult<DailyCap> {
        let midnight = Utc::now()
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .ok_or_else(|| BookingError::Internal("could not compute start of day".to_string()))?;
        let cap = DailyCap { since: Utc.from_utc_datetime(&midnight), limit };
        let criteria = BookingSearch {
            user_id: Some(user_id.to_string()),
            start_date: Some(cap.since),
            ..BookingSearch::default()
        };
        let today = self
            .bookings
            .search(&criteria)
            .await?
            .iter()
            .filter(|b| cap.counts(user_id, b))
            .count();
        if today >= limit as usize {
            return Err(daily_cap_reached(limit));
        }
        Ok(cap)
    }

    async fn commit_new(&self, booking: Booking, effect: SeatEffect, cap: Option<DailyCap>) -> BookingResult<Booking> {
        self.engine.apply(booking.flight_id, effect).await?;

        let created = match &cap {
            Some(cap) => self.bookings.create_within_cap(&booking, cap).await,
            None => self.bookings.create(&booking).await.map(|()| true),
        };
        match created {
            Ok(true) => {}
            Ok(false) => {
                info!("Daily cap reached for user {} during booking, releasing seats", booking.user_id);
                self.compensate(booking.flight_id, effect).await;
                return Err(daily_cap_reached(cap.map_or(0, |c| c.limit)));
            }
            Err(e) => {
                error!("Failed to persist booking {}, releasing its seats: {}", booking.id, e);
                self.compensate(booking.flight_id, effect).await;
                return Err(e.into());
            }
        }

        self.cache.invalidate_after_write(&CacheKey::booking(booking.id)).await;
        Ok(booking)
    }

    /// Move seats, then replace the stored booking if it is still at
    /// `expected_version`. A failed or conflicting write undoes the seat effect.
    /// The engine invalidates the flight entry when seats move.
    async fn commit_replace(&self, next: Booking, expected_version: i64, effect: SeatEffect) -> BookingResult<Booking> {
        self.engine.apply(next.flight_id, effect).await?;

        if let Err(e) = self.bookings.replace(&next, expected_version).await {
            warn!("Failed to persist booking {}: {}", next.id, e);
            self.compensate(next.flight_id, effect).await;
            return Err(match e {
                StoreError::VersionConflict { id, .. } => BookingError::ConcurrentModification(id),
                other => BookingError::Store(other),
            });
        }

        self.cache.invalidate_after_write(&CacheKey::booking(next.id)).await;
        let mut stored = next;
        stored.version = expected_version + 1;
        Ok(stored)
    }

    /// Undo a seat effect that was applied before a later step failed
    async fn compensate(&self, flight_id: Uuid, applied: SeatEffect) {
        let inverse = applied.inverse();
        if inverse == SeatEffect::None {
            return;
        }
        match self.engine.apply(flight_id, inverse).await {
            Ok(available) => warn!(
                "Compensated {:?} on flight {} (available now {:?})",
                applied, flight_id, available
            ),
            Err(e) => error!(
                "Compensation {:?} failed on flight {}, inventory needs reconciliation: {}",
                inverse, flight_id, e
            ),
        }
    }
}

/// Run a saga section on its own task so it completes even if the caller's
/// future is dropped.
async fn run_detached<T, F>(task: F) -> BookingResult<T>
where
    T: Send + 'static,
    F: Future<Output = BookingResult<T>> + Send + 'static,
{
    match tokio::spawn(task).await {
        Ok(result) => result,
        Err(e) => {
            error!("Booking task aborted: {}", e);
            Err(BookingError::Internal("booking task aborted".to_string()))
        }
    }
}

fn daily_cap_reached(limit: u32) -> BookingError {
    BookingError::Validation(format!("daily limit of {} bookings reached", limit))
}

fn total_price(passengers: i32, unit_price: i64) -> BookingResult<i64> {
    i64::from(passengers)
        .checked_mul(unit_price)
        .ok_or_else(|| BookingError::Validation("total price out of range".to_string()))
}

fn unexpected(err: BookingError) -> BookingError {
    if err.kind() == ErrorKind::Consistency {
        error!("Unexpected booking state change: {}", err);
    }
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use takeflight_core::{Flight, MemoryCache, NewFlight, PaymentStatus, ReadStrategy};
    use takeflight_inventory::MemoryInventoryStore;
    use crate::memory::MemoryBookingStore;

    struct Harness {
        inventory: Arc<MemoryInventoryStore>,
        bookings: Arc<MemoryBookingStore>,
        orchestrator: BookingOrchestrator,
    }

    async fn harness(rules: BookingRules) -> (Harness, Flight) {
        let inventory = Arc::new(MemoryInventoryStore::new());
        let bookings = Arc::new(MemoryBookingStore::new());
        let cache = CacheCoherence::new(Arc::new(MemoryCache::new()));
        let departure = Utc::now() + Duration::days(10);
        let flight = Flight::new(NewFlight {
            flight_number: "TF404".to_string(),
            airline: "Take Flight".to_string(),
            departure_city: "Nairobi".to_string(),
            arrival_city: "Kigali".to_string(),
            departure_time: departure,
            arrival_time: departure + Duration::minutes(80),
            price_amount: 20_000,
            price_currency: "USD".to_string(),
            total_seats: 10,
        });
        inventory.save_flight(&flight).await.unwrap();
        let orchestrator = BookingOrchestrator::new(inventory.clone(), bookings.clone(), cache, rules);
        (Harness { inventory, bookings, orchestrator }, flight)
    }

    #[tokio::test]
    async fn test_create_prices_and_reserves() {
        let (h, flight) = harness(BookingRules::default()).await;

        let booking = h.orchestrator.create_booking("alice", flight.id, 3).await.unwrap();
        assert_eq!(booking.status, BookingStatus::Pending);
        assert_eq!(booking.total_price_amount, 60_000);
        assert_eq!(booking.payment_status, PaymentStatus::Pending);
        assert_eq!(h.inventory.get_flight(flight.id).await.unwrap().unwrap().available_seats, 7);
    }

    #[tokio::test]
    async fn test_rejected_requests_leave_inventory_alone() {
        let (h, flight) = harness(BookingRules::default()).await;

        assert!(matches!(h.orchestrator.create_booking("", flight.id, 1).await, Err(BookingError::Validation(_))));
        assert!(matches!(h.orchestrator.create_booking("bob", flight.id, 0).await, Err(BookingError::Validation(_))));
        assert!(matches!(h.orchestrator.create_booking("bob", flight.id, 10).await, Err(BookingError::Validation(_))));
        assert!(matches!(
            h.orchestrator.create_booking("bob", Uuid::new_v4(), 1).await,
            Err(BookingError::FlightUnavailable(_))
        ));

        assert_eq!(h.inventory.get_flight(flight.id).await.unwrap().unwrap().available_seats, 10);
        assert!(h.bookings.is_empty().await);
    }

    #[tokio::test]
    async fn test_disabled_bookings() {
        let (h, flight) = harness(BookingRules::default()).await;
        h.orchestrator
            .update_rules(BookingRules { maintenance_mode: true, ..BookingRules::default() })
            .await;

        let err = h.orchestrator.create_booking("carol", flight.id, 1).await.unwrap_err();
        assert!(matches!(err, BookingError::BookingsDisabled));
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_daily_cap_ignores_cancelled_bookings() {
        let rules = BookingRules { max_bookings_per_user_per_day: Some(2), ..BookingRules::default() };
        let (h, flight) = harness(rules).await;

        let first = h.orchestrator.create_booking("dave", flight.id, 1).await.unwrap();
        h.orchestrator.create_booking("dave", flight.id, 1).await.unwrap();
        assert!(matches!(
            h.orchestrator.create_booking("dave", flight.id, 1).await,
            Err(BookingError::Validation(_))
        ));

        h.orchestrator.cancel_booking(first.id).await.unwrap();
        h.orchestrator.create_booking("dave", flight.id, 1).await.unwrap();
        // Other users are unaffected.
        h.orchestrator.create_booking("erin", flight.id, 1).await.unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_flight_rejects_new_bookings() {
        let (h, mut flight) = harness(BookingRules::default()).await;
        flight.status = takeflight_core::FlightStatus::Cancelled;
        h.inventory.save_flight(&flight).await.unwrap();

        assert!(matches!(
            h.orchestrator.create_booking("frank", flight.id, 1).await,
            Err(BookingError::FlightUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_status_updates_follow_lifecycle() {
        let (h, flight) = harness(BookingRules::default()).await;
        let booking = h.orchestrator.create_booking("gina", flight.id, 2).await.unwrap();

        let confirmed = h
            .orchestrator
            .update_booking(booking.id, BookingUpdate { status: Some(BookingStatus::Confirmed), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(confirmed.status, BookingStatus::Confirmed);
        assert_eq!(confirmed.version, 1);

        let err = h
            .orchestrator
            .update_booking(booking.id, BookingUpdate { status: Some(BookingStatus::Pending), ..Default::default() })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Consistency);
        assert_eq!(err.public_message(), "Internal error");

        let completed = h
            .orchestrator
            .update_booking(booking.id, BookingUpdate { status: Some(BookingStatus::Completed), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(completed.status, BookingStatus::Completed);
        // Completed bookings keep their seats.
        assert_eq!(h.inventory.get_flight(flight.id).await.unwrap().unwrap().available_seats, 8);

        let err = h
            .orchestrator
            .update_booking(booking.id, BookingUpdate { passengers: Some(1), ..Default::default() })
            .await
            .unwrap_err();
        assert!(matches!(err, BookingError::InvalidTransition { .. }));
        assert!(matches!(h.orchestrator.cancel_booking(booking.id).await, Err(BookingError::InvalidTransition { .. })));
    }

    #[tokio::test]
    async fn test_update_via_cancel_status_is_idempotent_cancel() {
        let (h, flight) = harness(BookingRules::default()).await;
        let booking = h.orchestrator.create_booking("hank", flight.id, 4).await.unwrap();

        let resize_and_cancel = BookingUpdate {
            status: Some(BookingStatus::Cancelled),
            passengers: Some(2),
            ..Default::default()
        };
        assert!(matches!(
            h.orchestrator.update_booking(booking.id, resize_and_cancel).await,
            Err(BookingError::Validation(_))
        ));

        let cancel = BookingUpdate { status: Some(BookingStatus::Cancelled), ..Default::default() };
        let cancelled = h.orchestrator.update_booking(booking.id, cancel.clone()).await.unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        h.orchestrator.update_booking(booking.id, cancel).await.unwrap();
        assert_eq!(h.inventory.get_flight(flight.id).await.unwrap().unwrap().available_seats, 10);
    }

    #[tokio::test]
    async fn test_payment_status_update_moves_no_seats() {
        let (h, flight) = harness(BookingRules::default()).await;
        let booking = h.orchestrator.create_booking("iris", flight.id, 2).await.unwrap();

        let paid = h
            .orchestrator
            .update_booking(booking.id, BookingUpdate { payment_status: Some(PaymentStatus::Paid), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(paid.payment_status, PaymentStatus::Paid);
        assert_eq!(h.inventory.get_flight(flight.id).await.unwrap().unwrap().available_seats, 8);

        // Empty and no-op updates return the stored booking untouched.
        let same = h.orchestrator.update_booking(booking.id, BookingUpdate::default()).await.unwrap();
        assert_eq!(same.version, paid.version);
        let same = h
            .orchestrator
            .update_booking(booking.id, BookingUpdate { passengers: Some(2), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(same.version, paid.version);
    }

    #[tokio::test]
    async fn test_get_booking_never_serves_pre_mutation_snapshot() {
        let (h, flight) = harness(BookingRules::default()).await;
        let booking = h.orchestrator.create_booking("jack", flight.id, 1).await.unwrap();
        let policy = ReadPolicy::new(ReadStrategy::CacheAside, std::time::Duration::from_secs(300));

        let cached = h.orchestrator.get_booking(booking.id, policy).await.unwrap();
        assert_eq!(cached.passengers, 1);

        h.orchestrator
            .update_booking(booking.id, BookingUpdate { passengers: Some(3), ..Default::default() })
            .await
            .unwrap();
        let fresh = h.orchestrator.get_booking(booking.id, policy).await.unwrap();
        assert_eq!(fresh.passengers, 3);

        h.orchestrator.cancel_booking(booking.id).await.unwrap();
        let fresh = h.orchestrator.get_booking(booking.id, policy).await.unwrap();
        assert_eq!(fresh.status, BookingStatus::Cancelled);

        assert!(matches!(
            h.orchestrator.get_booking(Uuid::new_v4(), policy).await,
            Err(BookingError::BookingNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_search_projection_and_range_validation() {
        let (h, flight) = harness(BookingRules::default()).await;
        h.orchestrator.create_booking("kim", flight.id, 1).await.unwrap();
        h.orchestrator.create_booking("lee", flight.id, 2).await.unwrap();

        let criteria = BookingSearch { user_id: Some("lee".to_string()), ..Default::default() };
        let found = h.orchestrator.search_bookings(&criteria).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].passengers, 2);
        assert_eq!(found[0].total_price_amount, 40_000);

        let now = Utc::now();
        let backwards = BookingSearch {
            start_date: Some(now),
            end_date: Some(now - Duration::days(1)),
            ..Default::default()
        };
        assert!(matches!(h.orchestrator.search_bookings(&backwards).await, Err(BookingError::Validation(_))));
        // Searching touched no seats.
        assert_eq!(h.inventory.get_flight(flight.id).await.unwrap().unwrap().available_seats, 7);
    }

    #[tokio::test]
    async fn test_failed_release_leaves_booking_untouched() {
        let (h, flight) = harness(BookingRules::default()).await;
        let booking = h.orchestrator.create_booking("nora", flight.id, 2).await.unwrap();
        // Seats went back out of band, so releasing them again overflows.
        h.inventory.overwrite_available_seats(flight.id, 10).await.unwrap();

        let err = h.orchestrator.cancel_booking(booking.id).await.unwrap_err();
        assert!(matches!(err, BookingError::InventoryOverflow { released: 2, .. }));

        let stored = h.bookings.find_by_id(booking.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BookingStatus::Pending);
        assert_eq!(stored.version, 0);
        assert_eq!(h.inventory.get_flight(flight.id).await.unwrap().unwrap().available_seats, 10);
    }

    #[tokio::test]
    async fn test_unknown_booking() {
        let (h, _) = harness(BookingRules::default()).await;
        let missing = Uuid::new_v4();
        assert!(matches!(h.orchestrator.cancel_booking(missing).await, Err(BookingError::BookingNotFound(_))));
        assert!(matches!(
            h.orchestrator.update_booking(missing, BookingUpdate::default()).await,
            Err(BookingError::BookingNotFound(_))
        ));
    }
}
