use takeflight_core::{Booking, BookingError, BookingResult, BookingStatus};
use takeflight_inventory::SeatEffect;

/// Next status of a booking together with the seat change it requires
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionPlan {
    pub next: BookingStatus,
    pub seat_effect: SeatEffect,
}

/// Booking status rules. Pure: produces plans, never touches a store.
pub struct BookingLifecycle;

impl BookingLifecycle {
    /// (none) → Pending, holding one seat per passenger
    pub fn create(passengers: i32) -> BookingResult<TransitionPlan> {
        if passengers < 1 {
            return Err(BookingError::Validation(format!(
                "passenger count must be at least 1, got {}",
                passengers
            )));
        }
        Ok(TransitionPlan {
            next: BookingStatus::Pending,
            seat_effect: SeatEffect::Reserve(passengers),
        })
    }

    /// Plan a status change. `Ok(None)` means nothing needs to happen.
    pub fn transition(booking: &Booking, to: BookingStatus) -> BookingResult<Option<TransitionPlan>> {
        use BookingStatus::*;

        let from = booking.status;
        let seat_effect = match (from, to) {
            // Repeated cancellation is tolerated.
            (Cancelled, Cancelled) => return Ok(None),
            (Cancelled, _) | (Completed, _) => {
                return Err(BookingError::InvalidTransition { from, to: to.to_string() });
            }
            (a, b) if a == b => return Ok(None),
            (Pending, Confirmed) => SeatEffect::None,
            (Pending, Cancelled) | (Confirmed, Cancelled) => SeatEffect::Release(booking.passengers),
            (Pending, Completed) | (Confirmed, Completed) => SeatEffect::None,
            // Confirmed → Pending
            _ => {
                return Err(BookingError::InvalidTransition { from, to: to.to_string() });
            }
        };

        Ok(Some(TransitionPlan { next: to, seat_effect }))
    }

    /// Plan a passenger count change. `Ok(None)` when the count is unchanged.
    pub fn change_passengers(booking: &Booking, passengers: i32) -> BookingResult<Option<SeatEffect>> {
        if passengers < 1 {
            return Err(BookingError::Validation(format!(
                "passenger count must be at least 1, got {}",
                passengers
            )));
        }
        if booking.status.is_terminal() {
            return Err(BookingError::InvalidTransition {
                from: booking.status,
                to: format!("passengers={}", passengers),
            });
        }
        match SeatEffect::for_delta(booking.passengers, passengers) {
            SeatEffect::None => Ok(None),
            effect => Ok(Some(effect)),
        }
    }
}
