use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;

/// Booking status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Cancelled,
    Completed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Cancelled | BookingStatus::Completed)
    }

    /// Whether a booking in this status still holds its seats
    pub fn holds_seats(&self) -> bool {
        !matches!(self, BookingStatus::Cancelled)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            "completed" => Ok(BookingStatus::Completed),
            other => Err(format!("unknown booking status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Refunded,
    Failed,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Refunded => "refunded",
            PaymentStatus::Failed => "failed",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            "refunded" => Ok(PaymentStatus::Refunded),
            "failed" => Ok(PaymentStatus::Failed),
            other => Err(format!("unknown payment status: {}", other)),
        }
    }
}

/// A user's booking on a single flight.
///
/// While the status holds seats, `passengers` seats are subtracted from the
/// flight's available count on this booking's behalf.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub id: Uuid,
    pub user_id: String,
    pub flight_id: Uuid,
    pub passengers: i32,
    pub status: BookingStatus,
    pub total_price_amount: i64,
    pub total_price_currency: String,
    pub payment_status: PaymentStatus,
    pub booking_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Bumped by the store on every successful replace
    pub version: i64,
}

impl Booking {
    pub fn new(
        user_id: String,
        flight_id: Uuid,
        passengers: i32,
        total_price_amount: i64,
        total_price_currency: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            flight_id,
            passengers,
            status: BookingStatus::Pending,
            total_price_amount,
            total_price_currency,
            payment_status: PaymentStatus::Pending,
            booking_date: now,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Seats this booking currently holds on its flight
    pub fn held_seats(&self) -> i32 {
        if self.status.holds_seats() {
            self.passengers
        } else {
            0
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn to_summary(&self) -> BookingSummary {
        BookingSummary {
            id: self.id,
            user_id: self.user_id.clone(),
            flight_id: self.flight_id,
            status: self.status,
            passengers: self.passengers,
            total_price_amount: self.total_price_amount,
            total_price_currency: self.total_price_currency.clone(),
            payment_status: self.payment_status,
            booking_date: self.booking_date,
        }
    }
}

/// Requested changes to an existing booking
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookingUpdate {
    pub status: Option<BookingStatus>,
    pub passengers: Option<i32>,
    pub payment_status: Option<PaymentStatus>,
}

/// Booking search filters; every field is optional
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BookingSearch {
    pub user_id: Option<String>,
    pub flight_id: Option<Uuid>,
    pub status: Option<BookingStatus>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl BookingSearch {
    pub fn for_flight(flight_id: Uuid) -> Self {
        Self {
            flight_id: Some(flight_id),
            ..Self::default()
        }
    }

    pub fn matches(&self, booking: &Booking) -> bool {
        if let Some(user_id) = &self.user_id {
            if &booking.user_id != user_id {
                return false;
            }
        }
        if let Some(flight_id) = self.flight_id {
            if booking.flight_id != flight_id {
                return false;
            }
        }
        if let Some(status) = self.status {
            if booking.status != status {
                return false;
            }
        }
        if let Some(start) = self.start_date {
            if booking.booking_date < start {
                return false;
            }
        }
        if let Some(end) = self.end_date {
            if booking.booking_date > end {
                return false;
            }
        }
        true
    }
}

/// Per-user limit on non-cancelled bookings dated at or after `since`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyCap {
    pub since: DateTime<Utc>,
    pub limit: u32,
}

impl DailyCap {
    /// Whether `existing` takes one of `user_id`'s slots
    pub fn counts(&self, user_id: &str, existing: &Booking) -> bool {
        existing.user_id == user_id
            && existing.status != BookingStatus::Cancelled
            && existing.booking_date >= self.since
    }
}

/// Read projection returned by searches
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookingSummary {
    pub id: Uuid,
    pub user_id: String,
    pub flight_id: Uuid,
    pub status: BookingStatus,
    pub passengers: i32,
    pub total_price_amount: i64,
    pub total_price_currency: String,
    pub payment_status: PaymentStatus,
    pub booking_date: DateTime<Utc>,
}
