use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;
use std::str::FromStr;

/// Operational status of a flight
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FlightStatus {
    Scheduled,
    Delayed,
    Cancelled,
    Completed,
}

impl FlightStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlightStatus::Scheduled => "scheduled",
            FlightStatus::Delayed => "delayed",
            FlightStatus::Cancelled => "cancelled",
            FlightStatus::Completed => "completed",
        }
    }

    /// Terminal flights accept no new reservations.
    pub fn is_terminal(&self) -> bool {
        matches!(self, FlightStatus::Cancelled | FlightStatus::Completed)
    }
}

impl fmt::Display for FlightStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FlightStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "scheduled" => Ok(FlightStatus::Scheduled),
            "delayed" => Ok(FlightStatus::Delayed),
            "cancelled" => Ok(FlightStatus::Cancelled),
            "completed" => Ok(FlightStatus::Completed),
            other => Err(format!("unknown flight status: {}", other)),
        }
    }
}

/// Authoritative flight record, including the seat counters.
///
/// `available_seats` is only ever changed by the inventory store's
/// conditional adjustment; everything else treats it as read-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Flight {
    pub id: Uuid,
    pub flight_number: String,
    pub airline: String,
    pub departure_city: String,
    pub arrival_city: String,
    pub departure_time: DateTime<Utc>,
    pub arrival_time: DateTime<Utc>,
    pub price_amount: i64,
    pub price_currency: String,
    pub total_seats: i32,
    pub available_seats: i32,
    pub status: FlightStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Flight {
    /// Build a freshly scheduled flight with every seat available
    pub fn new(details: NewFlight) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            flight_number: details.flight_number,
            airline: details.airline,
            departure_city: details.departure_city,
            arrival_city: details.arrival_city,
            departure_time: details.departure_time,
            arrival_time: details.arrival_time,
            price_amount: details.price_amount,
            price_currency: details.price_currency,
            total_seats: details.total_seats,
            available_seats: details.total_seats,
            status: FlightStatus::Scheduled,
            created_at: now,
            updated_at: now,
        }
    }

    /// Seats currently consumed by bookings
    pub fn consumed_seats(&self) -> i32 {
        self.total_seats - self.available_seats
    }

    /// Formatted block time, e.g. "2h 35m"
    pub fn duration(&self) -> String {
        let minutes = (self.arrival_time - self.departure_time).num_minutes();
        format!("{}h {}m", minutes / 60, minutes % 60)
    }

    pub fn is_bookable(&self, now: DateTime<Utc>) -> bool {
        !self.status.is_terminal() && self.available_seats > 0 && self.departure_time > now
    }
}

/// Admin input for scheduling a new flight
#[derive(Debug, Clone, Deserialize)]
pub struct NewFlight {
    pub flight_number: String,
    pub airline: String,
    pub departure_city: String,
    pub arrival_city: String,
    pub departure_time: DateTime<Utc>,
    pub arrival_time: DateTime<Utc>,
    pub price_amount: i64,
    pub price_currency: String,
    pub total_seats: i32,
}

/// Partial admin update. Seat counts are deliberately absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FlightUpdate {
    pub departure_time: Option<DateTime<Utc>>,
    pub arrival_time: Option<DateTime<Utc>>,
    pub price_amount: Option<i64>,
    pub status: Option<FlightStatus>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FlightSearch {
    pub departure_city: String,
    pub arrival_city: String,
    pub departure_date: NaiveDate,
    pub passengers: i32,
}

impl FlightSearch {
    pub fn matches(&self, flight: &Flight) -> bool {
        flight.departure_city.eq_ignore_ascii_case(&self.departure_city)
            && flight.arrival_city.eq_ignore_ascii_case(&self.arrival_city)
            && flight.departure_time.date_naive() == self.departure_date
            && !flight.status.is_terminal()
            && flight.available_seats >= self.passengers
    }
}

/// Outcome of a conditional seat adjustment evaluated by the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeatAdjustment {
    Applied { available_seats: i32 },
    Insufficient { available_seats: i32 },
    Overflow { available_seats: i32, total_seats: i32 },
    Closed(FlightStatus),
    NotFound,
}
