use serde::Deserialize;

/// Admin-controlled switches and caps applied when a booking is created
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct BookingRules {
    #[serde(default = "default_enabled")]
    pub booking_enabled: bool,
    #[serde(default)]
    pub maintenance_mode: bool,
    #[serde(default = "default_max_passengers")]
    pub max_passengers_per_booking: i32,
    /// Non-cancelled bookings a user may create per UTC day; `None` is unlimited.
    /// The booking store enforces it on insert, so concurrent creates cannot exceed it.
    pub max_bookings_per_user_per_day: Option<u32>,
}

fn default_enabled() -> bool { true }
fn default_max_passengers() -> i32 { 9 }

impl BookingRules {
    pub fn accepting_bookings(&self) -> bool {
        self.booking_enabled && !self.maintenance_mode
    }
}

impl Default for BookingRules {
    fn default() -> Self {
        Self {
            booking_enabled: true,
            maintenance_mode: false,
            max_passengers_per_booking: default_max_passengers(),
            max_bookings_per_user_per_day: None,
        }
    }
}
