pub mod booking;
pub mod cache;
pub mod error;
pub mod flight;
pub mod repository;
pub mod rules;

pub use booking::{Booking, BookingSearch, BookingStatus, BookingSummary, BookingUpdate, DailyCap, PaymentStatus};
pub use cache::{CacheCoherence, CacheKey, MemoryCache, ReadPolicy, ReadStrategy};
pub use error::{BookingError, BookingResult, CacheError, ErrorKind, StoreError};
pub use flight::{Flight, FlightSearch, FlightStatus, FlightUpdate, NewFlight, SeatAdjustment};
pub use repository::{BookingStore, Cache, InventoryStore};
pub use rules::BookingRules;
