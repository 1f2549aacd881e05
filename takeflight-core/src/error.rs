use uuid::Uuid;
use crate::booking::BookingStatus;

/// Failure reported by an authoritative store adapter
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store backend failure: {0}")]
    Backend(String),

    #[error("Record already exists: {0}")]
    Duplicate(Uuid),

    #[error("Record not found: {0}")]
    Missing(Uuid),

    #[error("Version conflict on {id}: expected {expected}")]
    VersionConflict {
        id: Uuid,
        expected: i64,
    },

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache backend failure: {0}")]
    Backend(String),

    #[error("Cache serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Coarse classification used by callers to branch without string matching
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Capacity,
    Conflict,
    Consistency,
    Infrastructure,
}

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Booking not found: {0}")]
    BookingNotFound(Uuid),

    #[error("Flight unavailable: {0}")]
    FlightUnavailable(Uuid),

    #[error("Bookings are currently disabled")]
    BookingsDisabled,

    #[error("Insufficient inventory on {flight_id}: requested {requested}, available {available}")]
    InsufficientInventory {
        flight_id: Uuid,
        requested: i32,
        available: i32,
    },

    #[error("Booking {0} was modified concurrently")]
    ConcurrentModification(Uuid),

    #[error("Inventory overflow on {flight_id}: releasing {released} onto {available} of {total}")]
    InventoryOverflow {
        flight_id: Uuid,
        released: i32,
        available: i32,
        total: i32,
    },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidTransition {
        from: BookingStatus,
        to: String,
    },

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BookingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            BookingError::Validation(_)
            | BookingError::BookingNotFound(_)
            | BookingError::FlightUnavailable(_)
            | BookingError::BookingsDisabled => ErrorKind::Validation,
            BookingError::InsufficientInventory { .. } => ErrorKind::Capacity,
            BookingError::ConcurrentModification(_) => ErrorKind::Conflict,
            BookingError::InventoryOverflow { .. } | BookingError::InvalidTransition { .. } => {
                ErrorKind::Consistency
            }
            BookingError::Store(_) | BookingError::Internal(_) => ErrorKind::Infrastructure,
        }
    }

    /// Message safe to show an end user; no operational detail leaks out
    pub fn public_message(&self) -> String {
        match self.kind() {
            ErrorKind::Capacity => "Not enough seats available".to_string(),
            ErrorKind::Consistency | ErrorKind::Infrastructure => "Internal error".to_string(),
            ErrorKind::Validation | ErrorKind::Conflict => self.to_string(),
        }
    }
}

pub type BookingResult<T> = Result<T, BookingError>;
