pub mod engine;
pub mod memory;

pub use engine::{SeatEffect, SeatReservationEngine};
pub use memory::MemoryInventoryStore;
