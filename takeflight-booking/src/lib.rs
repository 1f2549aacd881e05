pub mod catalog;
pub mod lifecycle;
pub mod memory;
pub mod orchestrator;
pub mod reconcile;

pub use catalog::FlightCatalog;
pub use lifecycle::{BookingLifecycle, TransitionPlan};
pub use memory::MemoryBookingStore;
pub use orchestrator::BookingOrchestrator;
pub use reconcile::{InventoryReconciler, ReconciliationReport};
