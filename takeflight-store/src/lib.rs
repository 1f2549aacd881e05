pub mod app_config;
pub mod booking_repo;
pub mod database;
pub mod flight_repo;
pub mod redis_repo;

pub use booking_repo::PostgresBookingStore;
pub use database::DbClient;
pub use flight_repo::PostgresInventoryStore;
pub use redis_repo::RedisCache;

use takeflight_core::StoreError;

pub(crate) fn backend(e: sqlx::Error) -> StoreError {
    StoreError::Backend(e.to_string())
}
