use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::{info, warn};
use takeflight_core::BookingRules;

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

#[derive(sqlx::FromRow)]
struct RuleRow {
    rule_key: String,
    rule_value: Value,
}

impl DbClient {
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations").run(&self.pool).await?;
        info!("Migrations completed successfully.");
        Ok(())
    }

    /// Layer admin overrides from `business_rules` over the configured rules
    pub async fn fetch_booking_rules(&self, defaults: BookingRules) -> Result<BookingRules, sqlx::Error> {
        let rows = sqlx::query_as::<_, RuleRow>("SELECT rule_key, rule_value FROM business_rules")
            .fetch_all(&self.pool)
            .await?;

        let mut rules = defaults;
        for row in rows {
            // Expected format: {"value": <bool/number/null>}
            match row.rule_value.get("value") {
                Some(v) => apply_rule(&mut rules, &row.rule_key, v),
                None => warn!("Ignoring malformed business rule {}", row.rule_key),
            }
        }
        Ok(rules)
    }
}

fn apply_rule(rules: &mut BookingRules, key: &str, value: &Value) {
    match key {
        "booking_enabled" => {
            if let Some(b) = value.as_bool() {
                rules.booking_enabled = b;
            }
        }
        "maintenance_mode" => {
            if let Some(b) = value.as_bool() {
                rules.maintenance_mode = b;
            }
        }
        "max_passengers_per_booking" => {
            if let Some(n) = value.as_i64().and_then(|n| i32::try_from(n).ok()) {
                rules.max_passengers_per_booking = n;
            }
        }
        "max_bookings_per_user_per_day" => {
            if value.is_null() {
                rules.max_bookings_per_user_per_day = None;
            } else if let Some(n) = value.as_u64().and_then(|n| u32::try_from(n).ok()) {
                rules.max_bookings_per_user_per_day = Some(n);
            }
        }
        _ => {}
    }
}
