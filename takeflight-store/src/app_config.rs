use serde::Deserialize;
use std::env;
use takeflight_core::{BookingRules, ReadPolicy};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub booking_rules: BookingRules,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

/// Read policies for the display paths
#[derive(Debug, Deserialize, Clone, Default)]
pub struct CacheConfig {
    #[serde(default)]
    pub flight: ReadPolicy,
    #[serde(default)]
    pub booking: ReadPolicy,
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Developer overrides, never checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `TAKEFLIGHT__DATABASE__URL=postgres://...`
            .add_source(config::Environment::with_prefix("TAKEFLIGHT").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{File, FileFormat};
    use takeflight_core::ReadStrategy;

    fn parse(toml: &str) -> Config {
        config::Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let cfg = parse(
            r#"
            [database]
            url = "postgres://localhost/takeflight"

            [redis]
            url = "redis://127.0.0.1/"
            "#,
        );
        assert_eq!(cfg.database.max_connections, 5);
        assert_eq!(cfg.cache.flight, ReadPolicy::default());
        assert_eq!(cfg.booking_rules, BookingRules::default());
    }

    #[test]
    fn test_full_config() {
        let cfg = parse(
            r#"
            [database]
            url = "postgres://db/takeflight"
            max_connections = 20

            [redis]
            url = "redis://cache/"

            [cache.flight]
            strategy = "sliding"
            ttl_seconds = 60

            [cache.booking]
            strategy = "write_through"
            ttl_seconds = 30

            [booking_rules]
            maintenance_mode = true
            max_passengers_per_booking = 6
            max_bookings_per_user_per_day = 3
            "#,
        );
        assert_eq!(cfg.database.max_connections, 20);
        assert_eq!(cfg.cache.flight.strategy, ReadStrategy::Sliding);
        assert_eq!(cfg.cache.booking.strategy, ReadStrategy::WriteThrough);
        assert_eq!(cfg.cache.booking.ttl_seconds, 30);
        assert!(cfg.booking_rules.booking_enabled);
        assert!(!cfg.booking_rules.accepting_bookings());
        assert_eq!(cfg.booking_rules.max_passengers_per_booking, 6);
        assert_eq!(cfg.booking_rules.max_bookings_per_user_per_day, Some(3));
    }
}
