use anyhow::{bail, Context};
use std::sync::Arc;
use takeflight_booking::InventoryReconciler;
use takeflight_core::{CacheCoherence, CacheKey};
use takeflight_store::app_config::Config;
use takeflight_store::{DbClient, PostgresBookingStore, PostgresInventoryStore, RedisCache};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Audit seat counters against bookings.
///
/// With no arguments every flight is checked; otherwise only the flight ids
/// given. Reports are printed as JSON lines and the process fails if any
/// flight has drifted.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "takeflight=info,takeflight_store=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let flight_ids = std::env::args()
        .skip(1)
        .map(|arg| Uuid::parse_str(&arg).with_context(|| format!("invalid flight id: {}", arg)))
        .collect::<anyhow::Result<Vec<Uuid>>>()?;

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting reconciliation");

    let db = DbClient::new(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;

    let redis = RedisCache::new(&config.redis.url)
        .await
        .context("Failed to connect to Redis")?;
    let cache = CacheCoherence::new(Arc::new(redis));

    let rules = db
        .fetch_booking_rules(config.booking_rules.clone())
        .await
        .context("Failed to load booking rules")?;
    if rules.accepting_bookings() {
        // In-flight bookings hold seats briefly before their record lands.
        tracing::warn!("Bookings are open; a flight with requests in flight may show transient drift");
    }

    let reconciler = InventoryReconciler::new(
        Arc::new(PostgresInventoryStore::new(db.pool.clone())),
        Arc::new(PostgresBookingStore::new(db.pool.clone())),
    );

    let reports = if flight_ids.is_empty() {
        reconciler.reconcile_all().await?
    } else {
        let mut reports = Vec::with_capacity(flight_ids.len());
        for id in flight_ids {
            reports.push(reconciler.reconcile_flight(id).await?);
        }
        reports
    };

    for report in &reports {
        println!("{}", serde_json::to_string(report)?);
    }

    let drifting: Vec<_> = reports.iter().filter(|r| !r.is_consistent()).collect();
    for report in &drifting {
        // Readers of a drifting flight go straight to the store.
        cache.invalidate_after_write(&CacheKey::flight(report.flight_id)).await;
    }
    if !drifting.is_empty() {
        bail!("{} of {} flights have seat drift", drifting.len(), reports.len());
    }
    tracing::info!("All {} flights consistent", reports.len());
    Ok(())
}
