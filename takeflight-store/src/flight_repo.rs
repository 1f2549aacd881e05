use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::warn;
use uuid::Uuid;
use takeflight_core::{Flight, FlightSearch, FlightStatus, InventoryStore, SeatAdjustment, StoreError};
use crate::backend;

const FLIGHT_COLUMNS: &str = "id, flight_number, airline, departure_city, arrival_city, departure_time, arrival_time, \
     price_amount, price_currency, total_seats, available_seats, status, created_at, updated_at";

// A failed conditional update is re-diagnosed against a fresh read; a
// concurrent writer can make that read look admissible again.
const MAX_ADJUST_ATTEMPTS: usize = 3;

pub struct PostgresInventoryStore {
    pool: PgPool,
}

impl PostgresInventoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct FlightRow {
    id: Uuid,
    flight_number: String,
    airline: String,
    departure_city: String,
    arrival_city: String,
    departure_time: DateTime<Utc>,
    arrival_time: DateTime<Utc>,
    price_amount: i64,
    price_currency: String,
    total_seats: i32,
    available_seats: i32,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<FlightRow> for Flight {
    type Error = StoreError;

    fn try_from(row: FlightRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<FlightStatus>()
            .map_err(|e| StoreError::Corrupt(format!("flight {}: {}", row.id, e)))?;
        Ok(Flight {
            id: row.id,
            flight_number: row.flight_number,
            airline: row.airline,
            departure_city: row.departure_city,
            arrival_city: row.arrival_city,
            departure_time: row.departure_time,
            arrival_time: row.arrival_time,
            price_amount: row.price_amount,
            price_currency: row.price_currency,
            total_seats: row.total_seats,
            available_seats: row.available_seats,
            status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SeatRow {
    available_seats: i32,
    total_seats: i32,
    status: String,
}

/// Explain why the conditional update matched no row.
/// `None` means the bounds hold on this snapshot and the update should be retried.
fn diagnose(delta: i32, available_seats: i32, total_seats: i32, status: FlightStatus) -> Option<SeatAdjustment> {
    if delta > 0 && status.is_terminal() {
        return Some(SeatAdjustment::Closed(status));
    }
    let Some(next) = available_seats.checked_sub(delta) else {
        return Some(if delta > 0 {
            SeatAdjustment::Insufficient { available_seats }
        } else {
            SeatAdjustment::Overflow { available_seats, total_seats }
        });
    };
    if next < 0 {
        return Some(SeatAdjustment::Insufficient { available_seats });
    }
    if next > total_seats {
        return Some(SeatAdjustment::Overflow { available_seats, total_seats });
    }
    None
}

#[async_trait]
impl InventoryStore for PostgresInventoryStore {
    async fn get_flight(&self, id: Uuid) -> Result<Option<Flight>, StoreError> {
        let sql = format!("SELECT {} FROM flights WHERE id = $1", FLIGHT_COLUMNS);
        let row = sqlx::query_as::<_, FlightRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.map(Flight::try_from).transpose()
    }

    async fn adjust_seats(&self, id: Uuid, delta: i32) -> Result<SeatAdjustment, StoreError> {
        for _ in 0..MAX_ADJUST_ATTEMPTS {
            // Floor, ceiling and closed check are evaluated in the same statement.
            // The bounds are computed in bigint so extreme deltas cannot overflow int4.
            let applied = sqlx::query_as::<_, (i32,)>(
                r#"
                UPDATE flights
                SET available_seats = available_seats - $2, updated_at = NOW()
                WHERE id = $1
                  AND available_seats::bigint - $2::bigint >= 0
                  AND available_seats::bigint - $2::bigint <= total_seats
                  AND ($2 <= 0 OR status NOT IN ('cancelled', 'completed'))
                RETURNING available_seats
                "#,
            )
            .bind(id)
            .bind(delta)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

            if let Some((available_seats,)) = applied {
                return Ok(SeatAdjustment::Applied { available_seats });
            }

            let row = sqlx::query_as::<_, SeatRow>(
                "SELECT available_seats, total_seats, status FROM flights WHERE id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

            let Some(row) = row else {
                return Ok(SeatAdjustment::NotFound);
            };
            let status = row
                .status
                .parse::<FlightStatus>()
                .map_err(|e| StoreError::Corrupt(format!("flight {}: {}", id, e)))?;
            if let Some(outcome) = diagnose(delta, row.available_seats, row.total_seats, status) {
                return Ok(outcome);
            }
            warn!("Seat adjustment on flight {} raced a concurrent writer, retrying", id);
        }

        Err(StoreError::Backend(format!(
            "seat adjustment on flight {} did not settle after {} attempts",
            id, MAX_ADJUST_ATTEMPTS
        )))
    }

    async fn save_flight(&self, flight: &Flight) -> Result<(), StoreError> {
        // Seat counters are only written on insert.
        sqlx::query(
            r#"
            INSERT INTO flights (id, flight_number, airline, departure_city, arrival_city,
                                 departure_time, arrival_time, price_amount, price_currency,
                                 total_seats, available_seats, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (id) DO UPDATE SET
                flight_number = EXCLUDED.flight_number,
                airline = EXCLUDED.airline,
                departure_city = EXCLUDED.departure_city,
                arrival_city = EXCLUDED.arrival_city,
                departure_time = EXCLUDED.departure_time,
                arrival_time = EXCLUDED.arrival_time,
                price_amount = EXCLUDED.price_amount,
                price_currency = EXCLUDED.price_currency,
                status = EXCLUDED.status,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(flight.id)
        .bind(&flight.flight_number)
        .bind(&flight.airline)
        .bind(&flight.departure_city)
        .bind(&flight.arrival_city)
        .bind(flight.departure_time)
        .bind(flight.arrival_time)
        .bind(flight.price_amount)
        .bind(&flight.price_currency)
        .bind(flight.total_seats)
        .bind(flight.available_seats)
        .bind(flight.status.as_str())
        .bind(flight.created_at)
        .bind(flight.updated_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn search_flights(&self, criteria: &FlightSearch) -> Result<Vec<Flight>, StoreError> {
        let sql = format!(
            r#"
            SELECT {}
            FROM flights
            WHERE LOWER(departure_city) = LOWER($1)
              AND LOWER(arrival_city) = LOWER($2)
              AND (departure_time AT TIME ZONE 'UTC')::date = $3
              AND status NOT IN ('cancelled', 'completed')
              AND available_seats >= $4
            ORDER BY departure_time
            "#,
            FLIGHT_COLUMNS
        );
        let rows = sqlx::query_as::<_, FlightRow>(&sql)
            .bind(&criteria.departure_city)
            .bind(&criteria.arrival_city)
            .bind(criteria.departure_date)
            .bind(criteria.passengers)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.into_iter().map(Flight::try_from).collect()
    }

    async fn list_flight_ids(&self) -> Result<Vec<Uuid>, StoreError> {
        let rows = sqlx::query_as::<_, (Uuid,)>("SELECT id FROM flights ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(status: &str) -> FlightRow {
        let now = Utc::now();
        FlightRow {
            id: Uuid::new_v4(),
            flight_number: "TF55".to_string(),
            airline: "Take Flight".to_string(),
            departure_city: "Harare".to_string(),
            arrival_city: "Maputo".to_string(),
            departure_time: now,
            arrival_time: now + chrono::Duration::hours(2),
            price_amount: 14_000,
            price_currency: "USD".to_string(),
            total_seats: 50,
            available_seats: 12,
            status: status.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_row_conversion() {
        let flight = Flight::try_from(row("delayed")).unwrap();
        assert_eq!(flight.status, FlightStatus::Delayed);
        assert_eq!(flight.consumed_seats(), 38);

        assert!(matches!(Flight::try_from(row("boarding")), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn test_diagnose_failed_update() {
        use FlightStatus::*;

        assert_eq!(diagnose(3, 2, 10, Scheduled), Some(SeatAdjustment::Insufficient { available_seats: 2 }));
        assert_eq!(
            diagnose(-3, 9, 10, Scheduled),
            Some(SeatAdjustment::Overflow { available_seats: 9, total_seats: 10 })
        );
        assert_eq!(diagnose(1, 5, 10, Cancelled), Some(SeatAdjustment::Closed(Cancelled)));
        // Releases onto a closed flight are admissible.
        assert_eq!(diagnose(-1, 5, 10, Completed), None);
        assert_eq!(diagnose(1, 5, 10, Delayed), None);
    }

    #[test]
    fn test_diagnose_extreme_deltas() {
        use FlightStatus::*;

        assert_eq!(
            diagnose(i32::MIN, 5, 10, Scheduled),
            Some(SeatAdjustment::Overflow { available_seats: 5, total_seats: 10 })
        );
        assert_eq!(
            diagnose(-i32::MAX, 5, 10, Scheduled),
            Some(SeatAdjustment::Overflow { available_seats: 5, total_seats: 10 })
        );
        assert_eq!(diagnose(i32::MAX, 5, 10, Scheduled), Some(SeatAdjustment::Insufficient { available_seats: 5 }));
        assert_eq!(diagnose(i32::MAX, -2, 10, Scheduled), Some(SeatAdjustment::Insufficient { available_seats: -2 }));
    }
}
