use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;
use takeflight_core::{Booking, BookingSearch, BookingStatus, BookingStore, DailyCap, PaymentStatus, StoreError};
use crate::backend;

const BOOKING_COLUMNS: &str = "id, user_id, flight_id, passengers, status, total_price_amount, total_price_currency, \
     payment_status, booking_date, created_at, updated_at, version";

pub struct PostgresBookingStore {
    pool: PgPool,
}

impl PostgresBookingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    user_id: String,
    flight_id: Uuid,
    passengers: i32,
    status: String,
    total_price_amount: i64,
    total_price_currency: String,
    payment_status: String,
    booking_date: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    version: i64,
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let corrupt = |e: String| StoreError::Corrupt(format!("booking {}: {}", row.id, e));
        let status = row.status.parse::<BookingStatus>().map_err(corrupt)?;
        let payment_status = row.payment_status.parse::<PaymentStatus>().map_err(corrupt)?;
        Ok(Booking {
            id: row.id,
            user_id: row.user_id,
            flight_id: row.flight_id,
            passengers: row.passengers,
            status,
            total_price_amount: row.total_price_amount,
            total_price_currency: row.total_price_currency,
            payment_status,
            booking_date: row.booking_date,
            created_at: row.created_at,
            updated_at: row.updated_at,
            version: row.version,
        })
    }
}

async fn insert(conn: &mut PgConnection, booking: &Booking) -> Result<(), StoreError> {
    let result = sqlx::query(
        r#"
        INSERT INTO bookings (id, user_id, flight_id, passengers, status, total_price_amount,
                              total_price_currency, payment_status, booking_date, created_at,
                              updated_at, version)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#,
    )
    .bind(booking.id)
    .bind(&booking.user_id)
    .bind(booking.flight_id)
    .bind(booking.passengers)
    .bind(booking.status.as_str())
    .bind(booking.total_price_amount)
    .bind(&booking.total_price_currency)
    .bind(booking.payment_status.as_str())
    .bind(booking.booking_date)
    .bind(booking.created_at)
    .bind(booking.updated_at)
    .bind(booking.version)
    .execute(conn)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(db)) if db.is_unique_violation() => Err(StoreError::Duplicate(booking.id)),
        Err(e) => Err(backend(e)),
    }
}

#[async_trait]
impl BookingStore for PostgresBookingStore {
    async fn create(&self, booking: &Booking) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await.map_err(backend)?;
        insert(&mut conn, booking).await
    }

    async fn create_within_cap(&self, booking: &Booking, cap: &DailyCap) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await.map_err(backend)?;

        // Capped inserts of one user queue on this lock until commit.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(&booking.user_id)
            .execute(&mut *tx)
            .await
            .map_err(backend)?;

        let (taken,) = sqlx::query_as::<_, (i64,)>(
            "SELECT COUNT(*) FROM bookings WHERE user_id = $1 AND status <> 'cancelled' AND booking_date >= $2",
        )
        .bind(&booking.user_id)
        .bind(cap.since)
        .fetch_one(&mut *tx)
        .await
        .map_err(backend)?;

        if taken >= i64::from(cap.limit) {
            tx.rollback().await.map_err(backend)?;
            return Ok(false);
        }

        insert(&mut tx, booking).await?;
        tx.commit().await.map_err(backend)?;
        Ok(true)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        let sql = format!("SELECT {} FROM bookings WHERE id = $1", BOOKING_COLUMNS);
        let row = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        row.map(Booking::try_from).transpose()
    }

    async fn replace(&self, booking: &Booking, expected_version: i64) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE bookings
            SET passengers = $2,
                status = $3,
                total_price_amount = $4,
                total_price_currency = $5,
                payment_status = $6,
                updated_at = $7,
                version = version + 1
            WHERE id = $1 AND version = $8
            "#,
        )
        .bind(booking.id)
        .bind(booking.passengers)
        .bind(booking.status.as_str())
        .bind(booking.total_price_amount)
        .bind(&booking.total_price_currency)
        .bind(booking.payment_status.as_str())
        .bind(booking.updated_at)
        .bind(expected_version)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 1 {
            return Ok(());
        }

        let exists = sqlx::query_as::<_, (i64,)>("SELECT version FROM bookings WHERE id = $1")
            .bind(booking.id)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;
        match exists {
            Some(_) => Err(StoreError::VersionConflict { id: booking.id, expected: expected_version }),
            None => Err(StoreError::Missing(booking.id)),
        }
    }

    async fn search(&self, criteria: &BookingSearch) -> Result<Vec<Booking>, StoreError> {
        let mut query = search_query(criteria);
        let rows = query
            .build_query_as::<BookingRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;
        rows.into_iter().map(Booking::try_from).collect()
    }
}

fn search_query(criteria: &BookingSearch) -> QueryBuilder<'static, Postgres> {
    let mut query = QueryBuilder::new(format!("SELECT {} FROM bookings WHERE TRUE", BOOKING_COLUMNS));
    if let Some(user_id) = &criteria.user_id {
        query.push(" AND user_id = ").push_bind(user_id.clone());
    }
    if let Some(flight_id) = criteria.flight_id {
        query.push(" AND flight_id = ").push_bind(flight_id);
    }
    if let Some(status) = criteria.status {
        query.push(" AND status = ").push_bind(status.as_str());
    }
    if let Some(start) = criteria.start_date {
        query.push(" AND booking_date >= ").push_bind(start);
    }
    if let Some(end) = criteria.end_date {
        query.push(" AND booking_date <= ").push_bind(end);
    }
    query.push(" ORDER BY booking_date DESC");
    query
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_conversion() {
        let now = Utc::now();
        let row = BookingRow {
            id: Uuid::new_v4(),
            user_id: "u-1".to_string(),
            flight_id: Uuid::new_v4(),
            passengers: 2,
            status: "confirmed".to_string(),
            total_price_amount: 50_000,
            total_price_currency: "USD".to_string(),
            payment_status: "paid".to_string(),
            booking_date: now,
            created_at: now,
            updated_at: now,
            version: 3,
        };
        let booking = Booking::try_from(row).unwrap();
        assert_eq!(booking.status, BookingStatus::Confirmed);
        assert_eq!(booking.payment_status, PaymentStatus::Paid);
        assert_eq!(booking.held_seats(), 2);
        assert_eq!(booking.version, 3);
    }

    #[test]
    fn test_search_query_binds_only_given_filters() {
        let criteria = BookingSearch {
            user_id: Some("u-1".to_string()),
            status: Some(BookingStatus::Pending),
            ..Default::default()
        };
        let query = search_query(&criteria);
        let sql = query.sql();
        assert!(sql.contains("user_id = $1"));
        assert!(sql.contains("status = $2"));
        assert!(!sql.contains("flight_id ="));
        assert!(sql.ends_with("ORDER BY booking_date DESC"));
    }
}
