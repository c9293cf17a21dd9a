use async_trait::async_trait;
use booking_core::models::{Booking, BookingStatus, Passenger};
use booking_core::{BookingStore, BookingUnitOfWork, StoreError};
use chrono::{DateTime, Utc};
use sqlx::{Connection, PgConnection, PgPool, Postgres, Transaction};
use std::collections::HashMap;

const BOOKING_COLUMNS: &str =
    "id, pnr, flight_id, user_email, num_seats, total_price, status, created_at, cancelled_at";

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
struct BookingRow {
    id: i64,
    pnr: String,
    flight_id: i64,
    user_email: String,
    num_seats: i32,
    total_price: f64,
    status: String,
    created_at: DateTime<Utc>,
    cancelled_at: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow)]
struct PassengerRow {
    booking_id: i64,
    passenger_name: Option<String>,
    gender: Option<String>,
    age: Option<i32>,
    seat_number: Option<String>,
    meal_preference: Option<String>,
}

impl BookingRow {
    fn into_booking(self, passengers: Vec<Passenger>) -> Result<Booking, StoreError> {
        let status: BookingStatus = self
            .status
            .parse()
            .map_err(|e| StoreError::Corrupt(format!("booking {}: {}", self.pnr, e)))?;

        Ok(Booking {
            id: Some(self.id),
            pnr: self.pnr,
            flight_id: self.flight_id,
            user_email: self.user_email,
            num_seats: self.num_seats,
            total_price: self.total_price,
            status,
            created_at: self.created_at,
            cancelled_at: self.cancelled_at,
            passengers,
        })
    }
}

impl From<PassengerRow> for Passenger {
    fn from(row: PassengerRow) -> Self {
        Self {
            name: row.passenger_name,
            gender: row.gender,
            age: row.age,
            seat_number: row.seat_number,
            meal_preference: row.meal_preference,
        }
    }
}

fn db_err(err: sqlx::Error) -> StoreError {
    StoreError::Database(Box::new(err))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

async fn attach_passengers(
    conn: &mut PgConnection,
    rows: Vec<BookingRow>,
) -> Result<Vec<Booking>, StoreError> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
    let passenger_rows = sqlx::query_as::<_, PassengerRow>(
        r#"
        SELECT booking_id, passenger_name, gender, age, seat_number, meal_preference
        FROM booking_passengers
        WHERE booking_id = ANY($1)
        ORDER BY booking_id, position
        "#,
    )
    .bind(ids)
    .fetch_all(&mut *conn)
    .await
    .map_err(db_err)?;

    let mut by_booking: HashMap<i64, Vec<Passenger>> = HashMap::new();
    for row in passenger_rows {
        by_booking.entry(row.booking_id).or_default().push(row.into());
    }

    rows.into_iter()
        .map(|row| {
            let passengers = by_booking.remove(&row.id).unwrap_or_default();
            row.into_booking(passengers)
        })
        .collect()
}

async fn fetch_by_pnr(
    conn: &mut PgConnection,
    pnr: &str,
    for_update: bool,
) -> Result<Option<Booking>, StoreError> {
    let sql = format!(
        "SELECT {} FROM bookings WHERE pnr = $1{}",
        BOOKING_COLUMNS,
        if for_update { " FOR UPDATE" } else { "" }
    );
    let row = sqlx::query_as::<_, BookingRow>(&sql)
        .bind(pnr)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_err)?;

    match row {
        Some(row) => Ok(attach_passengers(conn, vec![row]).await?.pop()),
        None => Ok(None),
    }
}

/// Postgres-backed booking store. Bookings live in `bookings`, their
/// passengers in `booking_passengers` ordered by `position`.
pub struct PostgresBookingStore {
    pool: PgPool,
}

impl PostgresBookingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookingStore for PostgresBookingStore {
    async fn begin(&self) -> Result<Box<dyn BookingUnitOfWork>, StoreError> {
        let tx = self.pool.begin().await.map_err(db_err)?;
        Ok(Box::new(PostgresUnitOfWork { tx }))
    }

    async fn find_by_pnr(&self, pnr: &str) -> Result<Option<Booking>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        fetch_by_pnr(&mut conn, pnr, false).await
    }

    async fn find_by_owner_ordered_by_created_desc(
        &self,
        email: &str,
    ) -> Result<Vec<Booking>, StoreError> {
        let mut conn = self.pool.acquire().await.map_err(db_err)?;
        let sql = format!(
            "SELECT {} FROM bookings WHERE user_email = $1 ORDER BY created_at DESC, id DESC",
            BOOKING_COLUMNS
        );
        let rows = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(email)
            .fetch_all(&mut *conn)
            .await
            .map_err(db_err)?;

        attach_passengers(&mut conn, rows).await
    }
}

/// One Postgres transaction. Dropping it without `commit` rolls back.
struct PostgresUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

impl PostgresUnitOfWork {
    async fn insert(&mut self, mut booking: Booking) -> Result<Booking, StoreError> {
        let taken: Option<i64> = sqlx::query_scalar("SELECT id FROM bookings WHERE pnr = $1")
            .bind(&booking.pnr)
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_err)?;
        if taken.is_some() {
            return Err(StoreError::DuplicatePnr(booking.pnr));
        }

        // A savepoint keeps the outer transaction usable if the insert
        // loses a race on the unique PNR.
        let mut savepoint = Connection::begin(&mut *self.tx).await.map_err(db_err)?;

        let inserted = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO bookings
                (pnr, flight_id, user_email, num_seats, total_price, status,
                 created_at, cancelled_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(&booking.pnr)
        .bind(booking.flight_id)
        .bind(&booking.user_email)
        .bind(booking.num_seats)
        .bind(booking.total_price)
        .bind(booking.status.as_str())
        .bind(booking.created_at)
        .bind(booking.cancelled_at)
        .fetch_one(&mut *savepoint)
        .await;

        let id = match inserted {
            Ok(id) => id,
            Err(e) if is_unique_violation(&e) => return Err(StoreError::DuplicatePnr(booking.pnr)),
            Err(e) => return Err(db_err(e)),
        };

        for (position, passenger) in booking.passengers.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO booking_passengers
                    (booking_id, position, passenger_name, gender, age, seat_number,
                     meal_preference)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(id)
            .bind(position as i32)
            .bind(&passenger.name)
            .bind(&passenger.gender)
            .bind(passenger.age)
            .bind(&passenger.seat_number)
            .bind(&passenger.meal_preference)
            .execute(&mut *savepoint)
            .await
            .map_err(db_err)?;
        }

        savepoint.commit().await.map_err(db_err)?;

        booking.id = Some(id);
        Ok(booking)
    }

    async fn update(&mut self, booking: Booking, id: i64) -> Result<Booking, StoreError> {
        let result = sqlx::query("UPDATE bookings SET status = $1, cancelled_at = $2 WHERE id = $3")
        .bind(booking.status.as_str())
        .bind(booking.cancelled_at)
        .bind(id)
        .execute(&mut *self.tx)
        .await
        .map_err(db_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Missing(booking.pnr));
        }
        Ok(booking)
    }
}

#[async_trait]
impl BookingUnitOfWork for PostgresUnitOfWork {
    async fn find_by_pnr(&mut self, pnr: &str) -> Result<Option<Booking>, StoreError> {
        fetch_by_pnr(&mut self.tx, pnr, true).await
    }

    async fn save(&mut self, booking: Booking) -> Result<Booking, StoreError> {
        match booking.id {
            None => self.insert(booking).await,
            Some(id) => self.update(booking, id).await,
        }
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let PostgresUnitOfWork { tx } = *self;
        tx.commit().await.map_err(db_err)
    }
}
