use async_trait::async_trait;
use boxoffice_core::{
    Booking, BookingId, BookingStore, Committed, CustomerId, NewBooking, Notification, OutboxEntry,
    OutboxId, OutboxStore, SeatId, ShowId, StoreError, StoreResult,
};
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::BTreeSet;

/// Postgres booking store.
///
/// Every write runs in one transaction together with its outbox rows. The
/// `booking_seats (show_id, seat)` primary key backs the in-process show lock:
/// two bookings can never hold the same seat even if the lock is bypassed.
pub struct PgBookingStore {
    pool: PgPool,
}

impl PgBookingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn begin(&self) -> StoreResult<Transaction<'static, Postgres>> {
        self.pool.begin().await.map_err(StoreError::backend)
    }
}

#[derive(sqlx::FromRow)]
struct BookingRow {
    id: i64,
    show_id: i64,
    customer_id: i64,
    seats: String,
    amount: i64,
    is_paid: bool,
    is_used: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        Ok(Booking {
            id: BookingId(row.id),
            show_id: ShowId(row.show_id),
            customer_id: CustomerId(row.customer_id),
            seats: parse_stored_seats(&row.seats)?,
            amount: row.amount,
            paid: row.is_paid,
            used: row.is_used,
            created_at: row.created_at,
        })
    }
}

fn parse_stored_seats(raw: &str) -> StoreResult<BTreeSet<SeatId>> {
    raw.split(',')
        .filter(|part| !part.trim().is_empty())
        .map(|part| {
            part.parse::<SeatId>()
                .map_err(|e| StoreError::Backend(format!("Stored seat list '{}' is unreadable: {}", raw, e)))
        })
        .collect()
}

fn into_bookings(rows: Vec<BookingRow>) -> StoreResult<Vec<Booking>> {
    rows.into_iter().map(Booking::try_from).collect()
}

#[derive(sqlx::FromRow)]
struct OutboxRow {
    id: i64,
    payload: Json<Notification>,
    idempotency_key: Option<String>,
    attempts: i32,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<OutboxRow> for OutboxEntry {
    fn from(row: OutboxRow) -> Self {
        OutboxEntry {
            id: OutboxId(row.id),
            notification: row.payload.0,
            key: row.idempotency_key,
            attempts: row.attempts.max(0) as u32,
            last_error: row.last_error,
            created_at: row.created_at,
        }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error().is_some_and(|db| db.is_unique_violation())
}

async fn enqueue(
    tx: &mut Transaction<'static, Postgres>,
    notifications: Vec<Notification>,
) -> StoreResult<Vec<OutboxEntry>> {
    let mut entries = Vec::with_capacity(notifications.len());
    for notification in notifications {
        let row: OutboxRow = sqlx::query_as(
            r#"
            INSERT INTO outbox (payload)
            VALUES ($1)
            RETURNING id, payload, idempotency_key, attempts, last_error, created_at
            "#,
        )
        .bind(Json(notification))
        .fetch_one(&mut **tx)
        .await
        .map_err(StoreError::backend)?;
        entries.push(row.into());
    }
    Ok(entries)
}

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn insert(&self, booking: NewBooking, outbox: Vec<Notification>) -> StoreResult<Committed<Booking>> {
        let mut tx = self.begin().await?;

        let row: BookingRow = sqlx::query_as(
            r#"
            INSERT INTO bookings (show_id, customer_id, seats, amount, is_paid, is_used, created_at)
            VALUES ($1, $2, $3, $4, FALSE, FALSE, $5)
            RETURNING id, show_id, customer_id, seats, amount, is_paid, is_used, created_at
            "#,
        )
        .bind(booking.show_id.0)
        .bind(booking.customer_id.0)
        .bind(boxoffice_core::seat::join_seats(&booking.seats))
        .bind(booking.amount)
        .bind(booking.created_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(StoreError::backend)?;

        // Seats go in one by one in seat order so a clash names the first taken seat.
        for seat in &booking.seats {
            let claimed = sqlx::query("INSERT INTO booking_seats (show_id, seat, booking_id) VALUES ($1, $2, $3)")
                .bind(booking.show_id.0)
                .bind(seat.to_string())
                .bind(row.id)
                .execute(&mut *tx)
                .await;
            match claimed {
                Ok(_) => {}
                Err(err) if is_unique_violation(&err) => return Err(StoreError::SeatTaken(*seat)),
                Err(err) => return Err(StoreError::backend(err)),
            }
        }

        let outbox = enqueue(&mut tx, outbox).await?;
        tx.commit().await.map_err(StoreError::backend)?;

        Ok(Committed {
            value: row.try_into()?,
            outbox,
        })
    }

    async fn get(&self, id: BookingId) -> StoreResult<Option<Booking>> {
        let row: Option<BookingRow> = sqlx::query_as(
            "SELECT id, show_id, customer_id, seats, amount, is_paid, is_used, created_at FROM bookings WHERE id = $1",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        row.map(Booking::try_from).transpose()
    }

    async fn list_by_show(&self, show_id: ShowId) -> StoreResult<Vec<Booking>> {
        let rows: Vec<BookingRow> = sqlx::query_as(
            "SELECT id, show_id, customer_id, seats, amount, is_paid, is_used, created_at FROM bookings WHERE show_id = $1 ORDER BY id",
        )
        .bind(show_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        into_bookings(rows)
    }

    async fn list_by_customer(&self, customer_id: CustomerId) -> StoreResult<Vec<Booking>> {
        let rows: Vec<BookingRow> = sqlx::query_as(
            "SELECT id, show_id, customer_id, seats, amount, is_paid, is_used, created_at FROM bookings WHERE customer_id = $1 ORDER BY id",
        )
        .bind(customer_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        into_bookings(rows)
    }

    async fn list_all(&self) -> StoreResult<Vec<Booking>> {
        let rows: Vec<BookingRow> = sqlx::query_as(
            "SELECT id, show_id, customer_id, seats, amount, is_paid, is_used, created_at FROM bookings ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        into_bookings(rows)
    }

    async fn list_unpaid_before(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<Booking>> {
        let rows: Vec<BookingRow> = sqlx::query_as(
            r#"
            SELECT id, show_id, customer_id, seats, amount, is_paid, is_used, created_at
            FROM bookings
            WHERE NOT is_paid AND created_at < $1
            ORDER BY id
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        into_bookings(rows)
    }

    async fn update(&self, booking: &Booking, outbox: Vec<Notification>) -> StoreResult<Committed<Booking>> {
        let mut tx = self.begin().await?;

        let row: Option<BookingRow> = sqlx::query_as(
            r#"
            UPDATE bookings SET is_paid = $2, is_used = $3
            WHERE id = $1
            RETURNING id, show_id, customer_id, seats, amount, is_paid, is_used, created_at
            "#,
        )
        .bind(booking.id.0)
        .bind(booking.paid)
        .bind(booking.used)
        .fetch_optional(&mut *tx)
        .await
        .map_err(StoreError::backend)?;
        let row = row.ok_or(StoreError::Missing(booking.id))?;

        let outbox = enqueue(&mut tx, outbox).await?;
        tx.commit().await.map_err(StoreError::backend)?;

        Ok(Committed {
            value: row.try_into()?,
            outbox,
        })
    }

    async fn delete(&self, id: BookingId, outbox: Vec<Notification>) -> StoreResult<Committed<Booking>> {
        let mut tx = self.begin().await?;

        // booking_seats rows go with the booking (ON DELETE CASCADE)
        let row: Option<BookingRow> = sqlx::query_as(
            r#"
            DELETE FROM bookings WHERE id = $1
            RETURNING id, show_id, customer_id, seats, amount, is_paid, is_used, created_at
            "#,
        )
        .bind(id.0)
        .fetch_optional(&mut *tx)
        .await
        .map_err(StoreError::backend)?;
        let row = row.ok_or(StoreError::Missing(id))?;

        let outbox = enqueue(&mut tx, outbox).await?;
        tx.commit().await.map_err(StoreError::backend)?;

        Ok(Committed {
            value: row.try_into()?,
            outbox,
        })
    }

    async fn delete_many(&self, ids: &[BookingId], outbox: Vec<Notification>) -> StoreResult<Committed<Vec<Booking>>> {
        let mut tx = self.begin().await?;
        let raw_ids: Vec<i64> = ids.iter().map(|id| id.0).collect();

        let rows: Vec<BookingRow> = sqlx::query_as(
            r#"
            DELETE FROM bookings WHERE id = ANY($1)
            RETURNING id, show_id, customer_id, seats, amount, is_paid, is_used, created_at
            "#,
        )
        .bind(&raw_ids)
        .fetch_all(&mut *tx)
        .await
        .map_err(StoreError::backend)?;

        if rows.len() != ids.len() {
            // Dropping the transaction rolls the partial delete back.
            let missing = ids
                .iter()
                .find(|id| !rows.iter().any(|row| row.id == id.0))
                .copied()
                .unwrap_or(ids[0]);
            return Err(StoreError::Missing(missing));
        }

        let outbox = enqueue(&mut tx, outbox).await?;
        tx.commit().await.map_err(StoreError::backend)?;

        let mut removed = into_bookings(rows)?;
        removed.sort_by_key(|b| b.id);
        Ok(Committed { value: removed, outbox })
    }
}

#[async_trait]
impl OutboxStore for PgBookingStore {
    async fn pending(
        &self,
        limit: usize,
        created_before: DateTime<Utc>,
        max_attempts: u32,
    ) -> StoreResult<Vec<OutboxEntry>> {
        let rows: Vec<OutboxRow> = sqlx::query_as(
            r#"
            SELECT id, payload, idempotency_key, attempts, last_error, created_at
            FROM outbox
            WHERE created_at < $1 AND attempts < $2
            ORDER BY id
            LIMIT $3
            "#,
        )
        .bind(created_before)
        .bind(max_attempts as i32)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        Ok(rows.into_iter().map(OutboxEntry::from).collect())
    }

    async fn assign_key(&self, id: OutboxId, key: &str) -> StoreResult<String> {
        // COALESCE keeps whichever key reached the row first.
        let row: Option<(Option<String>,)> = sqlx::query_as(
            "UPDATE outbox SET idempotency_key = COALESCE(idempotency_key, $2) WHERE id = $1 RETURNING idempotency_key",
        )
        .bind(id.0)
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        match row {
            Some((Some(stored),)) => Ok(stored),
            Some((None,)) => Err(StoreError::Backend(format!("Outbox entry {:?} lost its key", id))),
            None => Err(StoreError::MissingOutbox(id)),
        }
    }

    async fn mark_delivered(&self, id: OutboxId) -> StoreResult<()> {
        sqlx::query("DELETE FROM outbox WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(StoreError::backend)?;
        Ok(())
    }

    async fn record_failure(&self, id: OutboxId, error: &str) -> StoreResult<u32> {
        let row: Option<(i32,)> = sqlx::query_as(
            "UPDATE outbox SET attempts = attempts + 1, last_error = $2 WHERE id = $1 RETURNING attempts",
        )
        .bind(id.0)
        .bind(error)
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::backend)?;

        row.map(|(attempts,)| attempts.max(0) as u32)
            .ok_or(StoreError::MissingOutbox(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(seats: &str) -> BookingRow {
        BookingRow {
            id: 3,
            show_id: 1,
            customer_id: 7,
            seats: seats.to_string(),
            amount: 100,
            is_paid: true,
            is_used: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_row_maps_to_booking() {
        let booking = Booking::try_from(row("A1,A2")).unwrap();

        assert_eq!(booking.id, BookingId(3));
        assert_eq!(booking.seat_list(), "A1,A2");
        assert!(booking.paid);
        assert!(!booking.used);
    }

    #[test]
    fn test_unreadable_seat_list_is_a_backend_error() {
        assert!(matches!(Booking::try_from(row("A1,??")), Err(StoreError::Backend(_))));
    }

    #[test]
    fn test_outbox_row_keeps_attempt_count() {
        let entry = OutboxEntry::from(OutboxRow {
            id: 9,
            payload: Json(Notification::SeatState {
                show_id: ShowId(1),
                seat: "B4".parse().unwrap(),
                occupied: false,
            }),
            idempotency_key: Some("k".to_string()),
            attempts: 2,
            last_error: Some("timeout".to_string()),
            created_at: Utc::now(),
        });

        assert_eq!(entry.id, OutboxId(9));
        assert_eq!(entry.attempts, 2);
        assert_eq!(entry.key.as_deref(), Some("k"));
    }
}
