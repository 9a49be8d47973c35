use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::booking::{Booking, BookingId, CustomerId, NewBooking, ShowId};
use crate::notify::{Notification, OutboxEntry, OutboxId};
use crate::seat::SeatId;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Storage-level uniqueness guard on `(show, seat)` fired.
    #[error("Seat {0} is already held by another booking")]
    SeatTaken(SeatId),

    #[error("Booking {0} does not exist")]
    Missing(BookingId),

    #[error("Outbox entry {0:?} does not exist")]
    MissingOutbox(OutboxId),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn backend(err: impl std::fmt::Display) -> Self {
        StoreError::Backend(err.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Result of a write: the mutated value plus the outbox rows written in the
/// same transaction.
#[derive(Debug, Clone)]
pub struct Committed<T> {
    pub value: T,
    pub outbox: Vec<OutboxEntry>,
}

/// Repository trait for booking data access.
///
/// Every write takes the notifications it produces and persists them
/// atomically with the booking change.
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn insert(
        &self,
        booking: NewBooking,
        outbox: Vec<Notification>,
    ) -> StoreResult<Committed<Booking>>;

    async fn get(&self, id: BookingId) -> StoreResult<Option<Booking>>;

    /// All active bookings of a show, oldest first.
    async fn list_by_show(&self, show_id: ShowId) -> StoreResult<Vec<Booking>>;

    async fn list_by_customer(&self, customer_id: CustomerId) -> StoreResult<Vec<Booking>>;

    async fn list_all(&self) -> StoreResult<Vec<Booking>>;

    /// Unpaid bookings created strictly before `cutoff`.
    async fn list_unpaid_before(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<Booking>>;

    /// Persists the `paid`/`used` flags. Seats are immutable after insert.
    async fn update(
        &self,
        booking: &Booking,
        outbox: Vec<Notification>,
    ) -> StoreResult<Committed<Booking>>;

    /// Removes the booking and releases its seats in one transaction.
    async fn delete(
        &self,
        id: BookingId,
        outbox: Vec<Notification>,
    ) -> StoreResult<Committed<Booking>>;

    /// Removes several bookings and releases their seats in one transaction.
    async fn delete_many(
        &self,
        ids: &[BookingId],
        outbox: Vec<Notification>,
    ) -> StoreResult<Committed<Vec<Booking>>>;
}

/// Repository trait for undelivered notifications.
#[async_trait]
pub trait OutboxStore: Send + Sync {
    /// Entries created before `created_before` with fewer than `max_attempts`
    /// attempts, oldest first.
    async fn pending(
        &self,
        limit: usize,
        created_before: DateTime<Utc>,
        max_attempts: u32,
    ) -> StoreResult<Vec<OutboxEntry>>;

    /// Sets the downstream key unless one is already set; returns the key in force.
    async fn assign_key(&self, id: OutboxId, key: &str) -> StoreResult<String>;

    async fn mark_delivered(&self, id: OutboxId) -> StoreResult<()>;

    /// Bumps the attempt counter and returns the new count.
    async fn record_failure(&self, id: OutboxId, error: &str) -> StoreResult<u32>;
}
