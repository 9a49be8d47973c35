use boxoffice_core::{
    Acquire, Booking, BookingId, BookingStore, Committed, CustomerId, IdempotencyRegistry,
    NewBooking, SeatId, SeatLayout, ShowId,
};
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashSet};
use std::future::Future;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};

use crate::dispatcher::NotificationDispatcher;
use crate::error::{BookingError, BookingResult};
use crate::lifecycle;
use crate::notices;
use crate::projection::{self, SeatMatrix};
use crate::reservation::{SeatLedger, ShowLocks};

const MARK_APPLIED_ATTEMPTS: u32 = 2;

/// The synchronous booking API exposed to the transport layer.
///
/// Keyed operations run as: acquire inbound key → critical section → mark key
/// → dispatch outbox. Dispatch happens after the show lock is released and its
/// failures never fail the call.
pub struct BookingService {
    ledger: SeatLedger,
    store: Arc<dyn BookingStore>,
    registry: Arc<dyn IdempotencyRegistry>,
    dispatcher: Arc<NotificationDispatcher>,
    layout: SeatLayout,
    unpaid_hold: chrono::Duration,
}

impl BookingService {
    pub fn new(
        store: Arc<dyn BookingStore>,
        registry: Arc<dyn IdempotencyRegistry>,
        dispatcher: Arc<NotificationDispatcher>,
        locks: ShowLocks,
        layout: SeatLayout,
    ) -> Self {
        Self {
            ledger: SeatLedger::new(store.clone(), locks),
            store,
            registry,
            dispatcher,
            layout,
            unpaid_hold: chrono::Duration::days(2),
        }
    }

    pub fn with_unpaid_hold(mut self, hold: chrono::Duration) -> Self {
        self.unpaid_hold = hold;
        self
    }

    /// Reserves `seats` for the customer. Seats outside the hall, an empty
    /// seat set, a negative amount or an empty key are rejected before the
    /// key is consumed.
    #[instrument(skip(self, seats), fields(show = %show_id, customer = %customer_id))]
    pub async fn create(
        &self,
        show_id: ShowId,
        customer_id: CustomerId,
        seats: BTreeSet<SeatId>,
        amount: i64,
        inbound_key: &str,
    ) -> BookingResult<Booking> {
        if seats.is_empty() {
            return Err(BookingError::InvalidRequest("at least one seat is required".to_string()));
        }
        if amount < 0 {
            return Err(BookingError::InvalidRequest(format!("amount must not be negative, got {}", amount)));
        }
        for seat in &seats {
            self.layout.check(*seat)?;
        }

        let request = NewBooking::new(show_id, customer_id, seats, amount);
        self.guarded(inbound_key, || self.ledger.reserve(request)).await
    }

    /// Marks the booking paid. Re-paying is a no-op success.
    #[instrument(skip(self))]
    pub async fn pay(&self, id: BookingId) -> BookingResult<Booking> {
        let committed = self
            .ledger
            .transition(id, lifecycle::apply_payment, notices::payment_received)
            .await?;
        self.dispatcher.dispatch(&committed.outbox).await;
        Ok(committed.value)
    }

    #[instrument(skip(self))]
    pub async fn validate(&self, id: BookingId, inbound_key: &str) -> BookingResult<Booking> {
        self.guarded(inbound_key, || {
            self.ledger.transition(id, lifecycle::apply_validation, notices::ticket_validated)
        })
        .await
    }

    /// Deletes the booking and releases its seats. Returns the booking as it
    /// was just before removal.
    #[instrument(skip(self))]
    pub async fn cancel(&self, id: BookingId, inbound_key: &str) -> BookingResult<Booking> {
        self.guarded(inbound_key, || self.ledger.release(id)).await
    }

    /// Cancels every booking of the show and returns the number of distinct
    /// customers affected.
    #[instrument(skip(self))]
    pub async fn cancel_show(&self, show_id: ShowId, inbound_key: &str) -> BookingResult<usize> {
        let removed = self.guarded(inbound_key, || self.ledger.release_show(show_id)).await?;
        let customers: HashSet<CustomerId> = removed.iter().map(|b| b.customer_id).collect();
        Ok(customers.len())
    }

    pub async fn project_occupancy(&self, show_id: ShowId) -> BookingResult<SeatMatrix> {
        let bookings = self.store.list_by_show(show_id).await?;
        Ok(projection::project(&self.layout, &bookings)?)
    }

    pub async fn get(&self, id: BookingId) -> BookingResult<Booking> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| BookingError::NotFound(id.to_string()))
    }

    pub async fn list_for_show(&self, show_id: ShowId) -> BookingResult<Vec<Booking>> {
        Ok(self.store.list_by_show(show_id).await?)
    }

    pub async fn list_for_customer(&self, customer_id: CustomerId) -> BookingResult<Vec<Booking>> {
        Ok(self.store.list_by_customer(customer_id).await?)
    }

    pub async fn list_all(&self) -> BookingResult<Vec<Booking>> {
        Ok(self.store.list_all().await?)
    }

    /// Releases unpaid bookings older than the hold period. Returns how many
    /// were removed.
    pub async fn expire_stale(&self, now: DateTime<Utc>) -> BookingResult<usize> {
        let cutoff = now - self.unpaid_hold;
        let candidates = self.store.list_unpaid_before(cutoff).await?;
        let mut expired = 0;

        for booking in candidates {
            match self.ledger.release_unpaid(booking.id, cutoff).await {
                Ok(Some(committed)) => {
                    expired += 1;
                    self.dispatcher.dispatch(&committed.outbox).await;
                }
                Ok(None) => {}
                Err(err) => error!("Failed to expire booking {}: {}", booking.id, err),
            }
        }

        if expired > 0 {
            info!("Expired {} unpaid bookings created before {}", expired, cutoff);
        }
        Ok(expired)
    }

    /// Runs `op` under the inbound key. The key ends `applied` only if `op`
    /// committed; any error leaves it `failed` so the client may retry.
    async fn guarded<T, F, Fut>(&self, inbound_key: &str, op: F) -> BookingResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = BookingResult<Committed<T>>>,
    {
        if inbound_key.trim().is_empty() {
            return Err(BookingError::InvalidRequest("idempotency key must not be empty".to_string()));
        }

        let token = match self.registry.try_acquire(inbound_key).await? {
            Acquire::Fresh(token) => token,
            Acquire::AlreadySeen => {
                warn!("Rejected replay of transaction key {}", inbound_key);
                return Err(BookingError::DuplicateTransaction(inbound_key.to_string()));
            }
        };

        let committed = match op().await {
            Ok(committed) => committed,
            Err(err) => {
                if let Err(mark_err) = self.registry.mark_failed(inbound_key, &token).await {
                    error!("Failed to mark key {} failed: {}", inbound_key, mark_err);
                }
                return Err(err);
            }
        };

        // Already committed: a registry failure here is logged, not returned.
        // The key stays pending until its lease runs out, so replays inside
        // the lease are still rejected.
        for attempt in 1..=MARK_APPLIED_ATTEMPTS {
            match self.registry.mark_applied(inbound_key, &token).await {
                Ok(()) => break,
                Err(mark_err) if attempt < MARK_APPLIED_ATTEMPTS => {
                    warn!("Marking key {} applied failed, retrying: {}", inbound_key, mark_err);
                }
                Err(mark_err) => {
                    error!("Failed to mark key {} applied: {}", inbound_key, mark_err);
                }
            }
        }

        self.dispatcher.dispatch(&committed.outbox).await;
        Ok(committed.value)
    }
}
