use boxoffice_core::{
    Booking, BookingId, BookingStore, Committed, CustomerId, NewBooking, Notification, ShowId,
};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn};

use crate::availability::SeatAvailability;
use crate::error::{BookingError, BookingResult};
use crate::lifecycle::{self, Transition};
use crate::notices;

/// How far one lock reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockScope {
    #[default]
    PerShow,
    Global,
}

const PRUNE_THRESHOLD: usize = 1024;

/// Hands out one async mutex per show.
///
/// Reservation, cancellation, show cancellation, payment, validation and the
/// stale sweep all serialize on the same per-show lock, so a seat released by
/// a cancel is either fully visible or not visible to a concurrent reserve.
pub struct ShowLocks {
    scope: LockScope,
    global: Arc<AsyncMutex<()>>,
    shows: Mutex<HashMap<ShowId, Arc<AsyncMutex<()>>>>,
}

impl ShowLocks {
    pub fn new(scope: LockScope) -> Self {
        Self {
            scope,
            global: Arc::new(AsyncMutex::new(())),
            shows: Mutex::new(HashMap::new()),
        }
    }

    pub fn for_show(&self, show_id: ShowId) -> Arc<AsyncMutex<()>> {
        if self.scope == LockScope::Global {
            return self.global.clone();
        }

        let mut shows = self.shows.lock().unwrap_or_else(|e| e.into_inner());
        if shows.len() > PRUNE_THRESHOLD {
            // Only this map holds an unused lock.
            shows.retain(|_, lock| Arc::strong_count(lock) > 1);
        }
        shows
            .entry(show_id)
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }
}

impl Default for ShowLocks {
    fn default() -> Self {
        Self::new(LockScope::default())
    }
}

/// The booking critical section.
///
/// Every method holds the show lock across exactly one store read and one
/// store write. Nothing here talks to downstream collaborators; the returned
/// `Committed` carries the outbox rows for the dispatcher to send after the
/// lock is gone.
pub struct SeatLedger {
    store: Arc<dyn BookingStore>,
    locks: ShowLocks,
}

impl SeatLedger {
    pub fn new(store: Arc<dyn BookingStore>, locks: ShowLocks) -> Self {
        Self { store, locks }
    }

    /// Check-seats-then-commit for one show.
    pub async fn reserve(&self, request: NewBooking) -> BookingResult<Committed<Booking>> {
        let show_id = request.show_id;
        let lock = self.locks.for_show(show_id);
        let _guard = lock.lock().await;

        let active = self.store.list_by_show(show_id).await?;
        let availability = SeatAvailability::from_bookings(show_id, &active)?;

        if let Some(seat) = availability.first_conflict(&request.seats) {
            warn!("Seat {} of show {} already held by booking {:?}", seat, show_id, availability.holder(seat));
            return Err(BookingError::Conflict(seat));
        }

        let outbox = notices::seat_changes(show_id, &request.seats, true);
        let committed = self.store.insert(request, outbox).await?;

        info!(
            "Booking {} committed for show {}: seats {}",
            committed.value.id,
            show_id,
            committed.value.seat_list()
        );
        Ok(committed)
    }

    /// Applies a flag transition under the show lock and persists it.
    /// An `Unchanged` transition writes nothing and queues nothing.
    pub async fn transition<F, N>(&self, id: BookingId, apply: F, notice: N) -> BookingResult<Committed<Booking>>
    where
        F: FnOnce(&mut Booking) -> BookingResult<Transition>,
        N: FnOnce(&Booking) -> Notification,
    {
        let show_id = self.locate(id).await?.show_id;
        let lock = self.locks.for_show(show_id);
        let _guard = lock.lock().await;

        let mut booking = self.locate(id).await?;
        match apply(&mut booking)? {
            Transition::Unchanged => Ok(Committed {
                value: booking,
                outbox: Vec::new(),
            }),
            Transition::Changed => {
                let outbox = vec![notice(&booking)];
                let committed = self.store.update(&booking, outbox).await?;
                info!("Booking {} is now {}", id, committed.value.status());
                Ok(committed)
            }
        }
    }

    /// Deletes a non-used booking and frees its seats.
    pub async fn release(&self, id: BookingId) -> BookingResult<Committed<Booking>> {
        let show_id = self.locate(id).await?.show_id;
        let lock = self.locks.for_show(show_id);
        let _guard = lock.lock().await;

        let booking = self.locate(id).await?;
        lifecycle::check_cancellable(&booking)?;

        let mut outbox = notices::seat_changes(show_id, &booking.seats, false);
        outbox.push(notices::booking_cancelled(&booking, lifecycle::refund_due(&booking)));

        let committed = self.store.delete(id, outbox).await?;
        info!("Booking {} cancelled, seats {} released", id, committed.value.seat_list());
        Ok(committed)
    }

    /// Deletes every booking of the show. The value lists the removed bookings.
    pub async fn release_show(&self, show_id: ShowId) -> BookingResult<Committed<Vec<Booking>>> {
        let lock = self.locks.for_show(show_id);
        let _guard = lock.lock().await;

        let bookings = self.store.list_by_show(show_id).await?;
        if bookings.is_empty() {
            return Ok(Committed {
                value: Vec::new(),
                outbox: Vec::new(),
            });
        }

        let mut outbox = Vec::new();
        let mut refunds: BTreeMap<CustomerId, i64> = BTreeMap::new();
        for booking in &bookings {
            outbox.extend(notices::seat_changes(show_id, &booking.seats, false));
            let total = refunds.entry(booking.customer_id).or_insert(0);
            *total = total.saturating_add(lifecycle::refund_due(booking).unwrap_or(0));
        }
        for (customer_id, refund_total) in &refunds {
            outbox.push(notices::show_cancelled(show_id, *customer_id, *refund_total));
        }

        let ids: Vec<BookingId> = bookings.iter().map(|b| b.id).collect();
        let committed = self.store.delete_many(&ids, outbox).await?;
        info!(
            "Show {} cancelled: {} bookings removed, {} customers affected",
            show_id,
            committed.value.len(),
            refunds.len()
        );
        Ok(committed)
    }

    /// Releases the booking if it is still unpaid and older than `cutoff`.
    /// Returns `None` when a payment or cancel won the race.
    pub async fn release_unpaid(
        &self,
        id: BookingId,
        cutoff: DateTime<Utc>,
    ) -> BookingResult<Option<Committed<Booking>>> {
        let show_id = match self.store.get(id).await? {
            Some(booking) => booking.show_id,
            None => return Ok(None),
        };
        let lock = self.locks.for_show(show_id);
        let _guard = lock.lock().await;

        let booking = match self.store.get(id).await? {
            Some(booking) if !booking.paid && booking.created_at < cutoff => booking,
            _ => return Ok(None),
        };

        let mut outbox = notices::seat_changes(show_id, &booking.seats, false);
        outbox.push(notices::booking_expired(&booking));

        let committed = self.store.delete(id, outbox).await?;
        info!("Unpaid booking {} expired, seats {} released", id, committed.value.seat_list());
        Ok(Some(committed))
    }

    async fn locate(&self, id: BookingId) -> BookingResult<Booking> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| BookingError::NotFound(id.to_string()))
    }
}
