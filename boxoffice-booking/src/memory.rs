use async_trait::async_trait;
use boxoffice_core::{
    Booking, BookingId, BookingStore, Committed, CustomerId, NewBooking, Notification, OutboxEntry,
    OutboxId, OutboxStore, SeatId, ShowId, StoreError, StoreResult,
};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

#[derive(Default)]
struct MemoryState {
    next_booking_id: i64,
    next_outbox_id: i64,
    bookings: BTreeMap<BookingId, Booking>,
    // Mirrors the (show_id, seat) primary key of the SQL schema.
    seats: HashMap<(ShowId, SeatId), BookingId>,
    outbox: BTreeMap<OutboxId, OutboxEntry>,
}

impl MemoryState {
    fn enqueue(&mut self, notifications: Vec<Notification>) -> Vec<OutboxEntry> {
        let now = Utc::now();
        notifications
            .into_iter()
            .map(|notification| {
                self.next_outbox_id += 1;
                let entry = OutboxEntry {
                    id: OutboxId(self.next_outbox_id),
                    notification,
                    key: None,
                    attempts: 0,
                    last_error: None,
                    created_at: now,
                };
                self.outbox.insert(entry.id, entry.clone());
                entry
            })
            .collect()
    }

    fn remove_booking(&mut self, id: BookingId) -> StoreResult<Booking> {
        let booking = self.bookings.remove(&id).ok_or(StoreError::Missing(id))?;
        for seat in &booking.seats {
            self.seats.remove(&(booking.show_id, *seat));
        }
        Ok(booking)
    }
}

/// Booking store and outbox kept in process memory.
///
/// All mutations happen under one async mutex, so each call is a transaction.
/// `fail_writes` makes every subsequent write fail without touching state.
#[derive(Default)]
pub struct InMemoryBookingStore {
    state: Mutex<MemoryState>,
    fail_writes: AtomicBool,
}

impl InMemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn outbox_len(&self) -> usize {
        self.state.lock().await.outbox.len()
    }

    /// Overwrites a booking as-is, bypassing every check. For tests that need
    /// states the state machine cannot produce.
    pub async fn force_put(&self, booking: Booking) {
        let mut state = self.state.lock().await;
        for seat in &booking.seats {
            state.seats.insert((booking.show_id, *seat), booking.id);
        }
        state.next_booking_id = state.next_booking_id.max(booking.id.0);
        state.bookings.insert(booking.id, booking);
    }

    fn check_writable(&self) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("write rejected".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn insert(&self, booking: NewBooking, outbox: Vec<Notification>) -> StoreResult<Committed<Booking>> {
        self.check_writable()?;
        let mut state = self.state.lock().await;

        if let Some(seat) = booking
            .seats
            .iter()
            .find(|seat| state.seats.contains_key(&(booking.show_id, **seat)))
        {
            return Err(StoreError::SeatTaken(*seat));
        }

        state.next_booking_id += 1;
        let booking = booking.into_booking(BookingId(state.next_booking_id));
        for seat in &booking.seats {
            state.seats.insert((booking.show_id, *seat), booking.id);
        }
        state.bookings.insert(booking.id, booking.clone());
        let outbox = state.enqueue(outbox);

        Ok(Committed { value: booking, outbox })
    }

    async fn get(&self, id: BookingId) -> StoreResult<Option<Booking>> {
        Ok(self.state.lock().await.bookings.get(&id).cloned())
    }

    async fn list_by_show(&self, show_id: ShowId) -> StoreResult<Vec<Booking>> {
        let state = self.state.lock().await;
        Ok(state.bookings.values().filter(|b| b.show_id == show_id).cloned().collect())
    }

    async fn list_by_customer(&self, customer_id: CustomerId) -> StoreResult<Vec<Booking>> {
        let state = self.state.lock().await;
        Ok(state.bookings.values().filter(|b| b.customer_id == customer_id).cloned().collect())
    }

    async fn list_all(&self) -> StoreResult<Vec<Booking>> {
        Ok(self.state.lock().await.bookings.values().cloned().collect())
    }

    async fn list_unpaid_before(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<Booking>> {
        let state = self.state.lock().await;
        Ok(state
            .bookings
            .values()
            .filter(|b| !b.paid && b.created_at < cutoff)
            .cloned()
            .collect())
    }

    async fn update(&self, booking: &Booking, outbox: Vec<Notification>) -> StoreResult<Committed<Booking>> {
        self.check_writable()?;
        let mut state = self.state.lock().await;

        let stored = state.bookings.get_mut(&booking.id).ok_or(StoreError::Missing(booking.id))?;
        stored.paid = booking.paid;
        stored.used = booking.used;
        let value = stored.clone();
        let outbox = state.enqueue(outbox);

        Ok(Committed { value, outbox })
    }

    async fn delete(&self, id: BookingId, outbox: Vec<Notification>) -> StoreResult<Committed<Booking>> {
        self.check_writable()?;
        let mut state = self.state.lock().await;

        let value = state.remove_booking(id)?;
        let outbox = state.enqueue(outbox);

        Ok(Committed { value, outbox })
    }

    async fn delete_many(&self, ids: &[BookingId], outbox: Vec<Notification>) -> StoreResult<Committed<Vec<Booking>>> {
        self.check_writable()?;
        let mut state = self.state.lock().await;

        if let Some(missing) = ids.iter().find(|id| !state.bookings.contains_key(*id)) {
            return Err(StoreError::Missing(*missing));
        }
        let mut removed = Vec::with_capacity(ids.len());
        for id in ids {
            removed.push(state.remove_booking(*id)?);
        }
        let outbox = state.enqueue(outbox);

        Ok(Committed { value: removed, outbox })
    }
}

#[async_trait]
impl OutboxStore for InMemoryBookingStore {
    async fn pending(
        &self,
        limit: usize,
        created_before: DateTime<Utc>,
        max_attempts: u32,
    ) -> StoreResult<Vec<OutboxEntry>> {
        let state = self.state.lock().await;
        Ok(state
            .outbox
            .values()
            .filter(|e| e.created_at < created_before && e.attempts < max_attempts)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn assign_key(&self, id: OutboxId, key: &str) -> StoreResult<String> {
        let mut state = self.state.lock().await;
        let entry = state.outbox.get_mut(&id).ok_or(StoreError::MissingOutbox(id))?;
        Ok(entry.key.get_or_insert_with(|| key.to_string()).clone())
    }

    async fn mark_delivered(&self, id: OutboxId) -> StoreResult<()> {
        self.state.lock().await.outbox.remove(&id);
        Ok(())
    }

    async fn record_failure(&self, id: OutboxId, error: &str) -> StoreResult<u32> {
        let mut state = self.state.lock().await;
        let entry = state.outbox.get_mut(&id).ok_or(StoreError::MissingOutbox(id))?;
        entry.attempts += 1;
        entry.last_error = Some(error.to_string());
        Ok(entry.attempts)
    }
}
