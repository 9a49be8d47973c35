use boxoffice_core::{
    DispatchError, KeyIssuer, Messenger, Notification, OutboxEntry, OutboxStore, SeatLookup,
    StoreError,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Counts from one dispatch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub delivered: usize,
    pub failed: usize,
    /// Entries another dispatcher finished first.
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct RelayPolicy {
    pub batch_size: usize,
    pub max_attempts: u32,
    /// Entries younger than this are left to the post-commit dispatch.
    pub grace: chrono::Duration,
}

impl Default for RelayPolicy {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_attempts: 10,
            grace: chrono::Duration::seconds(5),
        }
    }
}

enum Outcome {
    Delivered,
    Skipped,
}

/// Sends outbox entries to the seat-lookup and messaging collaborators.
///
/// Never called while a show lock is held. A failed call is recorded on the
/// entry and left for [`NotificationDispatcher::relay_pending`]; it is not
/// retried inline.
pub struct NotificationDispatcher {
    outbox: Arc<dyn OutboxStore>,
    issuer: Arc<dyn KeyIssuer>,
    seats: Arc<dyn SeatLookup>,
    messenger: Arc<dyn Messenger>,
    max_attempts: u32,
}

impl NotificationDispatcher {
    pub fn new(
        outbox: Arc<dyn OutboxStore>,
        issuer: Arc<dyn KeyIssuer>,
        seats: Arc<dyn SeatLookup>,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        Self {
            outbox,
            issuer,
            seats,
            messenger,
            max_attempts: RelayPolicy::default().max_attempts,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub async fn dispatch(&self, entries: &[OutboxEntry]) -> DispatchReport {
        let mut report = DispatchReport::default();

        for entry in entries {
            match self.deliver(entry).await {
                Ok(Outcome::Delivered) => report.delivered += 1,
                Ok(Outcome::Skipped) => report.skipped += 1,
                Err(err) => {
                    report.failed += 1;
                    self.note_failure(entry, &err).await;
                }
            }
        }

        report
    }

    /// One relay pass over entries older than the grace period.
    pub async fn relay_pending(&self, policy: &RelayPolicy, now: DateTime<Utc>) -> Result<DispatchReport, StoreError> {
        let entries = self
            .outbox
            .pending(policy.batch_size, now - policy.grace, policy.max_attempts)
            .await?;
        if entries.is_empty() {
            return Ok(DispatchReport::default());
        }

        debug!("Relaying {} outbox entries", entries.len());
        Ok(self.dispatch(&entries).await)
    }

    async fn deliver(&self, entry: &OutboxEntry) -> Result<Outcome, DispatchError> {
        let key = match &entry.key {
            Some(key) => key.clone(),
            None => {
                let candidate = self.issuer.issue(&entry.notification.describe()).await?;
                match self.outbox.assign_key(entry.id, &candidate).await {
                    Ok(key) => key,
                    Err(StoreError::MissingOutbox(_)) => return Ok(Outcome::Skipped),
                    Err(err) => return Err(err.into()),
                }
            }
        };

        match &entry.notification {
            Notification::SeatState { show_id, seat, occupied } => {
                self.seats.upsert(*show_id, *seat, *occupied, &key).await?;
            }
            Notification::CustomerMessage { customer_id, header, body } => {
                self.messenger.deliver(*customer_id, header, body, &key).await?;
            }
        }

        self.outbox.mark_delivered(entry.id).await?;
        Ok(Outcome::Delivered)
    }

    async fn note_failure(&self, entry: &OutboxEntry, err: &DispatchError) {
        warn!("Dispatch of outbox entry {:?} ({}) failed: {}", entry.id, entry.notification.describe(), err);

        match self.outbox.record_failure(entry.id, &err.to_string()).await {
            Ok(attempts) if attempts >= self.max_attempts => {
                error!(
                    "Giving up on outbox entry {:?} after {} attempts; left for manual reconciliation",
                    entry.id, attempts
                );
            }
            Ok(_) => {}
            Err(StoreError::MissingOutbox(_)) => {}
            Err(store_err) => {
                error!("Failed to record dispatch failure for {:?}: {}", entry.id, store_err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryBookingStore;
    use crate::notices;
    use boxoffice_core::notify::{RecordingMessenger, RecordingSeatLookup};
    use boxoffice_core::{BookingStore, CustomerId, NewBooking, ShowId, UuidKeyIssuer};

    struct Harness {
        store: Arc<InMemoryBookingStore>,
        seats: Arc<RecordingSeatLookup>,
        messenger: Arc<RecordingMessenger>,
        dispatcher: NotificationDispatcher,
    }

    fn harness() -> Harness {
        let store = Arc::new(InMemoryBookingStore::new());
        let seats = Arc::new(RecordingSeatLookup::new());
        let messenger = Arc::new(RecordingMessenger::new());
        let dispatcher = NotificationDispatcher::new(
            store.clone(),
            Arc::new(UuidKeyIssuer),
            seats.clone(),
            messenger.clone(),
        );
        Harness { store, seats, messenger, dispatcher }
    }

    async fn committed_entries(store: &InMemoryBookingStore) -> Vec<OutboxEntry> {
        let seats = ["A1", "A2"].iter().map(|s| s.parse().unwrap()).collect();
        let request = NewBooking::new(ShowId(1), CustomerId(7), seats, 100);
        let mut outbox = notices::seat_changes(ShowId(1), &request.seats, true);
        outbox.push(Notification::CustomerMessage {
            customer_id: CustomerId(7),
            header: "Hello".to_string(),
            body: "World".to_string(),
        });
        store.insert(request, outbox).await.unwrap().outbox
    }

    #[tokio::test]
    async fn test_dispatch_delivers_and_clears_outbox() {
        let h = harness();
        let entries = committed_entries(&h.store).await;

        let report = h.dispatcher.dispatch(&entries).await;

        assert_eq!(report, DispatchReport { delivered: 3, failed: 0, skipped: 0 });
        assert_eq!(h.seats.calls().len(), 2);
        assert_eq!(h.messenger.messages().len(), 1);
        assert_eq!(h.store.outbox_len().await, 0);

        let keys: std::collections::HashSet<String> = h.seats.calls().into_iter().map(|c| c.3).collect();
        assert_eq!(keys.len(), 2);
    }

    #[tokio::test]
    async fn test_failure_is_recorded_and_retried_with_same_key() {
        let h = harness();
        let entries = committed_entries(&h.store).await;

        h.seats.set_failing(true);
        let report = h.dispatcher.dispatch(&entries).await;
        assert_eq!(report.failed, 2);
        assert_eq!(report.delivered, 1);
        assert_eq!(h.store.outbox_len().await, 2);

        let later = Utc::now() + chrono::Duration::seconds(60);
        let pending = h.store.pending(10, later, 10).await.unwrap();
        assert!(pending.iter().all(|e| e.attempts == 1 && e.key.is_some()));
        let first_keys: Vec<String> = pending.iter().filter_map(|e| e.key.clone()).collect();

        h.seats.set_failing(false);
        let report = h.dispatcher.relay_pending(&RelayPolicy::default(), later).await.unwrap();
        assert_eq!(report.delivered, 2);

        let sent_keys: Vec<String> = h.seats.calls().into_iter().map(|c| c.3).collect();
        assert_eq!(sent_keys, first_keys);
        assert_eq!(h.store.outbox_len().await, 0);
    }

    #[tokio::test]
    async fn test_relay_respects_grace_period() {
        let h = harness();
        committed_entries(&h.store).await;

        let report = h.dispatcher.relay_pending(&RelayPolicy::default(), Utc::now()).await.unwrap();
        assert_eq!(report, DispatchReport::default());
        assert_eq!(h.store.outbox_len().await, 3);
    }

    #[tokio::test]
    async fn test_entry_delivered_elsewhere_is_skipped() {
        let h = harness();
        let entries = committed_entries(&h.store).await;
        for entry in &entries {
            h.store.mark_delivered(entry.id).await.unwrap();
        }

        let report = h.dispatcher.dispatch(&entries).await;
        assert_eq!(report.skipped, 3);
        assert!(h.seats.calls().is_empty());
    }
}
