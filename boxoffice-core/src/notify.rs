use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use uuid::Uuid;

use crate::booking::{CustomerId, ShowId};
use crate::repository::StoreError;
use crate::seat::SeatId;

/// Outbound work produced by a committed state change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    SeatState {
        show_id: ShowId,
        seat: SeatId,
        occupied: bool,
    },
    CustomerMessage {
        customer_id: CustomerId,
        header: String,
        body: String,
    },
}

impl Notification {
    /// Short text handed to the key issuer.
    pub fn describe(&self) -> String {
        match self {
            Notification::SeatState { show_id, seat, occupied } => {
                let state = if *occupied { "occupied" } else { "free" };
                format!("seat {} of show {} {}", seat, show_id, state)
            }
            Notification::CustomerMessage { customer_id, header, .. } => {
                format!("message '{}' to customer {}", header, customer_id)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutboxId(pub i64);

/// A persisted notification that has not been confirmed by its collaborator yet.
///
/// `key` is set on the first delivery attempt and reused by every retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxEntry {
    pub id: OutboxId,
    pub notification: Notification,
    pub key: Option<String>,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Key issuance failed: {0}")]
    Issuer(String),

    #[error("Downstream call failed: {0}")]
    Downstream(String),

    #[error("Outbox update failed: {0}")]
    Outbox(#[from] StoreError),
}

pub type DispatchResult<T> = Result<T, DispatchError>;

/// Mints idempotency keys for outbound calls.
#[async_trait]
pub trait KeyIssuer: Send + Sync {
    async fn issue(&self, description: &str) -> DispatchResult<String>;
}

/// Seat-lookup collaborator: idempotent upsert of one seat's occupancy.
#[async_trait]
pub trait SeatLookup: Send + Sync {
    async fn upsert(&self, show_id: ShowId, seat: SeatId, occupied: bool, key: &str) -> DispatchResult<()>;
}

/// Messaging collaborator: idempotent delivery of one customer message.
#[async_trait]
pub trait Messenger: Send + Sync {
    async fn deliver(&self, recipient: CustomerId, header: &str, body: &str, key: &str) -> DispatchResult<()>;
}

pub struct UuidKeyIssuer;

#[async_trait]
impl KeyIssuer for UuidKeyIssuer {
    async fn issue(&self, description: &str) -> DispatchResult<String> {
        let key = Uuid::new_v4().to_string();
        tracing::debug!("Issued key {} for {}", key, description);
        Ok(key)
    }
}

/// In-process seat-lookup that records every call. Used by tests and local runs.
#[derive(Default)]
pub struct RecordingSeatLookup {
    calls: Mutex<Vec<(ShowId, SeatId, bool, String)>>,
    failing: Mutex<bool>,
}

impl RecordingSeatLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap_or_else(|e| e.into_inner()) = failing;
    }

    pub fn calls(&self) -> Vec<(ShowId, SeatId, bool, String)> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl SeatLookup for RecordingSeatLookup {
    async fn upsert(&self, show_id: ShowId, seat: SeatId, occupied: bool, key: &str) -> DispatchResult<()> {
        if *self.failing.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(DispatchError::Downstream("seat-lookup unavailable".to_string()));
        }
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((show_id, seat, occupied, key.to_string()));
        Ok(())
    }
}

/// In-process messenger that records every delivery.
#[derive(Default)]
pub struct RecordingMessenger {
    messages: Mutex<Vec<(CustomerId, String, String, String)>>,
    failing: Mutex<bool>,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap_or_else(|e| e.into_inner()) = failing;
    }

    pub fn messages(&self) -> Vec<(CustomerId, String, String, String)> {
        self.messages.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn deliver(&self, recipient: CustomerId, header: &str, body: &str, key: &str) -> DispatchResult<()> {
        if *self.failing.lock().unwrap_or_else(|e| e.into_inner()) {
            return Err(DispatchError::Downstream("messaging unavailable".to_string()));
        }
        self.messages.lock().unwrap_or_else(|e| e.into_inner()).push((
            recipient,
            header.to_string(),
            body.to_string(),
            key.to_string(),
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_json_is_tagged() {
        let notification = Notification::SeatState {
            show_id: ShowId(1),
            seat: "A2".parse().unwrap(),
            occupied: true,
        };
        let value = serde_json::to_value(&notification).unwrap();

        assert_eq!(value["kind"], "seat_state");
        assert_eq!(value["seat"], "A2");
        assert_eq!(serde_json::from_value::<Notification>(value).unwrap(), notification);
    }

    #[tokio::test]
    async fn test_recording_messenger_failure_toggle() {
        let messenger = RecordingMessenger::new();
        messenger.set_failing(true);
        assert!(messenger.deliver(CustomerId(7), "h", "b", "k").await.is_err());

        messenger.set_failing(false);
        messenger.deliver(CustomerId(7), "h", "b", "k").await.unwrap();
        assert_eq!(messenger.messages().len(), 1);
    }
}
