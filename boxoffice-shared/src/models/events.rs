use chrono::Utc;

/// Desired occupancy of one seat, as published to the seat-lookup service.
///
/// Consumers upsert on `(show_id, seat)` and drop any event whose
/// `idempotency_key` they have already applied.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct SeatOccupancyEvent {
    pub show_id: i64,
    pub seat: String,
    pub occupied: bool,
    pub idempotency_key: String,
    pub emitted_at: i64,
}

impl SeatOccupancyEvent {
    pub fn new(show_id: i64, seat: String, occupied: bool, idempotency_key: String) -> Self {
        Self {
            show_id,
            seat,
            occupied,
            idempotency_key,
            emitted_at: Utc::now().timestamp(),
        }
    }

    pub fn to_payload(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// A message addressed to one customer, as published to the messaging service.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct CustomerMessageEvent {
    pub recipient_id: i64,
    pub header: String,
    pub body: String,
    pub idempotency_key: String,
    pub emitted_at: i64,
}

impl CustomerMessageEvent {
    pub fn new(recipient_id: i64, header: String, body: String, idempotency_key: String) -> Self {
        Self {
            recipient_id,
            header,
            body,
            idempotency_key,
            emitted_at: Utc::now().timestamp(),
        }
    }

    pub fn to_payload(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
