pub mod models;

pub use models::events::{CustomerMessageEvent, SeatOccupancyEvent};

/// Topic consumed by the seat-lookup service.
pub const SEAT_OCCUPANCY_TOPIC: &str = "seats.occupancy";
/// Topic consumed by the messaging service.
pub const CUSTOMER_MESSAGES_TOPIC: &str = "customers.messages";
