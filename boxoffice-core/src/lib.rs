pub mod booking;
pub mod idempotency;
pub mod notify;
pub mod repository;
pub mod seat;

pub use booking::{Booking, BookingId, BookingStatus, CustomerId, NewBooking, ShowId};
pub use idempotency::{Acquire, IdempotencyRegistry, KeyState, LeaseToken, RegistryError, RegistryResult};
pub use notify::{
    DispatchError, DispatchResult, KeyIssuer, Messenger, Notification, OutboxEntry, OutboxId, SeatLookup,
    UuidKeyIssuer,
};
pub use repository::{BookingStore, Committed, OutboxStore, StoreError, StoreResult};
pub use seat::{SeatId, SeatLayout, SeatParseError};
