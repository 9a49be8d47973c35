pub mod availability;
pub mod dispatcher;
pub mod error;
pub mod idempotency;
pub mod lifecycle;
pub mod memory;
pub mod notices;
pub mod projection;
pub mod reservation;
pub mod service;

pub use dispatcher::{DispatchReport, NotificationDispatcher, RelayPolicy};
pub use error::{BookingError, BookingResult, StateViolation};
pub use idempotency::InMemoryIdempotencyRegistry;
pub use memory::InMemoryBookingStore;
pub use projection::{ProjectionError, SeatMatrix};
pub use reservation::{LockScope, SeatLedger, ShowLocks};
pub use service::BookingService;
