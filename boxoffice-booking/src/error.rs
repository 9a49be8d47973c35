use boxoffice_core::{RegistryError, SeatId, SeatParseError, StoreError};
use std::fmt;

use crate::projection::ProjectionError;

/// Why a transition was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateViolation {
    AlreadyValidated,
    NotPaid,
    AlreadyUsed,
}

impl fmt::Display for StateViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            StateViolation::AlreadyValidated => "already validated",
            StateViolation::NotPaid => "not paid",
            StateViolation::AlreadyUsed => "already used",
        };
        f.write_str(reason)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("Booking not found: {0}")]
    NotFound(String),

    #[error("Seat {0} is already booked")]
    Conflict(SeatId),

    #[error("Duplicate transaction: {0}")]
    DuplicateTransaction(String),

    #[error("Invalid state: {0}")]
    InvalidState(StateViolation),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error(transparent)]
    Seat(#[from] SeatParseError),

    #[error(transparent)]
    Projection(#[from] ProjectionError),

    #[error("Stored bookings overlap: {0}")]
    CorruptState(String),

    #[error(transparent)]
    Store(StoreError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl From<StoreError> for BookingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::SeatTaken(seat) => BookingError::Conflict(seat),
            StoreError::Missing(id) => BookingError::NotFound(id.to_string()),
            other => BookingError::Store(other),
        }
    }
}

pub type BookingResult<T> = Result<T, BookingError>;
