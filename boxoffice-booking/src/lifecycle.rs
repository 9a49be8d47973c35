//! Booking state machine.
//!
//! ```text
//! Pending --pay--> Paid --validate--> Used
//!    |               |
//!    +----cancel-----+--> (deleted)
//! ```
//!
//! Transitions are pure: they inspect and mutate a `Booking` in memory and the
//! caller persists the result.

use boxoffice_core::Booking;

use crate::error::{BookingError, BookingResult, StateViolation};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Changed,
    Unchanged,
}

/// Pending → Paid. Paying a booking that is already paid (or used) is a
/// no-op success.
pub fn apply_payment(booking: &mut Booking) -> BookingResult<Transition> {
    if booking.paid {
        return Ok(Transition::Unchanged);
    }
    booking.paid = true;
    Ok(Transition::Changed)
}

/// Paid → Used.
///
/// Checks run in a fixed order: `used` first, then `paid`. A booking that is
/// somehow used but unpaid therefore reports "already validated".
pub fn apply_validation(booking: &mut Booking) -> BookingResult<Transition> {
    if booking.used {
        return Err(BookingError::InvalidState(StateViolation::AlreadyValidated));
    }
    if !booking.paid {
        return Err(BookingError::InvalidState(StateViolation::NotPaid));
    }
    booking.used = true;
    Ok(Transition::Changed)
}

/// Pending|Paid → cancelled. Used tickets cannot be cancelled.
pub fn check_cancellable(booking: &Booking) -> BookingResult<()> {
    if booking.used {
        return Err(BookingError::InvalidState(StateViolation::AlreadyUsed));
    }
    Ok(())
}

/// Amount owed back to the customer when the booking is removed.
pub fn refund_due(booking: &Booking) -> Option<i64> {
    booking.paid.then_some(booking.amount)
}

#[cfg(test)]
mod tests {
    use super::*;
    use boxoffice_core::{BookingId, BookingStatus, CustomerId, NewBooking, ShowId};

    fn pending() -> Booking {
        let seats = ["A1"].iter().map(|s| s.parse().unwrap()).collect();
        NewBooking::new(ShowId(1), CustomerId(7), seats, 100).into_booking(BookingId(1))
    }

    #[test]
    fn test_booking_lifecycle() {
        let mut booking = pending();

        assert_eq!(apply_payment(&mut booking).unwrap(), Transition::Changed);
        assert_eq!(booking.status(), BookingStatus::Paid);

        assert_eq!(apply_validation(&mut booking).unwrap(), Transition::Changed);
        assert_eq!(booking.status(), BookingStatus::Used);

        let second = apply_validation(&mut booking);
        assert!(matches!(second, Err(BookingError::InvalidState(StateViolation::AlreadyValidated))));
    }

    #[test]
    fn test_repay_is_noop() {
        let mut booking = pending();
        apply_payment(&mut booking).unwrap();
        assert_eq!(apply_payment(&mut booking).unwrap(), Transition::Unchanged);
        assert!(booking.paid);
    }

    #[test]
    fn test_validate_unpaid() {
        let mut booking = pending();
        let result = apply_validation(&mut booking);

        assert!(matches!(result, Err(BookingError::InvalidState(StateViolation::NotPaid))));
        assert!(!booking.used);
    }

    #[test]
    fn test_used_check_precedes_paid_check() {
        let mut booking = pending();
        booking.used = true;

        let result = apply_validation(&mut booking);
        assert!(matches!(result, Err(BookingError::InvalidState(StateViolation::AlreadyValidated))));
    }

    #[test]
    fn test_cancel_rules() {
        let mut booking = pending();
        assert!(check_cancellable(&booking).is_ok());
        assert_eq!(refund_due(&booking), None);

        booking.paid = true;
        assert!(check_cancellable(&booking).is_ok());
        assert_eq!(refund_due(&booking), Some(100));

        booking.used = true;
        assert!(matches!(
            check_cancellable(&booking),
            Err(BookingError::InvalidState(StateViolation::AlreadyUsed))
        ));
    }
}
