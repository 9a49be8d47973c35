use boxoffice_core::{Booking, BookingId, SeatId, ShowId};
use std::collections::{BTreeSet, HashMap};

use crate::error::{BookingError, BookingResult};

/// Seats held by the active bookings of one show.
pub struct SeatAvailability {
    held: HashMap<SeatId, BookingId>,
}

impl SeatAvailability {
    /// Indexes the given bookings, which must all belong to `show_id`.
    ///
    /// Fails with `CorruptState` if two bookings already share a seat or a
    /// booking of another show slipped in.
    pub fn from_bookings(show_id: ShowId, bookings: &[Booking]) -> BookingResult<Self> {
        let mut held = HashMap::with_capacity(bookings.iter().map(|b| b.seats.len()).sum());

        for booking in bookings {
            if booking.show_id != show_id {
                return Err(BookingError::CorruptState(format!(
                    "booking {} belongs to show {}, not {}",
                    booking.id, booking.show_id, show_id
                )));
            }
            for seat in &booking.seats {
                if let Some(other) = held.insert(*seat, booking.id) {
                    return Err(BookingError::CorruptState(format!(
                        "seat {} of show {} held by bookings {} and {}",
                        seat, show_id, other, booking.id
                    )));
                }
            }
        }

        Ok(Self { held })
    }

    pub fn is_free(&self, seat: SeatId) -> bool {
        !self.held.contains_key(&seat)
    }

    pub fn holder(&self, seat: SeatId) -> Option<BookingId> {
        self.held.get(&seat).copied()
    }

    pub fn held_count(&self) -> usize {
        self.held.len()
    }

    /// First requested seat (row-major) that is already held.
    pub fn first_conflict(&self, requested: &BTreeSet<SeatId>) -> Option<SeatId> {
        requested.iter().copied().find(|seat| !self.is_free(*seat))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use boxoffice_core::{CustomerId, NewBooking};

    fn seats(list: &[&str]) -> BTreeSet<SeatId> {
        list.iter().map(|s| s.parse().unwrap()).collect()
    }

    fn booking(id: i64, show: i64, list: &[&str]) -> Booking {
        NewBooking::new(ShowId(show), CustomerId(1), seats(list), 10).into_booking(BookingId(id))
    }

    #[test]
    fn test_first_conflict_is_row_major() {
        let index = SeatAvailability::from_bookings(ShowId(1), &[booking(1, 1, &["B1", "A3"])]).unwrap();

        assert_eq!(index.first_conflict(&seats(&["B1", "A3", "A4"])), Some("A3".parse().unwrap()));
        assert_eq!(index.first_conflict(&seats(&["A4", "C0"])), None);
        assert_eq!(index.holder("B1".parse().unwrap()), Some(BookingId(1)));
        assert_eq!(index.held_count(), 2);
    }

    #[test]
    fn test_overlapping_store_state_is_reported() {
        let result = SeatAvailability::from_bookings(
            ShowId(1),
            &[booking(1, 1, &["A1"]), booking(2, 1, &["A1", "A2"])],
        );
        assert!(matches!(result, Err(BookingError::CorruptState(_))));
    }

    #[test]
    fn test_foreign_show_is_reported() {
        let result = SeatAvailability::from_bookings(ShowId(1), &[booking(1, 2, &["A1"])]);
        assert!(matches!(result, Err(BookingError::CorruptState(_))));
    }
}
