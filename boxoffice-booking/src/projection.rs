use boxoffice_core::{Booking, BookingId, SeatId, SeatLayout};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProjectionError {
    #[error("Booking {booking} holds seat {seat} outside the hall grid")]
    OutOfGrid {
        booking: BookingId,
        seat: SeatId,
    },
}

/// Occupancy grid of one show: `cells[row][column]` is 1 when booked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeatMatrix {
    pub rows: Vec<char>,
    pub columns: u8,
    pub cells: Vec<Vec<u8>>,
}

impl SeatMatrix {
    pub fn empty(layout: &SeatLayout) -> Self {
        Self {
            rows: layout.row_labels().to_vec(),
            columns: layout.columns(),
            cells: vec![vec![0; layout.columns() as usize]; layout.rows() as usize],
        }
    }

    pub fn is_occupied(&self, seat: SeatId) -> bool {
        self.cells
            .get(seat.row() as usize)
            .and_then(|row| row.get(seat.column() as usize))
            .is_some_and(|cell| *cell == 1)
    }

    pub fn occupied(&self) -> usize {
        self.cells.iter().flatten().filter(|cell| **cell == 1).count()
    }

    pub fn available(&self) -> usize {
        self.rows.len() * self.columns as usize - self.occupied()
    }
}

/// Builds the grid from the show's active bookings.
pub fn project(layout: &SeatLayout, bookings: &[Booking]) -> Result<SeatMatrix, ProjectionError> {
    let mut matrix = SeatMatrix::empty(layout);

    for booking in bookings {
        for seat in &booking.seats {
            if !layout.contains(*seat) {
                return Err(ProjectionError::OutOfGrid {
                    booking: booking.id,
                    seat: *seat,
                });
            }
            matrix.cells[seat.row() as usize][seat.column() as usize] = 1;
        }
    }

    Ok(matrix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use boxoffice_core::{CustomerId, NewBooking, ShowId};

    fn booking(id: i64, list: &[&str]) -> Booking {
        let seats = list.iter().map(|s| s.parse().unwrap()).collect();
        NewBooking::new(ShowId(1), CustomerId(1), seats, 10).into_booking(BookingId(id))
    }

    #[test]
    fn test_projection_marks_booked_seats() {
        let layout = SeatLayout::default();
        let matrix = project(&layout, &[booking(1, &["A1", "A2"]), booking(2, &["G9"])]).unwrap();

        assert_eq!(matrix.cells.len(), 7);
        assert_eq!(matrix.cells[0], vec![0, 1, 1, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(matrix.cells[6][9], 1);
        assert!(matrix.is_occupied("A1".parse().unwrap()));
        assert!(!matrix.is_occupied("A3".parse().unwrap()));
        assert_eq!(matrix.occupied(), 3);
        assert_eq!(matrix.available(), 67);
    }

    #[test]
    fn test_out_of_grid_seat_is_surfaced() {
        let layout = SeatLayout::new(2, 5).unwrap();
        let result = project(&layout, &[booking(4, &["C1"])]);

        assert_eq!(
            result,
            Err(ProjectionError::OutOfGrid {
                booking: BookingId(4),
                seat: "C1".parse().unwrap(),
            })
        );
    }

    #[test]
    fn test_empty_show() {
        let matrix = project(&SeatLayout::default(), &[]).unwrap();
        assert_eq!(matrix.occupied(), 0);
        assert_eq!(matrix.rows, vec!['A', 'B', 'C', 'D', 'E', 'F', 'G']);
    }
}
