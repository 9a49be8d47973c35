use boxoffice_core::{Booking, CustomerId, Notification, SeatId, ShowId};
use std::collections::BTreeSet;

/// One seat-state notification per seat.
pub fn seat_changes(show_id: ShowId, seats: &BTreeSet<SeatId>, occupied: bool) -> Vec<Notification> {
    seats
        .iter()
        .map(|seat| Notification::SeatState {
            show_id,
            seat: *seat,
            occupied,
        })
        .collect()
}

fn message(customer_id: CustomerId, header: &str, body: String) -> Notification {
    Notification::CustomerMessage {
        customer_id,
        header: header.to_string(),
        body,
    }
}

pub fn payment_received(booking: &Booking) -> Notification {
    message(
        booking.customer_id,
        "Payment received",
        format!(
            "Booking {} for show {} is paid. Seats: {}. Amount: {}.",
            booking.id,
            booking.show_id,
            booking.seat_list(),
            booking.amount
        ),
    )
}

pub fn ticket_validated(booking: &Booking) -> Notification {
    message(
        booking.customer_id,
        "Ticket validated",
        format!("Your ticket for booking {} has been validated. Enjoy the show.", booking.id),
    )
}

pub fn booking_cancelled(booking: &Booking, refund: Option<i64>) -> Notification {
    let refund_line = match refund {
        Some(amount) => format!(" A refund of {} is on its way.", amount),
        None => String::new(),
    };
    message(
        booking.customer_id,
        "Booking cancelled",
        format!(
            "Booking {} for show {} (seats {}) was cancelled.{}",
            booking.id,
            booking.show_id,
            booking.seat_list(),
            refund_line
        ),
    )
}

pub fn show_cancelled(show_id: ShowId, customer_id: CustomerId, refund_total: i64) -> Notification {
    let body = if refund_total > 0 {
        format!(
            "Show {} has been cancelled. Your bookings were released and {} will be refunded.",
            show_id, refund_total
        )
    } else {
        format!("Show {} has been cancelled. Your bookings were released.", show_id)
    };
    message(customer_id, "Show cancelled", body)
}

pub fn booking_expired(booking: &Booking) -> Notification {
    message(
        booking.customer_id,
        "Booking expired",
        format!(
            "Booking {} for show {} was not paid in time and its seats ({}) were released.",
            booking.id,
            booking.show_id,
            booking.seat_list()
        ),
    )
}
