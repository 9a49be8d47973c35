use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::seat::{join_seats, SeatId};

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Store-assigned booking identifier.
    BookingId
);
id_type!(ShowId);
id_type!(CustomerId);

/// Booking status, derived from the `paid` and `used` flags.
///
/// Cancelled bookings are deleted, so there is no `Cancelled` variant.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Paid,
    Used,
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Paid => "PAID",
            BookingStatus::Used => "USED",
        };
        f.write_str(label)
    }
}

/// A customer's claim on a set of seats for one show.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Booking {
    pub id: BookingId,
    pub show_id: ShowId,
    pub customer_id: CustomerId,
    pub seats: BTreeSet<SeatId>,
    pub amount: i64,
    pub paid: bool,
    pub used: bool,
    pub created_at: DateTime<Utc>,
}

impl Booking {
    pub fn status(&self) -> BookingStatus {
        if self.used {
            BookingStatus::Used
        } else if self.paid {
            BookingStatus::Paid
        } else {
            BookingStatus::Pending
        }
    }

    pub fn seat_list(&self) -> String {
        join_seats(&self.seats)
    }
}

/// A reservation that has passed the seat check but has no identifier yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBooking {
    pub show_id: ShowId,
    pub customer_id: CustomerId,
    pub seats: BTreeSet<SeatId>,
    pub amount: i64,
    pub created_at: DateTime<Utc>,
}

impl NewBooking {
    pub fn new(show_id: ShowId, customer_id: CustomerId, seats: BTreeSet<SeatId>, amount: i64) -> Self {
        Self {
            show_id,
            customer_id,
            seats,
            amount,
            created_at: Utc::now(),
        }
    }

    /// Materializes the booking once the store has assigned an id.
    pub fn into_booking(self, id: BookingId) -> Booking {
        Booking {
            id,
            show_id: self.show_id,
            customer_id: self.customer_id,
            seats: self.seats,
            amount: self.amount,
            paid: false,
            used: false,
            created_at: self.created_at,
        }
    }
}
