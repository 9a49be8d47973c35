use boxoffice_booking::BookingService;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub bookings: Arc<BookingService>,
}

impl AppState {
    pub fn new(bookings: Arc<BookingService>) -> Self {
        Self { bookings }
    }
}
