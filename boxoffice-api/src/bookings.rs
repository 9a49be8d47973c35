use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use boxoffice_booking::BookingError;
use boxoffice_core::{Booking, BookingId, CustomerId, SeatId, SeatParseError, ShowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::AppError;
use crate::idempotency::InboundKey;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    pub customer_id: i64,
    pub seats: Vec<String>,
    pub amount: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BookingResponse {
    pub id: i64,
    pub show_id: i64,
    pub customer_id: i64,
    pub seats: Vec<String>,
    pub amount: i64,
    pub status: String,
    pub paid: bool,
    pub used: bool,
    pub created_at: DateTime<Utc>,
}

impl From<Booking> for BookingResponse {
    fn from(booking: Booking) -> Self {
        Self {
            id: booking.id.0,
            show_id: booking.show_id.0,
            customer_id: booking.customer_id.0,
            seats: booking.seats.iter().map(|seat| seat.to_string()).collect(),
            amount: booking.amount,
            status: booking.status().to_string(),
            paid: booking.paid,
            used: booking.used,
            created_at: booking.created_at,
        }
    }
}

fn respond(bookings: Vec<Booking>) -> Json<Vec<BookingResponse>> {
    Json(bookings.into_iter().map(BookingResponse::from).collect())
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/shows/{show_id}/bookings", post(create_booking).get(list_show_bookings))
        .route("/v1/bookings", get(list_bookings))
        .route("/v1/bookings/{id}", get(get_booking).delete(cancel_booking))
        .route("/v1/bookings/{id}/pay", put(pay_booking))
        .route("/v1/bookings/{id}/validate", put(validate_booking))
        .route("/v1/customers/{customer_id}/bookings", get(list_customer_bookings))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /v1/shows/{show_id}/bookings
pub async fn create_booking(
    State(state): State<AppState>,
    Path(show_id): Path<i64>,
    InboundKey(key): InboundKey,
    Json(req): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<BookingResponse>), AppError> {
    let seats = req
        .seats
        .iter()
        .map(|raw| raw.parse::<SeatId>())
        .collect::<Result<BTreeSet<SeatId>, SeatParseError>>()
        .map_err(BookingError::from)?;

    let booking = state
        .bookings
        .create(ShowId(show_id), CustomerId(req.customer_id), seats, req.amount, &key)
        .await?;

    Ok((StatusCode::CREATED, Json(booking.into())))
}

/// GET /v1/bookings
pub async fn list_bookings(State(state): State<AppState>) -> Result<Json<Vec<BookingResponse>>, AppError> {
    Ok(respond(state.bookings.list_all().await?))
}

/// GET /v1/bookings/{id}
pub async fn get_booking(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<BookingResponse>, AppError> {
    let booking = state.bookings.get(BookingId(id)).await?;
    Ok(Json(booking.into()))
}

/// PUT /v1/bookings/{id}/pay
pub async fn pay_booking(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<BookingResponse>, AppError> {
    let booking = state.bookings.pay(BookingId(id)).await?;
    Ok(Json(booking.into()))
}

/// PUT /v1/bookings/{id}/validate
pub async fn validate_booking(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    InboundKey(key): InboundKey,
) -> Result<Json<BookingResponse>, AppError> {
    let booking = state.bookings.validate(BookingId(id), &key).await?;
    Ok(Json(booking.into()))
}

/// DELETE /v1/bookings/{id}
/// Returns the booking as it was when cancelled.
pub async fn cancel_booking(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    InboundKey(key): InboundKey,
) -> Result<Json<BookingResponse>, AppError> {
    let booking = state.bookings.cancel(BookingId(id), &key).await?;
    Ok(Json(booking.into()))
}

/// GET /v1/shows/{show_id}/bookings
pub async fn list_show_bookings(
    State(state): State<AppState>,
    Path(show_id): Path<i64>,
) -> Result<Json<Vec<BookingResponse>>, AppError> {
    Ok(respond(state.bookings.list_for_show(ShowId(show_id)).await?))
}

/// GET /v1/customers/{customer_id}/bookings
pub async fn list_customer_bookings(
    State(state): State<AppState>,
    Path(customer_id): Path<i64>,
) -> Result<Json<Vec<BookingResponse>>, AppError> {
    Ok(respond(state.bookings.list_for_customer(CustomerId(customer_id)).await?))
}
