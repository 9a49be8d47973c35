use axum::{
    extract::{Path, State},
    routing::{get, put},
    Json, Router,
};
use boxoffice_booking::SeatMatrix;
use boxoffice_core::ShowId;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::idempotency::InboundKey;
use crate::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct ShowCancellationResponse {
    pub show_id: i64,
    pub affected_customers: usize,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/shows/{show_id}/cancel", put(cancel_show))
        .route("/v1/shows/{show_id}/seats", get(seat_matrix))
}

/// PUT /v1/shows/{show_id}/cancel
pub async fn cancel_show(
    State(state): State<AppState>,
    Path(show_id): Path<i64>,
    InboundKey(key): InboundKey,
) -> Result<Json<ShowCancellationResponse>, AppError> {
    let affected_customers = state.bookings.cancel_show(ShowId(show_id), &key).await?;
    Ok(Json(ShowCancellationResponse {
        show_id,
        affected_customers,
    }))
}

/// GET /v1/shows/{show_id}/seats
/// Occupancy grid: one row per seat row, 1 for booked, 0 for free.
pub async fn seat_matrix(
    State(state): State<AppState>,
    Path(show_id): Path<i64>,
) -> Result<Json<SeatMatrix>, AppError> {
    Ok(Json(state.bookings.project_occupancy(ShowId(show_id)).await?))
}
