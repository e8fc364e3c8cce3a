//! Booking endpoints:
//! - GET /bookings/:id - read a booking
//! - DELETE /bookings/:id - cancel a booking and return its tickets

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use ticket_holds_core::types::{Booking, BookingId, BookingStatus};
use uuid::Uuid;

/// A booking.
#[derive(Debug, Serialize)]
pub struct BookingResponse {
    /// Booking ID
    pub booking_id: Uuid,
    /// Event ID
    pub event_id: Uuid,
    /// User ID
    pub user_id: Uuid,
    /// Tickets booked
    pub quantity: u32,
    /// Booking status
    pub status: BookingStatus,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last status change
    pub updated_at: DateTime<Utc>,
}

impl From<Booking> for BookingResponse {
    fn from(booking: Booking) -> Self {
        Self {
            booking_id: *booking.id.as_uuid(),
            event_id: *booking.event_id.as_uuid(),
            user_id: *booking.user_id.as_uuid(),
            quantity: booking.quantity,
            status: booking.status,
            created_at: booking.created_at,
            updated_at: booking.updated_at,
        }
    }
}

/// Read a booking.
///
/// ```bash
/// curl http://localhost:8080/bookings/$BOOKING
/// ```
pub async fn get_booking(
    Path(booking_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<BookingResponse>, AppError> {
    let booking = state
        .promoter
        .get_booking(BookingId::from_uuid(booking_id))
        .await?;
    Ok(Json(booking.into()))
}

/// Cancel a confirmed booking. Cancelling twice is a conflict.
pub async fn cancel_booking(
    Path(booking_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<BookingResponse>, AppError> {
    let booking = state
        .promoter
        .cancel_booking(BookingId::from_uuid(booking_id))
        .await?;
    Ok(Json(booking.into()))
}
