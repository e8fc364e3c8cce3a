//! Hold endpoints:
//! - POST /events/:id/holds - place a hold
//! - GET /events/:id/holds/:user - read an active hold
//! - DELETE /events/:id/holds/:user - release a hold (idempotent)
//! - POST /events/:id/holds/:user/promote - turn a hold into a booking

use crate::error::AppError;
use crate::handlers::bookings::BookingResponse;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ticket_holds_core::error::HoldError;
use ticket_holds_core::types::{EventId, Hold, UserId};
use uuid::Uuid;

/// Request body for placing a hold.
///
/// `quantity` is signed so that negative values reach the domain check
/// instead of failing JSON decoding.
#[derive(Debug, Deserialize)]
pub struct HoldRequest {
    /// User placing the hold
    pub user_id: Uuid,
    /// Tickets requested
    pub quantity: i64,
}

/// An active hold.
#[derive(Debug, Serialize)]
pub struct HoldResponse {
    /// Event ID
    pub event_id: Uuid,
    /// User ID
    pub user_id: Uuid,
    /// Tickets held
    pub quantity: u32,
    /// When the hold lapses
    pub expires_at: DateTime<Utc>,
}

impl From<Hold> for HoldResponse {
    fn from(hold: Hold) -> Self {
        Self {
            event_id: *hold.event_id.as_uuid(),
            user_id: *hold.user_id.as_uuid(),
            quantity: hold.quantity,
            expires_at: hold.expires_at,
        }
    }
}

/// Outcome of a release.
#[derive(Debug, Serialize)]
pub struct ReleaseResponse {
    /// Whether a hold existed and was released
    pub released: bool,
    /// Tickets returned to the pool
    pub quantity: u32,
}

/// Place a hold.
///
/// ```bash
/// curl -X POST http://localhost:8080/events/$EVENT/holds \
///   -H 'content-type: application/json' \
///   -d '{"user_id":"'$USER'","quantity":2}'
/// ```
pub async fn hold_tickets(
    Path(event_id): Path<Uuid>,
    State(state): State<AppState>,
    Json(request): Json<HoldRequest>,
) -> Result<(StatusCode, Json<HoldResponse>), AppError> {
    let quantity = u32::try_from(request.quantity).map_err(|_| HoldError::InvalidQuantity)?;

    let hold = state
        .manager
        .hold_tickets(
            EventId::from_uuid(event_id),
            UserId::from_uuid(request.user_id),
            quantity,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(hold.into())))
}

/// Read the active hold of a user.
pub async fn get_hold(
    Path((event_id, user_id)): Path<(Uuid, Uuid)>,
    State(state): State<AppState>,
) -> Result<Json<HoldResponse>, AppError> {
    state
        .manager
        .get_hold(EventId::from_uuid(event_id), UserId::from_uuid(user_id))
        .await?
        .map(|hold| Json(hold.into()))
        .ok_or_else(|| AppError::not_found("Hold for user", user_id))
}

/// Release a hold. Releasing a missing hold succeeds.
pub async fn release_hold(
    Path((event_id, user_id)): Path<(Uuid, Uuid)>,
    State(state): State<AppState>,
) -> Result<Json<ReleaseResponse>, AppError> {
    let released = state
        .manager
        .release_hold(EventId::from_uuid(event_id), UserId::from_uuid(user_id))
        .await?;

    Ok(Json(ReleaseResponse {
        released: released.is_some(),
        quantity: released.map_or(0, |hold| hold.quantity),
    }))
}

/// Promote a hold into a confirmed booking.
pub async fn promote_hold(
    Path((event_id, user_id)): Path<(Uuid, Uuid)>,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<BookingResponse>), AppError> {
    let booking = state
        .promoter
        .promote_hold(EventId::from_uuid(event_id), UserId::from_uuid(user_id))
        .await?;

    Ok((StatusCode::CREATED, Json(booking.into())))
}
