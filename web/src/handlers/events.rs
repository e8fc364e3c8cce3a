//! Event endpoints:
//! - POST /events - create an event and seed its counter
//! - GET /events/:id - capacity and availability
//! - GET /events/:id/availability - live ticket count

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ticket_holds_core::types::EventId;
use uuid::Uuid;

/// Request body for creating an event.
#[derive(Debug, Deserialize)]
pub struct CreateEventRequest {
    /// Display title
    pub title: String,
    /// Total sellable tickets
    pub capacity: u32,
}

/// Created event.
#[derive(Debug, Serialize)]
pub struct EventResponse {
    /// Event ID
    pub event_id: Uuid,
    /// Display title
    pub title: String,
    /// Total sellable tickets
    pub capacity: u32,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Capacity view of an event.
#[derive(Debug, Serialize)]
pub struct EventDetailsResponse {
    /// Event ID
    pub event_id: Uuid,
    /// Total sellable tickets
    pub capacity: u32,
    /// Tickets not committed to a confirmed booking
    pub available_tickets: u32,
    /// Tickets neither held nor booked
    pub available: i64,
}

/// Live availability of an event.
#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    /// Event ID
    pub event_id: Uuid,
    /// Tickets neither held nor booked
    pub available: i64,
}

/// Create an event.
///
/// ```bash
/// curl -X POST http://localhost:8080/events \
///   -H 'content-type: application/json' \
///   -d '{"title":"Concert","capacity":100}'
/// ```
pub async fn create_event(
    State(state): State<AppState>,
    Json(request): Json<CreateEventRequest>,
) -> Result<(StatusCode, Json<EventResponse>), AppError> {
    if request.title.trim().is_empty() {
        return Err(AppError::bad_request("title must not be empty"));
    }

    let event = state.manager.create_event(request.title, request.capacity).await?;

    Ok((
        StatusCode::CREATED,
        Json(EventResponse {
            event_id: *event.id.as_uuid(),
            title: event.title,
            capacity: event.capacity,
            created_at: event.created_at,
        }),
    ))
}

/// Tickets currently available for an event.
///
/// ```bash
/// curl http://localhost:8080/events/550e8400-e29b-41d4-a716-446655440000/availability
/// # {"event_id":"550e8400-...","available":42}
/// ```
pub async fn get_availability(
    Path(event_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    let available = state.manager.available(EventId::from_uuid(event_id)).await?;
    Ok(Json(AvailabilityResponse { event_id, available }))
}

/// Capacity, booked and live figures for an event.
///
/// ```bash
/// curl http://localhost:8080/events/$EVENT
/// # {"event_id":"...","capacity":100,"available_tickets":90,"available":84}
/// ```
pub async fn get_event(
    Path(event_id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<EventDetailsResponse>, AppError> {
    let id = EventId::from_uuid(event_id);
    let event = state.manager.get_event(id).await?;
    let available = state.manager.available(id).await?;

    Ok(Json(EventDetailsResponse {
        event_id,
        capacity: event.capacity,
        available_tickets: event.available_tickets,
        available,
    }))
}
