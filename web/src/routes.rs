//! Router configuration.

use crate::handlers::{bookings, events, health, holds};
use crate::state::AppState;
use axum::{
    Router,
    routing::{get, post},
};

/// Build the router with every endpoint.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_check))
        .route("/events", post(events::create_event))
        .route("/events/:id", get(events::get_event))
        .route("/events/:id/availability", get(events::get_availability))
        .route("/events/:id/holds", post(holds::hold_tickets))
        .route(
            "/events/:id/holds/:user",
            get(holds::get_hold).delete(holds::release_hold),
        )
        .route("/events/:id/holds/:user/promote", post(holds::promote_hold))
        .route(
            "/bookings/:id",
            get(bookings::get_booking).delete(bookings::cancel_booking),
        )
        .with_state(state)
}
