//! Axum request layer for ticket holds.
//!
//! Every handler goes through [`HoldManager`](ticket_holds_runtime::HoldManager)
//! or [`BookingPromoter`](ticket_holds_runtime::BookingPromoter) and maps the
//! result with [`AppError`].
//!
//! # Routes
//!
//! | Method | Path | Operation |
//! |--------|------|-----------|
//! | `GET` | `/health` | liveness |
//! | `POST` | `/events` | create an event |
//! | `GET` | `/events/:id` | capacity and availability |
//! | `GET` | `/events/:id/availability` | live ticket count |
//! | `POST` | `/events/:id/holds` | place a hold |
//! | `GET` | `/events/:id/holds/:user` | read a hold |
//! | `DELETE` | `/events/:id/holds/:user` | release a hold |
//! | `POST` | `/events/:id/holds/:user/promote` | book the held tickets |
//! | `GET` | `/bookings/:id` | read a booking |
//! | `DELETE` | `/bookings/:id` | cancel a booking |
//!
//! # Example
//!
//! ```ignore
//! use ticket_holds_web::{AppState, build_router};
//!
//! let app = build_router(AppState::new(manager));
//! axum::serve(listener, app).await?;
//! ```

pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use error::AppError;
pub use routes::build_router;
pub use state::AppState;
