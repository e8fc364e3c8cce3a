//! Error types for web handlers.
//!
//! [`AppError`] bridges the hold error taxonomy and HTTP responses. Client
//! errors carry the domain message; server errors carry a fixed message and
//! keep the underlying failure as a logged source, so counter store details
//! never reach the response body.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::fmt;
use ticket_holds_core::error::{HoldError, RepositoryError};

/// Application error type for web handlers.
///
/// # Examples
///
/// ```ignore
/// async fn handler(State(state): State<AppState>) -> Result<Json<Data>, AppError> {
///     let hold = state.manager.hold_tickets(event_id, user_id, 2).await?;
///     Ok(Json(hold.into()))
/// }
/// ```
#[derive(Debug)]
pub struct AppError {
    /// HTTP status code
    status: StatusCode,
    /// Error message (user-facing)
    message: String,
    /// Error code (for client error handling)
    code: &'static str,
    /// Internal error (for logging, not exposed to client)
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub fn new(status: StatusCode, message: impl Into<String>, code: &'static str) -> Self {
        Self {
            status,
            message: message.into(),
            code,
            source: None,
        }
    }

    /// Attach the underlying failure for logging.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Create a 400 Bad Request error.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message, "BAD_REQUEST")
    }

    /// Create a 404 Not Found error.
    #[must_use]
    pub fn not_found(resource: impl fmt::Display, id: impl fmt::Display) -> Self {
        Self::new(
            StatusCode::NOT_FOUND,
            format!("{resource} with id {id} not found"),
            "NOT_FOUND",
        )
    }

    /// Create a 500 Internal Server Error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message, "INTERNAL_SERVER_ERROR")
    }

    /// Create a 503 Service Unavailable error.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, message, "SERVICE_UNAVAILABLE")
    }

    /// HTTP status of the response.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<HoldError> for AppError {
    fn from(err: HoldError) -> Self {
        match &err {
            HoldError::InvalidQuantity => {
                Self::new(StatusCode::BAD_REQUEST, err.to_string(), "INVALID_QUANTITY")
            }
            HoldError::InvalidCapacity { .. } => {
                Self::new(StatusCode::BAD_REQUEST, err.to_string(), "INVALID_CAPACITY")
            }
            HoldError::EventNotFound(event_id) => Self::not_found("Event", event_id),
            HoldError::InsufficientInventory { .. } => {
                Self::new(StatusCode::CONFLICT, err.to_string(), "INSUFFICIENT_INVENTORY")
            }
            HoldError::HoldAlreadyExists => {
                Self::new(StatusCode::CONFLICT, err.to_string(), "HOLD_ALREADY_EXISTS")
            }
            HoldError::HoldExpired => Self::new(StatusCode::GONE, err.to_string(), "HOLD_EXPIRED"),
            HoldError::LockUnavailable { .. } => {
                Self::new(StatusCode::SERVICE_UNAVAILABLE, err.to_string(), "EVENT_BUSY")
            }
            HoldError::Store { .. } => Self::unavailable("Ticket inventory is temporarily unavailable")
                .with_source(err.clone()),
            HoldError::Repository { source, .. } => match source {
                RepositoryError::NotFound(what) => {
                    Self::new(StatusCode::NOT_FOUND, format!("{what} not found"), "NOT_FOUND")
                }
                RepositoryError::Conflict(what) => {
                    Self::new(StatusCode::CONFLICT, what.clone(), "CONFLICT")
                }
                RepositoryError::Database(_) => {
                    Self::unavailable("Booking store is temporarily unavailable")
                        .with_source(err.clone())
                }
            },
            HoldError::InvariantViolation { .. } => {
                Self::internal("Ticket inventory is inconsistent").with_source(err.clone())
            }
        }
    }
}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    /// Error code (for client error handling).
    code: &'static str,
    /// Human-readable error message.
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            match &self.source {
                Some(source) => tracing::error!(
                    status = %self.status,
                    code = self.code,
                    error = %source,
                    "request failed"
                ),
                None => tracing::error!(status = %self.status, code = self.code, "request failed"),
            }
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
        };

        (self.status, Json(body)).into_response()
    }
}

/// Convert `anyhow::Error` to `AppError`.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal("An internal error occurred").with_source(err)
    }
}
