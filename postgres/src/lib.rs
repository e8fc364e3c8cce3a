//! `PostgreSQL` repositories for ticket holds.
//!
//! This crate provides the transactional store consumed by the hold
//! subsystem: [`PostgresEventRepository`] and [`PostgresBookingRepository`]
//! on a shared `sqlx` pool. Each write is its own transaction.
//!
//! # Example
//!
//! ```ignore
//! use ticket_holds_postgres::{connect, migrate, PostgresBookingRepository};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = connect("postgres://localhost/tickets", 10).await?;
//!     migrate(&pool).await?;
//!     let bookings = PostgresBookingRepository::new(pool);
//!     Ok(())
//! }
//! ```

mod bookings;
mod events;

pub use bookings::PostgresBookingRepository;
pub use events::PostgresEventRepository;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use ticket_holds_core::error::RepositoryError;

/// Open a connection pool.
///
/// # Errors
///
/// Returns [`RepositoryError::Database`] if the database is unreachable.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<PgPool, RepositoryError> {
    PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(database_url)
        .await
        .map_err(|e| RepositoryError::Database(format!("Failed to connect: {e}")))
}

/// Create or upgrade the `events` and `bookings` tables.
///
/// # Errors
///
/// Returns [`RepositoryError::Database`] if a migration fails.
pub async fn migrate(pool: &PgPool) -> Result<(), RepositoryError> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| RepositoryError::Database(format!("Migration failed: {e}")))
}

/// Classify a `sqlx` failure.
pub(crate) fn map_sqlx_error(what: &str, err: sqlx::Error) -> RepositoryError {
    match &err {
        sqlx::Error::RowNotFound => RepositoryError::NotFound(what.to_string()),
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            RepositoryError::Conflict(format!("{what} already exists"))
        }
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
            RepositoryError::NotFound(format!("{what} references a missing record"))
        }
        _ => RepositoryError::Database(err.to_string()),
    }
}

/// Narrow a stored non-negative `INTEGER` into `u32`.
pub(crate) fn to_u32(column: &str, value: i32) -> Result<u32, RepositoryError> {
    u32::try_from(value)
        .map_err(|_| RepositoryError::Database(format!("negative {column}: {value}")))
}

/// Widen a `u32` into the `INTEGER` column type.
pub(crate) fn to_i32(column: &str, value: u32) -> Result<i32, RepositoryError> {
    i32::try_from(value)
        .map_err(|_| RepositoryError::Database(format!("{column} out of range: {value}")))
}
