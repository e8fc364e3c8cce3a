//! Booking table.

use crate::{map_sqlx_error, to_i32, to_u32};
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use ticket_holds_core::error::RepositoryError;
use ticket_holds_core::repository::{BookingRepository, RepositoryFuture};
use ticket_holds_core::types::{Booking, BookingId, BookingStatus, EventId, UserId};

/// Bookings stored in `PostgreSQL`.
#[derive(Clone)]
pub struct PostgresBookingRepository {
    pool: PgPool,
}

impl PostgresBookingRepository {
    /// Create a repository on an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn booking_from_row(row: &PgRow) -> Result<Booking, RepositoryError> {
    let column = |e| map_sqlx_error("booking", e);
    let status: String = row.try_get("status").map_err(column)?;
    let created_at: DateTime<Utc> = row.try_get("created_at").map_err(column)?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at").map_err(column)?;

    Ok(Booking {
        id: BookingId::from_uuid(row.try_get("id").map_err(column)?),
        event_id: EventId::from_uuid(row.try_get("event_id").map_err(column)?),
        user_id: UserId::from_uuid(row.try_get("user_id").map_err(column)?),
        quantity: to_u32("quantity", row.try_get("quantity").map_err(column)?)?,
        status: status.parse().map_err(RepositoryError::Database)?,
        created_at,
        updated_at,
    })
}

impl BookingRepository for PostgresBookingRepository {
    fn create_booking(&self, booking: Booking) -> RepositoryFuture<'_, BookingId> {
        Box::pin(async move {
            let quantity = to_i32("quantity", booking.quantity)?;
            sqlx::query(
                r"
                INSERT INTO bookings (id, event_id, user_id, quantity, status, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                ",
            )
            .bind(*booking.id.as_uuid())
            .bind(*booking.event_id.as_uuid())
            .bind(*booking.user_id.as_uuid())
            .bind(quantity)
            .bind(booking.status.as_str())
            .bind(booking.created_at)
            .bind(booking.updated_at)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("booking", e))?;

            tracing::debug!(
                booking_id = %booking.id,
                event_id = %booking.event_id,
                quantity = booking.quantity,
                "booking stored"
            );
            Ok(booking.id)
        })
    }

    fn get_booking(&self, id: BookingId) -> RepositoryFuture<'_, Booking> {
        Box::pin(async move {
            let row = sqlx::query(
                r"
                SELECT id, event_id, user_id, quantity, status, created_at, updated_at
                FROM bookings
                WHERE id = $1
                ",
            )
            .bind(*id.as_uuid())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("booking", e))?;

            booking_from_row(&row)
        })
    }

    fn cancel_booking(&self, id: BookingId, at: DateTime<Utc>) -> RepositoryFuture<'_, Booking> {
        Box::pin(async move {
            let row = sqlx::query(
                r"
                UPDATE bookings
                SET status = 'cancelled', updated_at = $2
                WHERE id = $1 AND status = 'confirmed'
                RETURNING id, event_id, user_id, quantity, status, created_at, updated_at
                ",
            )
            .bind(*id.as_uuid())
            .bind(at)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("booking", e))?;

            match row {
                Some(row) => {
                    tracing::debug!(booking_id = %id, "booking cancelled");
                    booking_from_row(&row)
                }
                // Either absent or already cancelled; the read tells which.
                None => {
                    self.get_booking(id).await?;
                    Err(RepositoryError::Conflict(format!("booking {id} is already cancelled")))
                }
            }
        })
    }

    fn confirmed_quantity(&self, event_id: EventId) -> RepositoryFuture<'_, u64> {
        Box::pin(async move {
            let total: i64 = sqlx::query_scalar(
                r"
                SELECT COALESCE(SUM(quantity), 0)::BIGINT
                FROM bookings
                WHERE event_id = $1 AND status = 'confirmed'
                ",
            )
            .bind(*event_id.as_uuid())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("bookings", e))?;

            Ok(u64::try_from(total).unwrap_or(0))
        })
    }
}
