//! Event table.

use crate::{map_sqlx_error, to_i32, to_u32};
use sqlx::{PgPool, Row};
use ticket_holds_core::repository::{EventRepository, RepositoryFuture};
use ticket_holds_core::types::{Event, EventCapacity, EventId};

/// Events stored in `PostgreSQL`.
///
/// `available_tickets` is computed from confirmed bookings on every read.
#[derive(Clone)]
pub struct PostgresEventRepository {
    pool: PgPool,
}

impl PostgresEventRepository {
    /// Create a repository on an existing pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl EventRepository for PostgresEventRepository {
    fn create_event(&self, event: Event) -> RepositoryFuture<'_, EventId> {
        Box::pin(async move {
            let capacity = to_i32("capacity", event.capacity)?;
            sqlx::query(
                "INSERT INTO events (id, title, capacity, created_at) VALUES ($1, $2, $3, $4)",
            )
            .bind(*event.id.as_uuid())
            .bind(&event.title)
            .bind(capacity)
            .bind(event.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("event", e))?;

            tracing::debug!(event_id = %event.id, capacity = event.capacity, "event stored");
            Ok(event.id)
        })
    }

    fn get_event(&self, id: EventId) -> RepositoryFuture<'_, EventCapacity> {
        Box::pin(async move {
            let row = sqlx::query(
                r"
                SELECT e.capacity,
                       COALESCE(SUM(b.quantity) FILTER (WHERE b.status = 'confirmed'), 0)::BIGINT
                           AS confirmed
                FROM events e
                LEFT JOIN bookings b ON b.event_id = e.id
                WHERE e.id = $1
                GROUP BY e.id, e.capacity
                ",
            )
            .bind(*id.as_uuid())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("event", e))?;

            let capacity: i32 = row.try_get("capacity").map_err(|e| map_sqlx_error("event", e))?;
            let capacity = to_u32("capacity", capacity)?;
            let confirmed: i64 = row.try_get("confirmed").map_err(|e| map_sqlx_error("event", e))?;
            let available = i64::from(capacity).saturating_sub(confirmed).max(0);

            Ok(EventCapacity {
                event_id: id,
                capacity,
                available_tickets: u32::try_from(available).unwrap_or(0),
            })
        })
    }

    fn list_event_ids(&self) -> RepositoryFuture<'_, Vec<EventId>> {
        Box::pin(async move {
            let rows = sqlx::query("SELECT id FROM events ORDER BY created_at")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("events", e))?;

            rows.iter()
                .map(|row| {
                    row.try_get::<uuid::Uuid, _>("id")
                        .map(EventId::from_uuid)
                        .map_err(|e| map_sqlx_error("event", e))
                })
                .collect()
        })
    }
}
