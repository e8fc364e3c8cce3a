//! Transactional store interfaces.
//!
//! The durable record of events and bookings lives in a relational store.
//! The hold subsystem only needs the narrow slice below.
//!
//! # Implementations
//!
//! - `PostgresBookingRepository` / `PostgresEventRepository`
//!   (in `ticket-holds-postgres`)
//! - `InMemoryBookingRepository` / `InMemoryEventRepository`
//!   (in `ticket-holds-testing`)

use crate::error::RepositoryError;
use chrono::{DateTime, Utc};
use crate::types::{Booking, BookingId, Event, EventCapacity, EventId};
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by repository operations.
pub type RepositoryFuture<'a, T> =
    Pin<Box<dyn Future<Output = Result<T, RepositoryError>> + Send + 'a>>;

/// Durable booking records.
pub trait BookingRepository: Send + Sync {
    /// Persist a new booking in its own transaction.
    ///
    /// # Errors
    ///
    /// - `RepositoryError::Conflict` if the booking ID already exists
    /// - `RepositoryError::Database` on connection or query failure
    fn create_booking(&self, booking: Booking) -> RepositoryFuture<'_, BookingId>;

    /// Load a booking by ID.
    ///
    /// # Errors
    ///
    /// - `RepositoryError::NotFound` if no such booking exists
    /// - `RepositoryError::Database` on connection or query failure
    fn get_booking(&self, id: BookingId) -> RepositoryFuture<'_, Booking>;

    /// Mark a confirmed booking cancelled and return it.
    ///
    /// Cancelled bookings no longer count towards
    /// [`BookingRepository::confirmed_quantity`].
    ///
    /// # Errors
    ///
    /// - `RepositoryError::NotFound` if no such booking exists
    /// - `RepositoryError::Conflict` if it is already cancelled
    /// - `RepositoryError::Database` on connection or query failure
    fn cancel_booking(&self, id: BookingId, at: DateTime<Utc>) -> RepositoryFuture<'_, Booking>;

    /// Sum of quantities over confirmed bookings for an event.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` on connection or query failure.
    fn confirmed_quantity(&self, event_id: EventId) -> RepositoryFuture<'_, u64>;
}

/// Durable event records.
pub trait EventRepository: Send + Sync {
    /// Persist a new event.
    ///
    /// # Errors
    ///
    /// - `RepositoryError::Conflict` if the event ID already exists
    /// - `RepositoryError::Database` on connection or query failure
    fn create_event(&self, event: Event) -> RepositoryFuture<'_, EventId>;

    /// Capacity and durable availability of an event.
    ///
    /// # Errors
    ///
    /// - `RepositoryError::NotFound` if no such event exists
    /// - `RepositoryError::Database` on connection or query failure
    fn get_event(&self, id: EventId) -> RepositoryFuture<'_, EventCapacity>;

    /// IDs of every known event, for cold-start seeding.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` on connection or query failure.
    fn list_event_ids(&self) -> RepositoryFuture<'_, Vec<EventId>>;
}
