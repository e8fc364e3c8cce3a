//! In-memory transactional store doubles.
//!
//! [`InMemoryEventRepository`] derives `available_tickets` from the bookings
//! held by its paired [`InMemoryBookingRepository`], the same way the
//! Postgres implementation derives it with a join.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future;
use std::sync::{Arc, RwLock};
use ticket_holds_core::error::RepositoryError;
use ticket_holds_core::repository::{BookingRepository, EventRepository, RepositoryFuture};
use ticket_holds_core::types::{Booking, BookingId, BookingStatus, Event, EventCapacity, EventId};

fn poisoned() -> RepositoryError {
    RepositoryError::Database("in-memory repository lock poisoned".into())
}

#[derive(Default)]
struct BookingState {
    bookings: HashMap<BookingId, Booking>,
    fail_next_create: bool,
}

/// In-memory booking table.
#[derive(Clone, Default)]
pub struct InMemoryBookingRepository {
    state: Arc<RwLock<BookingState>>,
}

impl InMemoryBookingRepository {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `create_booking` fail with a database error.
    pub fn fail_next_create(&self) {
        if let Ok(mut state) = self.state.write() {
            state.fail_next_create = true;
        }
    }

    /// Snapshot of every stored booking.
    #[must_use]
    pub fn all(&self) -> Vec<Booking> {
        self.state
            .read()
            .map(|state| state.bookings.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of stored bookings.
    #[must_use]
    pub fn count(&self) -> usize {
        self.state.read().map_or(0, |state| state.bookings.len())
    }

    fn confirmed_sum(&self, event_id: EventId) -> Result<u64, RepositoryError> {
        let state = self.state.read().map_err(|_| poisoned())?;
        Ok(state
            .bookings
            .values()
            .filter(|b| b.event_id == event_id && b.status == BookingStatus::Confirmed)
            .map(|b| u64::from(b.quantity))
            .sum())
    }
}

impl BookingRepository for InMemoryBookingRepository {
    fn create_booking(&self, booking: Booking) -> RepositoryFuture<'_, BookingId> {
        let result = self.state.write().map_err(|_| poisoned()).and_then(|mut state| {
            if state.fail_next_create {
                state.fail_next_create = false;
                return Err(RepositoryError::Database("injected failure".into()));
            }
            if state.bookings.contains_key(&booking.id) {
                return Err(RepositoryError::Conflict(format!("booking {}", booking.id)));
            }
            let id = booking.id;
            state.bookings.insert(id, booking);
            Ok(id)
        });
        Box::pin(future::ready(result))
    }

    fn get_booking(&self, id: BookingId) -> RepositoryFuture<'_, Booking> {
        let result = self.state.read().map_err(|_| poisoned()).and_then(|state| {
            state
                .bookings
                .get(&id)
                .cloned()
                .ok_or_else(|| RepositoryError::NotFound(format!("booking {id}")))
        });
        Box::pin(future::ready(result))
    }

    fn cancel_booking(&self, id: BookingId, at: DateTime<Utc>) -> RepositoryFuture<'_, Booking> {
        let result = self.state.write().map_err(|_| poisoned()).and_then(|mut state| {
            let booking = state
                .bookings
                .get_mut(&id)
                .ok_or_else(|| RepositoryError::NotFound(format!("booking {id}")))?;
            if booking.status == BookingStatus::Cancelled {
                return Err(RepositoryError::Conflict(format!("booking {id} is already cancelled")));
            }
            booking.status = BookingStatus::Cancelled;
            booking.updated_at = at;
            Ok(booking.clone())
        });
        Box::pin(future::ready(result))
    }

    fn confirmed_quantity(&self, event_id: EventId) -> RepositoryFuture<'_, u64> {
        Box::pin(future::ready(self.confirmed_sum(event_id)))
    }
}

/// In-memory event table.
#[derive(Clone, Default)]
pub struct InMemoryEventRepository {
    events: Arc<RwLock<HashMap<EventId, Event>>>,
    bookings: InMemoryBookingRepository,
}

impl InMemoryEventRepository {
    /// Create an event table whose availability reflects `bookings`.
    #[must_use]
    pub fn new(bookings: InMemoryBookingRepository) -> Self {
        Self {
            events: Arc::new(RwLock::new(HashMap::new())),
            bookings,
        }
    }

    /// Insert an event directly, bypassing the hold manager.
    pub fn insert(&self, event: Event) {
        if let Ok(mut events) = self.events.write() {
            events.insert(event.id, event);
        }
    }
}

impl EventRepository for InMemoryEventRepository {
    fn create_event(&self, event: Event) -> RepositoryFuture<'_, EventId> {
        let result = self.events.write().map_err(|_| poisoned()).and_then(|mut events| {
            if events.contains_key(&event.id) {
                return Err(RepositoryError::Conflict(format!("event {}", event.id)));
            }
            let id = event.id;
            events.insert(id, event);
            Ok(id)
        });
        Box::pin(future::ready(result))
    }

    fn get_event(&self, id: EventId) -> RepositoryFuture<'_, EventCapacity> {
        let result = self
            .events
            .read()
            .map_err(|_| poisoned())
            .and_then(|events| {
                events
                    .get(&id)
                    .map(|event| event.capacity)
                    .ok_or_else(|| RepositoryError::NotFound(format!("event {id}")))
            })
            .and_then(|capacity| {
                let confirmed = self.bookings.confirmed_sum(id)?;
                let available = u64::from(capacity).saturating_sub(confirmed);
                Ok(EventCapacity {
                    event_id: id,
                    capacity,
                    available_tickets: u32::try_from(available).unwrap_or(capacity),
                })
            });
        Box::pin(future::ready(result))
    }

    fn list_event_ids(&self) -> RepositoryFuture<'_, Vec<EventId>> {
        let result = self
            .events
            .read()
            .map_err(|_| poisoned())
            .map(|events| events.keys().copied().collect());
        Box::pin(future::ready(result))
    }
}
