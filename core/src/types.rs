//! Domain types for events, holds and bookings.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for an event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random `EventId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an `EventId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EventId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Unique identifier for a user placing holds
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(Uuid);

impl UserId {
    /// Creates a new random `UserId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `UserId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Unique identifier for a durable booking
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookingId(Uuid);

impl BookingId {
    /// Creates a new random `BookingId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `BookingId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for BookingId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Events
// ============================================================================

/// Largest capacity the transactional store can record (`INTEGER` column).
pub const MAX_CAPACITY: u32 = 2_147_483_647;

/// An event as recorded in the transactional store.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event identifier
    pub id: EventId,
    /// Display title
    pub title: String,
    /// Total sellable tickets. Immutable once published.
    pub capacity: u32,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Create a new event with a fresh identifier.
    #[must_use]
    pub fn new(title: impl Into<String>, capacity: u32, created_at: DateTime<Utc>) -> Self {
        Self {
            id: EventId::new(),
            title: title.into(),
            capacity,
            created_at,
        }
    }
}

/// Capacity view of an event: what `GetEvent` returns.
///
/// `available_tickets` is the durable figure (capacity minus confirmed
/// bookings); the live counter in the counter store additionally subtracts
/// in-flight holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCapacity {
    /// Event identifier
    pub event_id: EventId,
    /// Total sellable tickets
    pub capacity: u32,
    /// Tickets not yet committed to a confirmed booking
    pub available_tickets: u32,
}

// ============================================================================
// Holds
// ============================================================================

/// A time-boxed, uncommitted claim on `quantity` tickets for one user/event pair.
///
/// At most one hold exists per `(event_id, user_id)`. The record itself is the
/// source of truth that its tickets are spoken for: the live counter was
/// debited when it was written and is credited back only when the record is
/// removed by a release.
///
/// `booking_id` is fixed when the hold is placed and becomes the ID of the
/// booking it is promoted into, so a booking can always be traced back to
/// the hold record it replaced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hold {
    /// Event the tickets belong to
    pub event_id: EventId,
    /// User holding the tickets
    pub user_id: UserId,
    /// Number of tickets held (always > 0)
    pub quantity: u32,
    /// ID the booking will carry if this hold is promoted
    pub booking_id: BookingId,
    /// When the hold was placed
    pub created_at: DateTime<Utc>,
    /// When the lease lapses (`created_at + lease`)
    pub expires_at: DateTime<Utc>,
}

impl Hold {
    /// Create a hold whose lease starts at `now`.
    #[must_use]
    pub fn new(
        event_id: EventId,
        user_id: UserId,
        quantity: u32,
        now: DateTime<Utc>,
        lease: Duration,
    ) -> Self {
        Self {
            event_id,
            user_id,
            quantity,
            booking_id: BookingId::new(),
            created_at: now,
            expires_at: lease_end(now, lease),
        }
    }

    /// Whether the lease has lapsed at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Serialize into the value stored under the hold key.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn to_record(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse a stored hold record.
    ///
    /// # Errors
    ///
    /// Returns an error if the record is not a valid hold.
    pub fn from_record(record: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(record)
    }
}

/// `now + lease`, saturating at the maximum representable instant.
#[must_use]
pub fn lease_end(now: DateTime<Utc>, lease: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(lease)
        .ok()
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

// ============================================================================
// Bookings
// ============================================================================

/// Lifecycle state of a booking.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    /// Tickets permanently allocated
    Confirmed,
    /// Booking cancelled after confirmation
    Cancelled,
}

impl BookingStatus {
    /// Stable string form used by the transactional store.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "confirmed" => Ok(Self::Confirmed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(format!("unknown booking status: {other}")),
        }
    }
}

/// A durable booking: the permanent form of a promoted hold.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    /// Booking identifier
    pub id: BookingId,
    /// Event booked
    pub event_id: EventId,
    /// Booking owner
    pub user_id: UserId,
    /// Tickets booked
    pub quantity: u32,
    /// Current status
    pub status: BookingStatus,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// Build the confirmed booking that replaces `hold`.
    ///
    /// The booking takes the hold's `booking_id`, so building it twice from
    /// the same hold yields the same ID.
    #[must_use]
    pub fn confirmed_from(hold: &Hold, now: DateTime<Utc>) -> Self {
        Self {
            id: hold.booking_id,
            event_id: hold.event_id,
            user_id: hold.user_id,
            quantity: hold.quantity,
            status: BookingStatus::Confirmed,
            created_at: now,
            updated_at: now,
        }
    }
}
