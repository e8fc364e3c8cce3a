//! Error types for the hold subsystem.
//!
//! Errors are layered: backends report [`StoreError`], [`LockError`] and
//! [`RepositoryError`]; the hold manager, promoter and sweeper wrap those into
//! the caller-facing [`HoldError`] together with the operation and event they
//! belong to.

use crate::types::EventId;
use thiserror::Error;

/// Result type alias for hold operations.
pub type Result<T> = std::result::Result<T, HoldError>;

/// Counter store failure.
///
/// Messages never carry key names; backends log keys at debug level instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached.
    #[error("counter store unreachable: {0}")]
    Connection(String),

    /// The store rejected or failed a command.
    #[error("counter store command failed: {0}")]
    Command(String),

    /// A stored value could not be interpreted.
    #[error("counter store value is corrupt: {0}")]
    Corrupt(String),
}

/// Distributed mutex failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LockError {
    /// The lock stayed held by someone else for every attempt.
    #[error("lock {name} not acquired after {attempts} attempts")]
    Timeout {
        /// Mutex name
        name: String,
        /// Attempts made
        attempts: u32,
    },

    /// Release attempted with a stale or foreign token.
    #[error("lock {name} is not owned by this token")]
    NotOwner {
        /// Mutex name
        name: String,
    },

    /// The backing store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Transactional store failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    /// The requested record does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// A write conflicted with an existing record.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Database connection or query failure.
    #[error("database error: {0}")]
    Database(String),
}

/// Caller-facing error taxonomy.
///
/// Use [`HoldError::is_retryable`] to decide whether the caller should back
/// off and try again.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum HoldError {
    // ═══════════════════════════════════════════════════════════
    // Caller errors
    // ═══════════════════════════════════════════════════════════

    /// Quantity was zero, negative or out of range.
    #[error("quantity must be a positive integer")]
    InvalidQuantity,

    /// Event capacity exceeds what the transactional store can record.
    #[error("capacity {capacity} exceeds the maximum of {max}")]
    InvalidCapacity {
        /// Capacity requested
        capacity: u32,
        /// Largest accepted capacity
        max: u32,
    },

    // ═══════════════════════════════════════════════════════════
    // Transient errors
    // ═══════════════════════════════════════════════════════════

    /// The per-event lock could not be acquired within the retry budget.
    #[error("event {event_id} is busy, retry later")]
    LockUnavailable {
        /// Event whose lock was contended
        event_id: EventId,
    },

    /// Counter store failure during an operation.
    #[error("{operation} failed for event {event_id}: {source}")]
    Store {
        /// Operation that failed
        operation: &'static str,
        /// Event being operated on
        event_id: EventId,
        /// Underlying failure
        #[source]
        source: StoreError,
    },

    /// Transactional store failure during an operation.
    #[error("{operation} failed: {source}")]
    Repository {
        /// Operation that failed
        operation: &'static str,
        /// Underlying failure
        #[source]
        source: RepositoryError,
    },

    // ═══════════════════════════════════════════════════════════
    // Business rules
    // ═══════════════════════════════════════════════════════════

    /// Not enough tickets left for the request.
    #[error("insufficient inventory: requested {requested}, available {available}")]
    InsufficientInventory {
        /// Tickets requested
        requested: u32,
        /// Tickets available at check time
        available: i64,
    },

    /// The user already holds tickets for this event.
    #[error("an active hold already exists for this user and event")]
    HoldAlreadyExists,

    /// The hold is gone or its lease has lapsed; the caller must hold again.
    #[error("hold has expired or does not exist")]
    HoldExpired,

    /// The event is unknown to the transactional store.
    #[error("event {0} not found")]
    EventNotFound(EventId),

    // ═══════════════════════════════════════════════════════════
    // Data corruption
    // ═══════════════════════════════════════════════════════════

    /// An invariant on the ticket counters was about to be broken.
    ///
    /// Signals a double release or corrupted state. Never retried.
    #[error("invariant violation on event {event_id}: {detail}")]
    InvariantViolation {
        /// Event whose counters are inconsistent
        event_id: EventId,
        /// What was detected
        detail: String,
    },
}

impl HoldError {
    /// Wrap a counter store failure with its operation context.
    #[must_use]
    pub const fn store(operation: &'static str, event_id: EventId, source: StoreError) -> Self {
        Self::Store {
            operation,
            event_id,
            source,
        }
    }

    /// Wrap a repository failure with its operation context.
    #[must_use]
    pub const fn repository(operation: &'static str, source: RepositoryError) -> Self {
        Self::Repository { operation, source }
    }

    /// Whether the caller may retry the same request with backoff.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::LockUnavailable { .. } | Self::Store { .. } => true,
            Self::Repository { source, .. } => matches!(source, RepositoryError::Database(_)),
            Self::InvalidQuantity
            | Self::InvalidCapacity { .. }
            | Self::InsufficientInventory { .. }
            | Self::HoldAlreadyExists
            | Self::HoldExpired
            | Self::EventNotFound(_)
            | Self::InvariantViolation { .. } => false,
        }
    }
}
