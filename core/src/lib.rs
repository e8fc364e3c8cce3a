//! # Ticket Holds Core
//!
//! Core types and capability traits for the ticket reservation subsystem.
//!
//! The sellable unit is a finite pool of tickets per event. Clients place
//! time-boxed **holds** on a quantity of tickets; a hold is later promoted into
//! a durable **booking**, released by the client, or reclaimed by the sweeper
//! once its lease lapses. The sum of all bookings and live holds for an event
//! never exceeds its capacity.
//!
//! ## Capabilities
//!
//! Every external dependency is expressed as a trait so the hold logic can run
//! against production backends or in-memory doubles:
//!
//! - [`CounterStore`](counter_store::CounterStore): network-addressed key/value
//!   store holding live counters and hold records
//! - [`DistributedMutex`](mutex::DistributedMutex): lease-based mutual exclusion
//! - [`BookingRepository`](repository::BookingRepository) and
//!   [`EventRepository`](repository::EventRepository): the transactional store
//! - [`Clock`](environment::Clock): time source
//!
//! ## Layout
//!
//! ```text
//! HoldManager ──► DistributedMutex ──► CounterStore
//!      │                                   ▲
//!      └───────────────────────────────────┘
//! BookingPromoter ──► BookingRepository
//! Sweeper ──► HoldManager::release_hold
//! ```

pub mod counter_store;
pub mod error;
pub mod keys;
pub mod mutex;
pub mod repository;
pub mod types;

pub use counter_store::{CounterStore, StoreFuture, WriteBatch, WriteOp};
pub use error::{HoldError, LockError, RepositoryError, Result, StoreError};
pub use mutex::{DistributedMutex, LockFuture, LockToken};
pub use repository::{BookingRepository, EventRepository, RepositoryFuture};
pub use types::{
    Booking, BookingId, BookingStatus, Event, EventCapacity, EventId, Hold, MAX_CAPACITY, UserId,
};

/// Environment traits injected into the hold subsystem.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability.
    ///
    /// Lease expiry is always judged against this clock, never against
    /// `Utc::now()` directly, so tests can step time forward.
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Wall-clock time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}
