//! # Ticket Holds Testing
//!
//! In-memory doubles and helpers for exercising the hold subsystem without
//! Redis or Postgres.
//!
//! This crate provides:
//! - [`InMemoryCounterStore`]: clock-aware counter store with atomic batches
//! - [`InMemoryBookingRepository`] / [`InMemoryEventRepository`]
//! - [`ManualClock`]: time that only moves when a test moves it
//! - [`TestHarness`]: a fully wired manager, promoter and sweeper
//!
//! ## Example
//!
//! ```
//! use ticket_holds_testing::TestHarness;
//! use ticket_holds_core::UserId;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let harness = TestHarness::new();
//! let event_id = harness.create_event(10).await?;
//!
//! harness.manager.hold_tickets(event_id, UserId::new(), 3).await?;
//! harness.clock.advance(harness.manager.config().hold_lease);
//! harness.sweeper.sweep_once().await?;
//!
//! assert_eq!(harness.manager.available(event_id).await?, 10);
//! # Ok(())
//! # }
//! ```

pub mod counter_store;
pub mod repositories;

pub use counter_store::InMemoryCounterStore;
pub use repositories::{InMemoryBookingRepository, InMemoryEventRepository};

use chrono::{DateTime, Utc};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use ticket_holds_core::environment::Clock;
use ticket_holds_core::error::HoldError;
use ticket_holds_core::types::EventId;
use ticket_holds_runtime::{BookingPromoter, HoldConfig, HoldManager, LeaseMutex, Sweeper};

/// Mock implementations of environment traits.
pub mod mocks {
    use super::{Arc, Clock, DateTime, Duration, RwLock, Utc};
    use ticket_holds_core::types::lease_end;

    /// Clock that stands still until advanced.
    ///
    /// Clones share the same time, so a clone handed to the manager moves
    /// when the test advances its own copy.
    ///
    /// # Example
    ///
    /// ```
    /// use ticket_holds_testing::mocks::ManualClock;
    /// use ticket_holds_core::environment::Clock;
    /// use chrono::Utc;
    /// use std::time::Duration;
    ///
    /// let clock = ManualClock::new(Utc::now());
    /// let before = clock.now();
    /// clock.advance(Duration::from_secs(300));
    /// assert_eq!((clock.now() - before).num_seconds(), 300);
    /// ```
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<RwLock<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Create a clock reading `time`.
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(RwLock::new(time)),
            }
        }

        /// Move the clock forward.
        pub fn advance(&self, by: Duration) {
            if let Ok(mut time) = self.time.write() {
                *time = lease_end(*time, by);
            }
        }

        /// Jump to an exact instant.
        pub fn set(&self, to: DateTime<Utc>) {
            if let Ok(mut time) = self.time.write() {
                *time = to;
            }
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
                .read()
                .map_or_else(|poisoned| *poisoned.into_inner(), |time| *time)
        }
    }

    /// Create a manual clock at 2025-01-01 00:00:00 UTC.
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> ManualClock {
        ManualClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

pub use mocks::{ManualClock, test_clock};

/// A hold manager, promoter and sweeper wired to in-memory doubles.
///
/// The lock is a [`LeaseMutex`] over the same in-memory store, so the
/// store-backed locking path is exercised too.
pub struct TestHarness {
    /// Shared counter store
    pub store: InMemoryCounterStore,
    /// Booking table
    pub bookings: InMemoryBookingRepository,
    /// Event table
    pub events: InMemoryEventRepository,
    /// Clock driving hold leases and store TTLs
    pub clock: ManualClock,
    /// Hold manager under test
    pub manager: Arc<HoldManager>,
    /// Promoter sharing the manager
    pub promoter: BookingPromoter,
    /// Sweeper sharing the manager
    pub sweeper: Sweeper,
}

impl TestHarness {
    /// Wire a harness with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(HoldConfig::default())
    }

    /// Wire a harness with `config`.
    #[must_use]
    pub fn with_config(config: HoldConfig) -> Self {
        let clock = test_clock();
        let store = InMemoryCounterStore::with_clock(Arc::new(clock.clone()));
        let bookings = InMemoryBookingRepository::new();
        let events = InMemoryEventRepository::new(bookings.clone());
        let mutex = LeaseMutex::new(Arc::new(store.clone())).with_backoff(config.lock_backoff);

        let manager = Arc::new(
            HoldManager::new(
                Arc::new(store.clone()),
                Arc::new(mutex),
                Arc::new(events.clone()),
                Arc::new(bookings.clone()),
                Arc::new(clock.clone()),
            )
            .with_config(config),
        );

        Self {
            store,
            bookings,
            events,
            clock,
            promoter: BookingPromoter::new(Arc::clone(&manager)),
            sweeper: Sweeper::new(Arc::clone(&manager)),
            manager,
        }
    }

    /// Create an event with `capacity` tickets and a seeded counter.
    ///
    /// # Errors
    ///
    /// Propagates any error from [`HoldManager::create_event`].
    pub async fn create_event(&self, capacity: u32) -> Result<EventId, HoldError> {
        Ok(self.manager.create_event("Test event", capacity).await?.id)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
