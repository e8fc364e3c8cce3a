//! Hold manager: places and releases holds under the per-event lock.
//!
//! Every mutation of an event's live counter or hold records runs inside
//! that event's lock, so the read-check-write in [`HoldManager::hold_tickets`]
//! is linearized with releases, promotions and sweeps of the same event.
//!
//! # Write ordering
//!
//! Counter/record pairs are submitted as one [`WriteBatch`]:
//!
//! - hold: write hold record, then decrement the counter
//! - release: delete hold record, then increment the counter
//!
//! If a backend applies only a prefix of a batch, the counter is left too
//! low, never too high. [`HoldManager::reconcile`] rebuilds it from the
//! transactional store and the surviving hold records.
//!
//! # Promoted holds
//!
//! A hold record can outlive its promotion when the delete after the booking
//! write fails. Every release therefore looks up the hold's booking first;
//! if one exists the record is dropped and nothing is credited.

use crate::config::HoldConfig;
use crate::metrics::HoldMetrics;
use std::sync::Arc;
use std::time::Instant;
use ticket_holds_core::counter_store::{CounterStore, WriteBatch};
use ticket_holds_core::environment::Clock;
use ticket_holds_core::error::{HoldError, LockError, RepositoryError, Result, StoreError};
use ticket_holds_core::keys;
use ticket_holds_core::mutex::{DistributedMutex, LockToken};
use ticket_holds_core::repository::{BookingRepository, EventRepository};
use ticket_holds_core::types::{
    Booking, Event, EventCapacity, EventId, Hold, MAX_CAPACITY, UserId,
};

const HOLD_TICKETS: &str = "hold tickets";
const RELEASE_HOLD: &str = "release hold";
const RECONCILE: &str = "reconcile counter";
const READ_AVAILABILITY: &str = "read availability";
const READ_HOLD: &str = "read hold";
const READ_EVENT: &str = "get event";
const LOOKUP_BOOKING: &str = "look up booking";

/// Hold records fetched per round trip while reconciling.
const RECONCILE_CHUNK: usize = 500;

/// What a sweeper visit found for one hold record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LapseOutcome {
    /// The hold had lapsed and its tickets were restored
    Released,
    /// The hold is still inside its lease
    Active,
    /// The record was already gone (released or promoted meanwhile)
    Gone,
    /// The hold had been booked; its leftover record was removed
    Retired,
}

/// Ownership of one event's lock for the duration of a critical section.
///
/// Call [`EventLock::release`] on every normal exit. If the owning future is
/// dropped first (caller cancelled), `Drop` releases the lease on a spawned
/// task; outside a runtime the lease simply lapses.
pub(crate) struct EventLock {
    mutex: Arc<dyn DistributedMutex>,
    name: String,
    token: Option<LockToken>,
}

impl EventLock {
    pub(crate) async fn release(mut self) {
        if let Some(token) = self.token.take() {
            if let Err(err) = self.mutex.release(&self.name, &token).await {
                tracing::warn!(
                    lock = %self.name,
                    error = %err,
                    "event lock release failed, lease will lapse"
                );
            }
        }
    }
}

impl Drop for EventLock {
    fn drop(&mut self) {
        let Some(token) = self.token.take() else {
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };

        let mutex = Arc::clone(&self.mutex);
        let name = std::mem::take(&mut self.name);
        handle.spawn(async move {
            if let Err(err) = mutex.release(&name, &token).await {
                tracing::debug!(lock = %name, error = %err, "abandoned event lock not released");
            }
        });
    }
}

/// Places, releases and inspects holds.
///
/// # Example
///
/// ```rust,ignore
/// let manager = HoldManager::new(store, mutex, events, bookings, Arc::new(SystemClock))
///     .with_config(HoldConfig::default());
///
/// let hold = manager.hold_tickets(event_id, user_id, 3).await?;
/// manager.release_hold(event_id, user_id).await?;
/// ```
pub struct HoldManager {
    store: Arc<dyn CounterStore>,
    mutex: Arc<dyn DistributedMutex>,
    events: Arc<dyn EventRepository>,
    bookings: Arc<dyn BookingRepository>,
    clock: Arc<dyn Clock>,
    config: HoldConfig,
}

impl HoldManager {
    /// Create a manager with the default [`HoldConfig`].
    #[must_use]
    pub fn new(
        store: Arc<dyn CounterStore>,
        mutex: Arc<dyn DistributedMutex>,
        events: Arc<dyn EventRepository>,
        bookings: Arc<dyn BookingRepository>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            mutex,
            events,
            bookings,
            clock,
            config: HoldConfig::default(),
        }
    }

    /// Replace the configuration.
    #[must_use]
    pub const fn with_config(mut self, config: HoldConfig) -> Self {
        self.config = config;
        self
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &HoldConfig {
        &self.config
    }

    pub(crate) fn store(&self) -> &dyn CounterStore {
        self.store.as_ref()
    }

    pub(crate) fn bookings(&self) -> &dyn BookingRepository {
        self.bookings.as_ref()
    }

    pub(crate) fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    // ========================================================================
    // Public operations
    // ========================================================================

    /// Reserve `quantity` tickets of `event_id` for `user_id`.
    ///
    /// An active hold for the same pair is rejected. A lapsed one that the
    /// sweeper has not reached yet is released first, then replaced.
    ///
    /// # Errors
    ///
    /// - `InvalidQuantity` if `quantity` is zero
    /// - `LockUnavailable` if the event lock stayed contended
    /// - `HoldAlreadyExists` if the user already has an active hold
    /// - `InsufficientInventory` if fewer than `quantity` tickets remain
    /// - `EventNotFound` if the event is unknown
    /// - `Store` / `Repository` on backend failure
    pub async fn hold_tickets(
        &self,
        event_id: EventId,
        user_id: UserId,
        quantity: u32,
    ) -> Result<Hold> {
        if quantity == 0 {
            HoldMetrics::record_rejected("invalid_quantity");
            return Err(HoldError::InvalidQuantity);
        }

        let lock = self.lock_event(event_id, HOLD_TICKETS).await?;
        let result = self.hold_locked(event_id, user_id, quantity).await;
        lock.release().await;
        result
    }

    /// Release the hold of `user_id` on `event_id`, restoring its tickets.
    ///
    /// Idempotent: returns `Ok(None)` when there is no hold, or when the
    /// hold had already been booked and only its record was left.
    ///
    /// # Errors
    ///
    /// - `LockUnavailable` if the event lock stayed contended
    /// - `InvariantViolation` if the release would push availability above
    ///   capacity; the hold is left untouched
    /// - `Store` / `Repository` on backend failure
    pub async fn release_hold(&self, event_id: EventId, user_id: UserId) -> Result<Option<Hold>> {
        let lock = self.lock_event(event_id, RELEASE_HOLD).await?;
        let result = self.release_existing(event_id, user_id).await;
        lock.release().await;
        result
    }

    /// Live available-ticket count, seeding the counter if it is missing.
    ///
    /// # Errors
    ///
    /// - `EventNotFound` if the counter is missing and the event is unknown
    /// - `Store` / `Repository` / `LockUnavailable` on failure
    pub async fn available(&self, event_id: EventId) -> Result<i64> {
        let key = keys::available_key(&event_id);
        match self
            .store
            .get(&key)
            .await
            .map_err(|e| HoldError::store(READ_AVAILABILITY, event_id, e))?
        {
            Some(available) => Ok(available),
            None => self.ensure_counter(event_id).await,
        }
    }

    /// The active hold of `user_id` on `event_id`, if any.
    ///
    /// Lapsed holds are reported as `None` even before the sweeper runs.
    ///
    /// # Errors
    ///
    /// Returns `Store` if the record cannot be read.
    pub async fn get_hold(&self, event_id: EventId, user_id: UserId) -> Result<Option<Hold>> {
        let now = self.clock.now();
        Ok(self
            .read_hold(event_id, user_id, READ_HOLD)
            .await?
            .filter(|hold| !hold.is_expired_at(now)))
    }

    /// Persist a new event and seed its live counter.
    ///
    /// # Errors
    ///
    /// - `InvalidCapacity` if `capacity` exceeds [`MAX_CAPACITY`]
    /// - `Repository` if the event cannot be stored
    /// - any error of [`HoldManager::reconcile`]
    pub async fn create_event(&self, title: impl Into<String>, capacity: u32) -> Result<Event> {
        if capacity > MAX_CAPACITY {
            return Err(HoldError::InvalidCapacity {
                capacity,
                max: MAX_CAPACITY,
            });
        }

        let event = Event::new(title, capacity, self.clock.now());
        self.events
            .create_event(event.clone())
            .await
            .map_err(|e| HoldError::repository("create event", e))?;

        self.reconcile(event.id).await?;
        tracing::info!(event_id = %event.id, capacity, "event created");
        Ok(event)
    }

    /// Capacity and durable availability of an event.
    ///
    /// # Errors
    ///
    /// - `EventNotFound` if the event is unknown
    /// - `Repository` on database failure
    pub async fn get_event(&self, event_id: EventId) -> Result<EventCapacity> {
        self.fetch_event(event_id, READ_EVENT).await
    }

    /// Seed the live counter if it is missing. Returns the available count.
    ///
    /// # Errors
    ///
    /// Same as [`HoldManager::reconcile`].
    pub async fn ensure_counter(&self, event_id: EventId) -> Result<i64> {
        let lock = self.lock_event(event_id, RECONCILE).await?;
        let result: Result<i64> = async {
            let key = keys::available_key(&event_id);
            match self
                .store
                .get(&key)
                .await
                .map_err(|e| HoldError::store(RECONCILE, event_id, e))?
            {
                Some(available) => Ok(available),
                None => self.reconcile_locked(event_id).await,
            }
        }
        .await;
        lock.release().await;
        result
    }

    /// Rebuild the live counter from durable state.
    ///
    /// `available = capacity - confirmed bookings - every hold record`. Lapsed
    /// holds still count: their tickets return only when they are released.
    ///
    /// # Errors
    ///
    /// - `EventNotFound` if the event is unknown
    /// - `LockUnavailable` if the event lock stayed contended
    /// - `Store` / `Repository` on backend failure
    pub async fn reconcile(&self, event_id: EventId) -> Result<i64> {
        let lock = self.lock_event(event_id, RECONCILE).await?;
        let result = self.reconcile_locked(event_id).await;
        lock.release().await;
        result
    }

    /// Reconcile the counters of `event_ids`, as done on cold start.
    ///
    /// Returns the number of events seeded.
    ///
    /// # Errors
    ///
    /// Stops at the first event that fails to reconcile.
    pub async fn seed_counters(&self, event_ids: &[EventId]) -> Result<usize> {
        for event_id in event_ids {
            self.reconcile(*event_id).await?;
        }
        tracing::info!(events = event_ids.len(), "live counters seeded");
        Ok(event_ids.len())
    }

    // ========================================================================
    // Locking
    // ========================================================================

    pub(crate) async fn lock_event(
        &self,
        event_id: EventId,
        operation: &'static str,
    ) -> Result<EventLock> {
        let name = keys::lock_name(&event_id);
        let started = Instant::now();

        match self
            .mutex
            .acquire(&name, self.config.lock_lease, self.config.lock_backoff.attempts())
            .await
        {
            Ok(token) => {
                HoldMetrics::record_lock_wait(started.elapsed());
                Ok(EventLock {
                    mutex: Arc::clone(&self.mutex),
                    name,
                    token: Some(token),
                })
            }
            Err(LockError::Timeout { attempts, .. }) => {
                HoldMetrics::record_lock_timeout();
                tracing::warn!(%event_id, operation, attempts, "event lock unavailable");
                Err(HoldError::LockUnavailable { event_id })
            }
            Err(LockError::NotOwner { .. }) => Err(HoldError::LockUnavailable { event_id }),
            Err(LockError::Store(source)) => Err(HoldError::store(operation, event_id, source)),
        }
    }

    // ========================================================================
    // Critical sections (caller holds the event lock)
    // ========================================================================

    async fn hold_locked(&self, event_id: EventId, user_id: UserId, quantity: u32) -> Result<Hold> {
        let now = self.clock.now();

        if let Some(existing) = self.read_hold(event_id, user_id, HOLD_TICKETS).await? {
            if !existing.is_expired_at(now) {
                HoldMetrics::record_rejected("duplicate");
                tracing::debug!(%event_id, %user_id, "active hold already exists");
                return Err(HoldError::HoldAlreadyExists);
            }
            tracing::debug!(%event_id, %user_id, "replacing lapsed hold");
            self.release_locked(&existing, "replaced", HOLD_TICKETS).await?;
        }

        let available_key = keys::available_key(&event_id);
        let available = match self
            .store
            .get(&available_key)
            .await
            .map_err(|e| HoldError::store(HOLD_TICKETS, event_id, e))?
        {
            Some(available) => available,
            None => self.reconcile_locked(event_id).await?,
        };

        if i64::from(quantity) > available {
            HoldMetrics::record_rejected("insufficient_inventory");
            tracing::debug!(%event_id, %user_id, quantity, available, "insufficient inventory");
            return Err(HoldError::InsufficientInventory {
                requested: quantity,
                available,
            });
        }

        let hold = Hold::new(event_id, user_id, quantity, now, self.config.hold_lease);
        let record = hold.to_record().map_err(|e| {
            HoldError::store(HOLD_TICKETS, event_id, StoreError::Corrupt(e.to_string()))
        })?;

        // No store TTL on the record: the sweeper must see it to restore tickets.
        let batch = WriteBatch::new()
            .set_record(keys::hold_key(&event_id, &user_id), record, None)
            .decr_by(available_key, i64::from(quantity));
        self.store
            .apply(batch)
            .await
            .map_err(|e| HoldError::store(HOLD_TICKETS, event_id, e))?;

        HoldMetrics::record_created();
        tracing::info!(
            %event_id,
            %user_id,
            quantity,
            available = available - i64::from(quantity),
            expires_at = %hold.expires_at,
            "hold placed"
        );
        Ok(hold)
    }

    async fn release_existing(&self, event_id: EventId, user_id: UserId) -> Result<Option<Hold>> {
        let Some(hold) = self.read_hold(event_id, user_id, RELEASE_HOLD).await? else {
            tracing::debug!(%event_id, %user_id, "no hold to release");
            return Ok(None);
        };
        let restored = self.release_locked(&hold, "explicit", RELEASE_HOLD).await?;
        Ok(restored.then_some(hold))
    }

    /// Re-read a hold and release it only if its lease has lapsed.
    pub(crate) async fn release_if_lapsed(
        &self,
        event_id: EventId,
        user_id: UserId,
        operation: &'static str,
    ) -> Result<LapseOutcome> {
        let lock = self.lock_event(event_id, operation).await?;
        let result: Result<LapseOutcome> = async {
            let Some(hold) = self.read_hold(event_id, user_id, operation).await? else {
                return Ok(LapseOutcome::Gone);
            };
            if !hold.is_expired_at(self.clock.now()) {
                return Ok(LapseOutcome::Active);
            }
            if self.release_locked(&hold, "expired", operation).await? {
                Ok(LapseOutcome::Released)
            } else {
                Ok(LapseOutcome::Retired)
            }
        }
        .await;
        lock.release().await;
        result
    }

    /// Remove `hold` and credit its tickets back.
    ///
    /// Returns `false` when the hold turns out to be booked already: the
    /// record is removed and the counter is left alone.
    async fn release_locked(
        &self,
        hold: &Hold,
        cause: &'static str,
        operation: &'static str,
    ) -> Result<bool> {
        if let Some(booking) = self.booking_of(hold).await? {
            self.retire_record(hold, operation).await?;
            tracing::warn!(
                event_id = %hold.event_id,
                user_id = %hold.user_id,
                booking_id = %booking.id,
                "hold record outlived its booking, removed without credit"
            );
            return Ok(false);
        }

        let event_id = hold.event_id;
        let hold_key = keys::hold_key(&event_id, &hold.user_id);
        let available_key = keys::available_key(&event_id);
        let quantity = i64::from(hold.quantity);
        let capacity = self.capacity(event_id, operation).await?;

        let current = self
            .store
            .get(&available_key)
            .await
            .map_err(|e| HoldError::store(operation, event_id, e))?;

        if let Some(available) = current {
            let restored = available.saturating_add(quantity);
            if restored > capacity {
                tracing::error!(
                    %event_id,
                    user_id = %hold.user_id,
                    quantity,
                    available,
                    capacity,
                    "release would exceed capacity, hold left in place"
                );
                return Err(HoldError::InvariantViolation {
                    event_id,
                    detail: format!(
                        "releasing {quantity} tickets would raise availability from {available} above capacity {capacity}"
                    ),
                });
            }

            let batch = WriteBatch::new()
                .delete(hold_key)
                .incr_by(available_key, quantity);
            self.store
                .apply(batch)
                .await
                .map_err(|e| HoldError::store(operation, event_id, e))?;
        } else {
            // Counter vanished: drop the record and rebuild from what remains.
            self.store
                .delete(&hold_key)
                .await
                .map_err(|e| HoldError::store(operation, event_id, e))?;
            self.reconcile_locked(event_id).await?;
        }

        HoldMetrics::record_released(cause);
        tracing::info!(%event_id, user_id = %hold.user_id, quantity, cause, "hold released");
        Ok(true)
    }

    /// The booking `hold` was promoted into, if it was.
    pub(crate) async fn booking_of(&self, hold: &Hold) -> Result<Option<Booking>> {
        match self.bookings.get_booking(hold.booking_id).await {
            Ok(booking) => Ok(Some(booking)),
            Err(RepositoryError::NotFound(_)) => Ok(None),
            Err(e) => Err(HoldError::repository(LOOKUP_BOOKING, e)),
        }
    }

    /// Delete the record of a booked hold without touching the counter.
    pub(crate) async fn retire_record(&self, hold: &Hold, operation: &'static str) -> Result<()> {
        self.store
            .delete(&keys::hold_key(&hold.event_id, &hold.user_id))
            .await
            .map(|_| ())
            .map_err(|e| HoldError::store(operation, hold.event_id, e))
    }

    /// Return `quantity` booked tickets to the live counter.
    ///
    /// Falls back to a full reconcile when the counter is missing or the
    /// credit would push it above capacity.
    pub(crate) async fn credit_locked(
        &self,
        event_id: EventId,
        quantity: u32,
        operation: &'static str,
    ) -> Result<i64> {
        let available_key = keys::available_key(&event_id);
        let quantity = i64::from(quantity);
        let capacity = self.capacity(event_id, operation).await?;

        match self
            .store
            .get(&available_key)
            .await
            .map_err(|e| HoldError::store(operation, event_id, e))?
        {
            Some(available) if available.saturating_add(quantity) <= capacity => self
                .store
                .incr_by(&available_key, quantity)
                .await
                .map_err(|e| HoldError::store(operation, event_id, e)),
            Some(available) => {
                tracing::error!(
                    %event_id,
                    quantity,
                    available,
                    capacity,
                    "credit would exceed capacity, rebuilding counter"
                );
                self.reconcile_locked(event_id).await
            }
            None => self.reconcile_locked(event_id).await,
        }
    }

    /// Rebuild the counter from durable state.
    ///
    /// The section holds the event lock, whose lease nothing renews. Work
    /// is checked against half the lease and abandoned, with nothing
    /// written, once that budget is spent.
    async fn reconcile_locked(&self, event_id: EventId) -> Result<i64> {
        let started = Instant::now();
        let event = self.fetch_event(event_id, RECONCILE).await?;
        let confirmed = self
            .bookings
            .confirmed_quantity(event_id)
            .await
            .map_err(|e| HoldError::repository("count confirmed bookings", e))?;
        let held = self.held_quantity(event_id, started).await?;
        self.within_lease_budget(event_id, started)?;

        let capacity = i64::from(event.capacity);
        let confirmed = i64::try_from(confirmed).unwrap_or(i64::MAX);
        let mut available = capacity.saturating_sub(confirmed).saturating_sub(held);
        if available < 0 {
            tracing::error!(%event_id, capacity, confirmed, held, "event is oversold");
            available = 0;
        }

        let write = |key: String, value: i64| async move {
            self.store
                .set(&key, value, None)
                .await
                .map_err(|e| HoldError::store(RECONCILE, event_id, e))
        };
        write(keys::capacity_key(&event_id), capacity).await?;
        write(keys::available_key(&event_id), available).await?;

        tracing::info!(%event_id, capacity, confirmed, held, available, "live counter reconciled");
        Ok(available)
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub(crate) async fn read_hold(
        &self,
        event_id: EventId,
        user_id: UserId,
        operation: &'static str,
    ) -> Result<Option<Hold>> {
        let key = keys::hold_key(&event_id, &user_id);
        let Some(record) = self
            .store
            .get_record(&key)
            .await
            .map_err(|e| HoldError::store(operation, event_id, e))?
        else {
            return Ok(None);
        };

        Hold::from_record(&record).map(Some).map_err(|err| {
            tracing::error!(%event_id, %user_id, key = %key, error = %err, "unreadable hold record");
            HoldError::store(
                operation,
                event_id,
                StoreError::Corrupt("unreadable hold record".into()),
            )
        })
    }

    async fn held_quantity(&self, event_id: EventId, started: Instant) -> Result<i64> {
        let hold_keys: Vec<String> = self
            .store
            .scan(&keys::event_hold_prefix(&event_id))
            .await
            .map_err(|e| HoldError::store(RECONCILE, event_id, e))?
            .into_iter()
            .filter(|key| {
                let parsed = keys::parse_hold_key(key).is_some();
                if !parsed {
                    tracing::warn!(%event_id, key = %key, "skipping malformed hold key");
                }
                parsed
            })
            .collect();

        let mut held: i64 = 0;
        for chunk in hold_keys.chunks(RECONCILE_CHUNK) {
            self.within_lease_budget(event_id, started)?;
            let records = self
                .store
                .get_records(chunk)
                .await
                .map_err(|e| HoldError::store(RECONCILE, event_id, e))?;

            for (key, record) in chunk.iter().zip(records) {
                // Released between the scan and the read.
                let Some(record) = record else { continue };
                let hold = Hold::from_record(&record).map_err(|err| {
                    tracing::error!(%event_id, key = %key, error = %err, "unreadable hold record");
                    HoldError::store(
                        RECONCILE,
                        event_id,
                        StoreError::Corrupt("unreadable hold record".into()),
                    )
                })?;
                held = held.saturating_add(i64::from(hold.quantity));
            }
        }
        Ok(held)
    }

    fn within_lease_budget(&self, event_id: EventId, started: Instant) -> Result<()> {
        let budget = self.config.lock_lease / 2;
        let elapsed = started.elapsed();
        if elapsed >= budget {
            tracing::warn!(
                %event_id,
                elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                budget_ms = u64::try_from(budget.as_millis()).unwrap_or(u64::MAX),
                "reconcile abandoned before the lock lease could lapse"
            );
            return Err(HoldError::LockUnavailable { event_id });
        }
        Ok(())
    }

    async fn capacity(&self, event_id: EventId, operation: &'static str) -> Result<i64> {
        let key = keys::capacity_key(&event_id);
        if let Some(capacity) = self
            .store
            .get(&key)
            .await
            .map_err(|e| HoldError::store(operation, event_id, e))?
        {
            return Ok(capacity);
        }

        let capacity = i64::from(self.fetch_event(event_id, operation).await?.capacity);
        self.store
            .set(&key, capacity, None)
            .await
            .map_err(|e| HoldError::store(operation, event_id, e))?;
        Ok(capacity)
    }

    async fn fetch_event(
        &self,
        event_id: EventId,
        operation: &'static str,
    ) -> Result<EventCapacity> {
        self.events.get_event(event_id).await.map_err(|e| match e {
            RepositoryError::NotFound(_) => HoldError::EventNotFound(event_id),
            other => HoldError::repository(operation, other),
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::mutex::LocalMutex;
    use chrono::Utc;
    use std::time::Duration;
    use ticket_holds_testing::{
        InMemoryBookingRepository, InMemoryCounterStore, InMemoryEventRepository, ManualClock,
    };

    struct Fixture {
        store: InMemoryCounterStore,
        clock: ManualClock,
        manager: HoldManager,
    }

    fn fixture() -> Fixture {
        let clock = ManualClock::new(Utc::now());
        let store = InMemoryCounterStore::with_clock(Arc::new(clock.clone()));
        let bookings = InMemoryBookingRepository::new();
        let events = InMemoryEventRepository::new(bookings.clone());
        let manager = HoldManager::new(
            Arc::new(store.clone()),
            Arc::new(LocalMutex::new()),
            Arc::new(events),
            Arc::new(bookings),
            Arc::new(clock.clone()),
        );
        Fixture {
            store,
            clock,
            manager,
        }
    }

    #[tokio::test]
    async fn test_hold_debits_counter_and_writes_record() {
        let f = fixture();
        let event = f.manager.create_event("Concert", 10).await.unwrap();
        let user = UserId::new();

        let hold = f.manager.hold_tickets(event.id, user, 3).await.unwrap();

        assert_eq!(hold.quantity, 3);
        assert_eq!(f.manager.available(event.id).await.unwrap(), 7);
        assert_eq!(f.manager.get_hold(event.id, user).await.unwrap(), Some(hold));
    }

    #[tokio::test]
    async fn test_zero_quantity_is_rejected_before_locking() {
        let f = fixture();
        let err = f.manager.hold_tickets(EventId::new(), UserId::new(), 0).await.unwrap_err();
        assert_eq!(err, HoldError::InvalidQuantity);
    }

    #[tokio::test]
    async fn test_insufficient_inventory_mutates_nothing() {
        let f = fixture();
        let event = f.manager.create_event("Small room", 2).await.unwrap();
        let user = UserId::new();

        let err = f.manager.hold_tickets(event.id, user, 3).await.unwrap_err();

        assert_eq!(err, HoldError::InsufficientInventory { requested: 3, available: 2 });
        assert_eq!(f.manager.available(event.id).await.unwrap(), 2);
        assert_eq!(f.manager.get_hold(event.id, user).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unknown_event_is_not_found() {
        let f = fixture();
        let missing = EventId::new();
        let err = f.manager.hold_tickets(missing, UserId::new(), 1).await.unwrap_err();
        assert_eq!(err, HoldError::EventNotFound(missing));
    }

    #[tokio::test]
    async fn test_release_is_idempotent_and_restores_exactly() {
        let f = fixture();
        let event = f.manager.create_event("Concert", 10).await.unwrap();
        let user = UserId::new();
        f.manager.hold_tickets(event.id, user, 4).await.unwrap();

        let first = f.manager.release_hold(event.id, user).await.unwrap();
        let second = f.manager.release_hold(event.id, user).await.unwrap();

        assert_eq!(first.map(|h| h.quantity), Some(4));
        assert_eq!(second, None);
        assert_eq!(f.manager.available(event.id).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_active_duplicate_hold_is_rejected() {
        let f = fixture();
        let event = f.manager.create_event("Concert", 10).await.unwrap();
        let user = UserId::new();
        let original = f.manager.hold_tickets(event.id, user, 2).await.unwrap();

        let err = f.manager.hold_tickets(event.id, user, 5).await.unwrap_err();

        assert_eq!(err, HoldError::HoldAlreadyExists);
        assert_eq!(f.manager.available(event.id).await.unwrap(), 8);
        assert_eq!(f.manager.get_hold(event.id, user).await.unwrap(), Some(original));
    }

    #[tokio::test]
    async fn test_lapsed_hold_is_replaced() {
        let f = fixture();
        let event = f.manager.create_event("Concert", 10).await.unwrap();
        let user = UserId::new();
        f.manager.hold_tickets(event.id, user, 2).await.unwrap();

        f.clock.advance(f.manager.config().hold_lease);
        assert_eq!(f.manager.get_hold(event.id, user).await.unwrap(), None);

        let replacement = f.manager.hold_tickets(event.id, user, 5).await.unwrap();

        assert_eq!(replacement.quantity, 5);
        assert_eq!(f.manager.available(event.id).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_release_above_capacity_is_an_invariant_violation() {
        let f = fixture();
        let event = f.manager.create_event("Concert", 10).await.unwrap();
        let user = UserId::new();
        f.manager.hold_tickets(event.id, user, 3).await.unwrap();

        // Simulate a double credit from outside the manager.
        f.store.incr_by(&keys::available_key(&event.id), 3).await.unwrap();

        let err = f.manager.release_hold(event.id, user).await.unwrap_err();

        assert!(matches!(err, HoldError::InvariantViolation { .. }));
        assert!(!err.is_retryable());
        assert!(f.manager.get_hold(event.id, user).await.unwrap().is_some());
        assert_eq!(f.manager.available(event.id).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_missing_counter_is_seeded_from_durable_state() {
        let f = fixture();
        let event = f.manager.create_event("Concert", 10).await.unwrap();
        f.manager.hold_tickets(event.id, UserId::new(), 4).await.unwrap();

        // Counter store lost the live counters but kept hold records.
        f.store.delete(&keys::available_key(&event.id)).await.unwrap();
        f.store.delete(&keys::capacity_key(&event.id)).await.unwrap();

        assert_eq!(f.manager.available(event.id).await.unwrap(), 6);
        f.manager.hold_tickets(event.id, UserId::new(), 6).await.unwrap();
        assert_eq!(f.manager.available(event.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_reconcile_repairs_half_applied_release() {
        let f = fixture();
        let event = f.manager.create_event("Concert", 10).await.unwrap();
        let user = UserId::new();
        f.manager.hold_tickets(event.id, user, 3).await.unwrap();

        // Crash after deleting the record but before crediting the counter.
        f.store.delete(&keys::hold_key(&event.id, &user)).await.unwrap();
        assert_eq!(f.manager.available(event.id).await.unwrap(), 7);

        assert_eq!(f.manager.seed_counters(&[event.id]).await.unwrap(), 1);
        assert_eq!(f.manager.available(event.id).await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_failed_batch_leaves_state_untouched() {
        let f = fixture();
        let event = f.manager.create_event("Concert", 10).await.unwrap();
        let user = UserId::new();
        f.store.fail_next_apply();

        let err = f.manager.hold_tickets(event.id, user, 3).await.unwrap_err();

        assert!(matches!(err, HoldError::Store { operation: HOLD_TICKETS, .. }));
        assert!(err.is_retryable());
        assert_eq!(f.manager.available(event.id).await.unwrap(), 10);
        assert_eq!(f.manager.get_hold(event.id, user).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_capacity_beyond_store_range_is_rejected() {
        let f = fixture();

        let err = f.manager.create_event("Stadium", MAX_CAPACITY + 1).await.unwrap_err();

        assert_eq!(
            err,
            HoldError::InvalidCapacity { capacity: MAX_CAPACITY + 1, max: MAX_CAPACITY }
        );
        assert!(!err.is_retryable());

        let event = f.manager.create_event("Stadium", MAX_CAPACITY).await.unwrap();
        assert_eq!(f.manager.available(event.id).await.unwrap(), i64::from(MAX_CAPACITY));
    }

    #[tokio::test]
    async fn test_reconcile_reads_many_holds_in_chunks() {
        let f = fixture();
        let event = f.manager.create_event("Arena", 5_000).await.unwrap();
        for _ in 0..(RECONCILE_CHUNK + 20) {
            f.manager.hold_tickets(event.id, UserId::new(), 2).await.unwrap();
        }
        let held = i64::try_from(2 * (RECONCILE_CHUNK + 20)).unwrap();

        f.store.set(&keys::available_key(&event.id), 0, None).await.unwrap();

        assert_eq!(f.manager.reconcile(event.id).await.unwrap(), 5_000 - held);
    }

    #[tokio::test]
    async fn test_reconcile_past_lease_budget_writes_nothing() {
        let f = fixture();
        let bookings = InMemoryBookingRepository::new();
        let events = InMemoryEventRepository::new(bookings.clone());
        let event = Event::new("Concert", 10, f.clock.now());
        events.insert(event.clone());

        // A zero lease leaves no budget at all.
        let manager = HoldManager::new(
            Arc::new(f.store.clone()),
            Arc::new(LocalMutex::new()),
            Arc::new(events),
            Arc::new(bookings),
            Arc::new(f.clock.clone()),
        )
        .with_config(HoldConfig::default().with_lock_lease(Duration::ZERO));

        let err = manager.reconcile(event.id).await.unwrap_err();

        assert_eq!(err, HoldError::LockUnavailable { event_id: event.id });
        assert_eq!(f.store.get(&keys::available_key(&event.id)).await.unwrap(), None);
        assert_eq!(f.store.get(&keys::capacity_key(&event.id)).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_get_event_reports_durable_capacity() {
        let f = fixture();
        let event = f.manager.create_event("Concert", 10).await.unwrap();
        f.manager.hold_tickets(event.id, UserId::new(), 4).await.unwrap();

        let capacity = f.manager.get_event(event.id).await.unwrap();

        assert_eq!(capacity.capacity, 10);
        // Holds are not bookings.
        assert_eq!(capacity.available_tickets, 10);

        let missing = EventId::new();
        assert_eq!(
            f.manager.get_event(missing).await.unwrap_err(),
            HoldError::EventNotFound(missing)
        );
    }

    #[tokio::test]
    async fn test_contended_lock_reports_lock_unavailable() {
        let f = fixture();
        let mutex = Arc::new(LocalMutex::new());
        let bookings = InMemoryBookingRepository::new();
        let manager = HoldManager::new(
            Arc::new(f.store.clone()),
            Arc::clone(&mutex) as Arc<dyn DistributedMutex>,
            Arc::new(InMemoryEventRepository::new(bookings.clone())),
            Arc::new(bookings),
            Arc::new(f.clock.clone()),
        )
        .with_config(HoldConfig::default().with_lock_backoff(
            crate::backoff::BackoffPolicy::builder()
                .max_attempts(2)
                .initial_delay(Duration::from_millis(1))
                .build(),
        ));
        let event_id = EventId::new();

        let _held = mutex
            .acquire(&keys::lock_name(&event_id), Duration::from_secs(10), 1)
            .await
            .unwrap();

        let err = manager.hold_tickets(event_id, UserId::new(), 1).await.unwrap_err();
        assert_eq!(err, HoldError::LockUnavailable { event_id });
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_dropped_lock_guard_releases_lease() {
        let f = fixture();
        let event = f.manager.create_event("Concert", 10).await.unwrap();

        // A caller abandoned mid-section drops its guard without releasing.
        let lock = f.manager.lock_event(event.id, HOLD_TICKETS).await.unwrap();
        drop(lock);
        tokio::task::yield_now().await;

        f.manager.hold_tickets(event.id, UserId::new(), 1).await.unwrap();
        assert_eq!(f.manager.available(event.id).await.unwrap(), 9);
    }
}
