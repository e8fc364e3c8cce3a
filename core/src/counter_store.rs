//! Counter store abstraction.
//!
//! The counter store is an in-memory, network-accessible key/value store. It
//! holds the live available-ticket counter of every event, the hold records
//! and the mutex leases. Every single-key operation is atomic at the store.
//!
//! # Multi-key writes
//!
//! Moving tickets between a hold record and a counter touches two keys. Those
//! writes are submitted as a [`WriteBatch`]: backends apply a batch atomically
//! where they can (Redis `MULTI`/`EXEC`) and always in the order given, so a
//! crash part-way through leaves state that reconciliation can repair.
//!
//! # Implementations
//!
//! - `RedisCounterStore` (in `ticket-holds-redis`): production
//! - `InMemoryCounterStore` (in `ticket-holds-testing`): tests and
//!   single-process runs
//!
//! # Dyn Compatibility
//!
//! Methods return `Pin<Box<dyn Future>>` so the store can be shared as
//! `Arc<dyn CounterStore>`.

use crate::error::StoreError;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Boxed future returned by counter store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// One write inside a [`WriteBatch`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WriteOp {
    /// Store a string record, optionally with a TTL.
    SetRecord {
        /// Key to write
        key: String,
        /// Record value
        value: String,
        /// Optional expiry
        ttl: Option<Duration>,
    },
    /// Add `delta` to an integer counter.
    IncrBy {
        /// Counter key
        key: String,
        /// Amount to add
        delta: i64,
    },
    /// Subtract `delta` from an integer counter.
    DecrBy {
        /// Counter key
        key: String,
        /// Amount to subtract
        delta: i64,
    },
    /// Remove a key.
    Delete {
        /// Key to remove
        key: String,
    },
}

/// Ordered group of writes applied as one unit.
///
/// # Example
///
/// ```
/// use ticket_holds_core::counter_store::{WriteBatch, WriteOp};
///
/// let batch = WriteBatch::new()
///     .set_record("hold:event:e:user:u", "{}", None)
///     .decr_by("available:event:e", 3);
///
/// assert_eq!(batch.ops().len(), 2);
/// assert!(matches!(batch.ops()[0], WriteOp::SetRecord { .. }));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    /// Create an empty batch.
    #[must_use]
    pub const fn new() -> Self {
        Self { ops: Vec::new() }
    }

    /// Append a record write.
    #[must_use]
    pub fn set_record(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
        ttl: Option<Duration>,
    ) -> Self {
        self.ops.push(WriteOp::SetRecord {
            key: key.into(),
            value: value.into(),
            ttl,
        });
        self
    }

    /// Append a counter increment.
    #[must_use]
    pub fn incr_by(mut self, key: impl Into<String>, delta: i64) -> Self {
        self.ops.push(WriteOp::IncrBy {
            key: key.into(),
            delta,
        });
        self
    }

    /// Append a counter decrement.
    #[must_use]
    pub fn decr_by(mut self, key: impl Into<String>, delta: i64) -> Self {
        self.ops.push(WriteOp::DecrBy {
            key: key.into(),
            delta,
        });
        self
    }

    /// Append a key deletion.
    #[must_use]
    pub fn delete(mut self, key: impl Into<String>) -> Self {
        self.ops.push(WriteOp::Delete { key: key.into() });
        self
    }

    /// Writes in application order.
    #[must_use]
    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    /// Consume the batch, yielding its writes in order.
    #[must_use]
    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }

    /// Whether the batch has no writes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Key/value store holding live counters, hold records and mutex leases.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; one instance is shared by every
/// request task and the sweeper.
pub trait CounterStore: Send + Sync {
    /// Read an integer counter. `None` when the key is absent.
    ///
    /// # Errors
    ///
    /// - `StoreError::Corrupt` if the value is not an integer
    /// - `StoreError::Connection` / `StoreError::Command` on backend failure
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<i64>>;

    /// Overwrite an integer counter, optionally with a TTL.
    ///
    /// # Errors
    ///
    /// Returns an error on backend failure.
    fn set<'a>(&'a self, key: &'a str, value: i64, ttl: Option<Duration>) -> StoreFuture<'a, ()>;

    /// Atomically add `delta`, returning the new value. Absent keys start at 0.
    ///
    /// # Errors
    ///
    /// Returns an error on backend failure or if the value is not an integer.
    fn incr_by<'a>(&'a self, key: &'a str, delta: i64) -> StoreFuture<'a, i64>;

    /// Atomically subtract `delta`, returning the new value. Absent keys start at 0.
    ///
    /// # Errors
    ///
    /// Returns an error on backend failure or if the value is not an integer.
    fn decr_by<'a>(&'a self, key: &'a str, delta: i64) -> StoreFuture<'a, i64>;

    /// Remove a key. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error on backend failure.
    fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool>;

    /// Enumerate keys starting with `prefix` without blocking writers.
    ///
    /// The result may include keys written or miss keys deleted while the
    /// scan ran; callers must re-read each key before acting on it.
    ///
    /// # Errors
    ///
    /// Returns an error on backend failure.
    fn scan<'a>(&'a self, prefix: &'a str) -> StoreFuture<'a, Vec<String>>;

    /// Read a string record. `None` when the key is absent.
    ///
    /// # Errors
    ///
    /// Returns an error on backend failure.
    fn get_record<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>>;

    /// Read several string records in one round trip.
    ///
    /// The result lines up with `keys`; absent keys yield `None`.
    ///
    /// # Errors
    ///
    /// Returns an error on backend failure.
    fn get_records<'a>(&'a self, keys: &'a [String]) -> StoreFuture<'a, Vec<Option<String>>>;

    /// Write a string record, optionally with a TTL.
    ///
    /// # Errors
    ///
    /// Returns an error on backend failure.
    fn set_record<'a>(
        &'a self,
        key: &'a str,
        value: String,
        ttl: Option<Duration>,
    ) -> StoreFuture<'a, ()>;

    /// Write `value` with `ttl` only if `key` is absent. Returns whether it was written.
    ///
    /// # Errors
    ///
    /// Returns an error on backend failure.
    fn set_if_absent<'a>(
        &'a self,
        key: &'a str,
        value: String,
        ttl: Duration,
    ) -> StoreFuture<'a, bool>;

    /// Atomically delete `key` only if it currently holds `expected`.
    ///
    /// # Errors
    ///
    /// Returns an error on backend failure.
    fn delete_if_equals<'a>(&'a self, key: &'a str, expected: &'a str) -> StoreFuture<'a, bool>;

    /// Apply a batch of writes in order, atomically where the backend allows.
    ///
    /// # Errors
    ///
    /// Returns an error on backend failure. A non-atomic backend may have
    /// applied a prefix of the batch.
    fn apply(&self, batch: WriteBatch) -> StoreFuture<'_, ()>;
}
