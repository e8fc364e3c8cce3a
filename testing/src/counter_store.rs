//! In-memory counter store.
//!
//! A `HashMap`-backed [`CounterStore`] with clock-driven TTLs. Every operation
//! and every [`WriteBatch`] runs under one mutex, so batches are atomic.
//!
//! Expired keys are invisible to reads and removed lazily on access, the same
//! way Redis expires keys passively.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use ticket_holds_core::counter_store::{CounterStore, StoreFuture, WriteBatch, WriteOp};
use ticket_holds_core::environment::{Clock, SystemClock};
use ticket_holds_core::error::StoreError;
use ticket_holds_core::types::lease_end;

#[derive(Clone, Debug, PartialEq, Eq)]
enum Value {
    Int(i64),
    Text(String),
}

#[derive(Clone, Debug)]
struct Entry {
    value: Value,
    expires_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, Entry>,
    fail_next_apply: bool,
    failing_deletes: usize,
}

/// In-memory counter store for tests and single-process runs.
///
/// # Example
///
/// ```
/// use ticket_holds_testing::InMemoryCounterStore;
/// use ticket_holds_core::CounterStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryCounterStore::new();
/// store.set("available:event:1", 10, None).await?;
/// assert_eq!(store.decr_by("available:event:1", 3).await?, 7);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct InMemoryCounterStore {
    inner: Arc<Mutex<Inner>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryCounterStore {
    /// Create an empty store on the system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create an empty store whose TTLs follow `clock`.
    #[must_use]
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            clock,
        }
    }

    /// Make the next [`CounterStore::apply`] fail without writing anything.
    pub fn fail_next_apply(&self) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.fail_next_apply = true;
        }
    }

    /// Make the next `count` calls to [`CounterStore::delete`] fail without
    /// removing anything.
    pub fn fail_next_deletes(&self, count: usize) {
        if let Ok(mut inner) = self.inner.lock() {
            inner.failing_deletes = count;
        }
    }

    /// Number of live (unexpired) keys.
    #[must_use]
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.inner.lock().map_or(0, |inner| {
            inner
                .entries
                .values()
                .filter(|entry| !is_expired(entry, now))
                .count()
        })
    }

    /// Whether the store holds no live keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Command("in-memory store mutex poisoned".into()))
    }

    fn run<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut HashMap<String, Entry>, DateTime<Utc>) -> Result<T, StoreError>,
    {
        let now = self.clock.now();
        let mut inner = self.lock()?;
        inner.entries.retain(|_, entry| !is_expired(entry, now));
        op(&mut inner.entries, now)
    }
}

impl Default for InMemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

fn is_expired(entry: &Entry, now: DateTime<Utc>) -> bool {
    entry.expires_at.is_some_and(|at| now >= at)
}

fn read_int(entries: &HashMap<String, Entry>, key: &str) -> Result<Option<i64>, StoreError> {
    match entries.get(key).map(|entry| &entry.value) {
        None => Ok(None),
        Some(Value::Int(n)) => Ok(Some(*n)),
        Some(Value::Text(text)) => text
            .parse()
            .map(Some)
            .map_err(|_| StoreError::Corrupt("value is not an integer".into())),
    }
}

fn add(entries: &mut HashMap<String, Entry>, key: &str, delta: i64) -> Result<i64, StoreError> {
    let current = read_int(entries, key)?.unwrap_or(0);
    let next = current
        .checked_add(delta)
        .ok_or_else(|| StoreError::Command("increment or decrement would overflow".into()))?;
    let expires_at = entries.get(key).and_then(|entry| entry.expires_at);
    entries.insert(
        key.to_string(),
        Entry {
            value: Value::Int(next),
            expires_at,
        },
    );
    Ok(next)
}

fn ttl_deadline(now: DateTime<Utc>, ttl: Option<Duration>) -> Option<DateTime<Utc>> {
    ttl.map(|ttl| lease_end(now, ttl))
}

impl CounterStore for InMemoryCounterStore {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<i64>> {
        Box::pin(future::ready(self.run(|entries, _| read_int(entries, key))))
    }

    fn set<'a>(&'a self, key: &'a str, value: i64, ttl: Option<Duration>) -> StoreFuture<'a, ()> {
        Box::pin(future::ready(self.run(|entries, now| {
            entries.insert(
                key.to_string(),
                Entry {
                    value: Value::Int(value),
                    expires_at: ttl_deadline(now, ttl),
                },
            );
            Ok(())
        })))
    }

    fn incr_by<'a>(&'a self, key: &'a str, delta: i64) -> StoreFuture<'a, i64> {
        Box::pin(future::ready(self.run(|entries, _| add(entries, key, delta))))
    }

    fn decr_by<'a>(&'a self, key: &'a str, delta: i64) -> StoreFuture<'a, i64> {
        Box::pin(future::ready(self.run(|entries, _| {
            let negated = delta
                .checked_neg()
                .ok_or_else(|| StoreError::Command("decrement out of range".into()))?;
            add(entries, key, negated)
        })))
    }

    fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool> {
        let now = self.clock.now();
        let result = self.lock().and_then(|mut inner| {
            if inner.failing_deletes > 0 {
                inner.failing_deletes -= 1;
                return Err(StoreError::Connection("injected failure".into()));
            }
            inner.entries.retain(|_, entry| !is_expired(entry, now));
            Ok(inner.entries.remove(key).is_some())
        });
        Box::pin(future::ready(result))
    }

    fn scan<'a>(&'a self, prefix: &'a str) -> StoreFuture<'a, Vec<String>> {
        Box::pin(future::ready(self.run(|entries, _| {
            let mut keys: Vec<String> = entries
                .keys()
                .filter(|key| key.starts_with(prefix))
                .cloned()
                .collect();
            keys.sort();
            Ok(keys)
        })))
    }

    fn get_record<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
        Box::pin(future::ready(self.run(|entries, _| {
            Ok(entries.get(key).map(|entry| match &entry.value {
                Value::Int(n) => n.to_string(),
                Value::Text(text) => text.clone(),
            }))
        })))
    }

    fn get_records<'a>(&'a self, keys: &'a [String]) -> StoreFuture<'a, Vec<Option<String>>> {
        Box::pin(future::ready(self.run(|entries, _| {
            Ok(keys
                .iter()
                .map(|key| {
                    entries.get(key).map(|entry| match &entry.value {
                        Value::Int(n) => n.to_string(),
                        Value::Text(text) => text.clone(),
                    })
                })
                .collect())
        })))
    }

    fn set_record<'a>(
        &'a self,
        key: &'a str,
        value: String,
        ttl: Option<Duration>,
    ) -> StoreFuture<'a, ()> {
        Box::pin(future::ready(self.run(|entries, now| {
            entries.insert(
                key.to_string(),
                Entry {
                    value: Value::Text(value),
                    expires_at: ttl_deadline(now, ttl),
                },
            );
            Ok(())
        })))
    }

    fn set_if_absent<'a>(
        &'a self,
        key: &'a str,
        value: String,
        ttl: Duration,
    ) -> StoreFuture<'a, bool> {
        Box::pin(future::ready(self.run(|entries, now| {
            if entries.contains_key(key) {
                return Ok(false);
            }
            entries.insert(
                key.to_string(),
                Entry {
                    value: Value::Text(value),
                    expires_at: Some(lease_end(now, ttl)),
                },
            );
            Ok(true)
        })))
    }

    fn delete_if_equals<'a>(&'a self, key: &'a str, expected: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(future::ready(self.run(|entries, _| {
            let matches = matches!(
                entries.get(key).map(|entry| &entry.value),
                Some(Value::Text(current)) if current == expected
            );
            if matches {
                entries.remove(key);
            }
            Ok(matches)
        })))
    }

    fn apply(&self, batch: WriteBatch) -> StoreFuture<'_, ()> {
        let now = self.clock.now();
        let result = self.lock().and_then(|mut inner| {
            if inner.fail_next_apply {
                inner.fail_next_apply = false;
                return Err(StoreError::Connection("injected failure".into()));
            }
            inner.entries.retain(|_, entry| !is_expired(entry, now));

            // Stage on a copy so a failing op leaves nothing behind.
            let mut staged = inner.entries.clone();
            for op in batch.into_ops() {
                match op {
                    WriteOp::SetRecord { key, value, ttl } => {
                        staged.insert(
                            key,
                            Entry {
                                value: Value::Text(value),
                                expires_at: ttl_deadline(now, ttl),
                            },
                        );
                    }
                    WriteOp::IncrBy { key, delta } => {
                        add(&mut staged, &key, delta)?;
                    }
                    WriteOp::DecrBy { key, delta } => {
                        let negated = delta
                            .checked_neg()
                            .ok_or_else(|| StoreError::Command("decrement out of range".into()))?;
                        add(&mut staged, &key, negated)?;
                    }
                    WriteOp::Delete { key } => {
                        staged.remove(&key);
                    }
                }
            }
            inner.entries = staged;
            Ok(())
        });
        Box::pin(future::ready(result))
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::ManualClock;

    #[tokio::test]
    async fn test_counter_arithmetic() {
        let store = InMemoryCounterStore::new();

        assert_eq!(store.get("c").await.unwrap(), None);
        assert_eq!(store.incr_by("c", 5).await.unwrap(), 5);
        assert_eq!(store.decr_by("c", 2).await.unwrap(), 3);
        assert_eq!(store.get("c").await.unwrap(), Some(3));
        assert!(store.delete("c").await.unwrap());
        assert!(!store.delete("c").await.unwrap());
    }

    #[tokio::test]
    async fn test_text_record_is_not_a_counter() {
        let store = InMemoryCounterStore::new();
        store.set_record("r", "{\"a\":1}".into(), None).await.unwrap();

        assert!(matches!(store.get("r").await, Err(StoreError::Corrupt(_))));
        assert!(store.incr_by("r", 1).await.is_err());
    }

    #[tokio::test]
    async fn test_ttl_follows_clock() {
        let clock = ManualClock::new(Utc::now());
        let store = InMemoryCounterStore::with_clock(Arc::new(clock.clone()));

        assert!(store.set_if_absent("lock", "a".into(), Duration::from_secs(10)).await.unwrap());
        assert!(!store.set_if_absent("lock", "b".into(), Duration::from_secs(10)).await.unwrap());

        clock.advance(Duration::from_secs(10));

        assert_eq!(store.get_record("lock").await.unwrap(), None);
        assert!(store.set_if_absent("lock", "b".into(), Duration::from_secs(10)).await.unwrap());
    }

    #[tokio::test]
    async fn test_get_records_lines_up_with_keys() {
        let store = InMemoryCounterStore::new();
        store.set_record("a", "x".into(), None).await.unwrap();
        store.set("c", 3, None).await.unwrap();

        let keys = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert_eq!(
            store.get_records(&keys).await.unwrap(),
            vec![Some("x".to_string()), None, Some("3".to_string())]
        );
    }

    #[tokio::test]
    async fn test_delete_if_equals_checks_owner() {
        let store = InMemoryCounterStore::new();
        store.set_if_absent("lock", "owner".into(), Duration::from_secs(10)).await.unwrap();

        assert!(!store.delete_if_equals("lock", "intruder").await.unwrap());
        assert_eq!(store.get_record("lock").await.unwrap().as_deref(), Some("owner"));
        assert!(store.delete_if_equals("lock", "owner").await.unwrap());
        assert_eq!(store.get_record("lock").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_scan_matches_prefix_only() {
        let store = InMemoryCounterStore::new();
        store.set_record("hold:event:1:user:a", "x".into(), None).await.unwrap();
        store.set_record("hold:event:1:user:b", "x".into(), None).await.unwrap();
        store.set_record("hold:event:2:user:a", "x".into(), None).await.unwrap();
        store.set("available:event:1", 4, None).await.unwrap();

        assert_eq!(store.scan("hold:event:").await.unwrap().len(), 3);
        assert_eq!(
            store.scan("hold:event:1:").await.unwrap(),
            vec!["hold:event:1:user:a".to_string(), "hold:event:1:user:b".to_string()]
        );
    }

    #[tokio::test]
    async fn test_batch_applies_in_order_and_all_or_nothing() {
        let store = InMemoryCounterStore::new();
        store.set("available", 10, None).await.unwrap();

        store
            .apply(WriteBatch::new().set_record("hold", "3", None).decr_by("available", 3))
            .await
            .unwrap();
        assert_eq!(store.get("available").await.unwrap(), Some(7));
        assert_eq!(store.get_record("hold").await.unwrap().as_deref(), Some("3"));

        // Second op fails (text value), so the first must not land either.
        store.set_record("text", "nope".into(), None).await.unwrap();
        let result = store
            .apply(WriteBatch::new().delete("hold").incr_by("text", 1))
            .await;
        assert!(result.is_err());
        assert_eq!(store.get_record("hold").await.unwrap().as_deref(), Some("3"));
    }

    #[tokio::test]
    async fn test_injected_delete_failures_run_out() {
        let store = InMemoryCounterStore::new();
        store.set("c", 1, None).await.unwrap();
        store.fail_next_deletes(2);

        assert!(store.delete("c").await.is_err());
        assert!(store.delete("c").await.is_err());
        assert!(store.delete("c").await.unwrap());
    }

    #[tokio::test]
    async fn test_injected_apply_failure_writes_nothing() {
        let store = InMemoryCounterStore::new();
        store.fail_next_apply();

        let result = store.apply(WriteBatch::new().incr_by("c", 1)).await;
        assert!(matches!(result, Err(StoreError::Connection(_))));
        assert_eq!(store.get("c").await.unwrap(), None);

        store.apply(WriteBatch::new().incr_by("c", 1)).await.unwrap();
        assert_eq!(store.get("c").await.unwrap(), Some(1));
    }
}
