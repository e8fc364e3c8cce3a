//! Redis-backed counter store.
//!
//! Implements [`CounterStore`] over the Redis protocol.
//!
//! # Architecture
//!
//! - **Counters**: plain integer strings, moved with `INCRBY` / `DECRBY`
//! - **Hold records**: JSON strings, written without expiry
//! - **Lock leases**: `SET key token NX PX lease`, released by a Lua
//!   compare-and-delete so only the owner can remove them
//! - **Batches**: `MULTI` / `EXEC` pipelines. Redis does not roll back a
//!   transaction when one command fails, so batch order still matters.
//!
//! # Example
//!
//! ```no_run
//! use ticket_holds_redis::RedisCounterStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = RedisCounterStore::new("redis://:secret@127.0.0.1:6379/0").await?;
//! # Ok(())
//! # }
//! ```

use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, ErrorKind, RedisError, Script};
use std::time::Duration;
use ticket_holds_core::counter_store::{CounterStore, StoreFuture, WriteBatch, WriteOp};
use ticket_holds_core::error::StoreError;

/// Delete `KEYS[1]` only while it still holds `ARGV[1]`.
const DELETE_IF_EQUALS: &str = r"
    if redis.call('GET', KEYS[1]) == ARGV[1] then
        return redis.call('DEL', KEYS[1])
    end
    return 0
";

/// Keys fetched per `SCAN` round trip.
const SCAN_COUNT: usize = 500;

/// Counter store over a shared Redis.
///
/// Cheap to clone: clones share one multiplexed connection that reconnects
/// on failure.
#[derive(Clone)]
pub struct RedisCounterStore {
    conn_manager: ConnectionManager,
    delete_if_equals: Script,
}

impl RedisCounterStore {
    /// Connect to Redis.
    ///
    /// # Arguments
    ///
    /// * `redis_url` - e.g. `redis://:password@host:6379/0`; host, port,
    ///   credential and database all come from the URL
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Connection` if the URL is invalid or Redis is
    /// unreachable.
    pub async fn new(redis_url: &str) -> Result<Self, StoreError> {
        let client = Client::open(redis_url)
            .map_err(|e| StoreError::Connection(format!("invalid Redis URL: {e}")))?;

        let conn_manager = ConnectionManager::new(client)
            .await
            .map_err(|e| StoreError::Connection(format!("failed to connect to Redis: {e}")))?;

        Ok(Self {
            conn_manager,
            delete_if_equals: Script::new(DELETE_IF_EQUALS),
        })
    }

    /// Round-trip a `PING`.
    ///
    /// # Errors
    ///
    /// Returns an error if Redis does not answer.
    pub async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn_manager.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }
}

/// Classify a Redis failure.
fn map_redis_error(err: RedisError) -> StoreError {
    if err.is_io_error()
        || err.is_connection_dropped()
        || err.is_connection_refusal()
        || err.is_timeout()
    {
        StoreError::Connection(err.to_string())
    } else if err.kind() == ErrorKind::TypeError {
        StoreError::Corrupt(err.to_string())
    } else {
        StoreError::Command(err.to_string())
    }
}

fn millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

/// Escape glob metacharacters so a prefix matches literally in `SCAN MATCH`.
fn match_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('*');
    pattern
}

impl CounterStore for RedisCounterStore {
    fn get<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<i64>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            conn.get(key).await.map_err(map_redis_error)
        })
    }

    fn set<'a>(&'a self, key: &'a str, value: i64, ttl: Option<Duration>) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let mut cmd = redis::cmd("SET");
            cmd.arg(key).arg(value);
            if let Some(ttl) = ttl {
                cmd.arg("PX").arg(millis(ttl));
            }
            let _: () = cmd.query_async(&mut conn).await.map_err(map_redis_error)?;
            Ok(())
        })
    }

    fn incr_by<'a>(&'a self, key: &'a str, delta: i64) -> StoreFuture<'a, i64> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            conn.incr(key, delta).await.map_err(map_redis_error)
        })
    }

    fn decr_by<'a>(&'a self, key: &'a str, delta: i64) -> StoreFuture<'a, i64> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            conn.decr(key, delta).await.map_err(map_redis_error)
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let removed: usize = conn.del(key).await.map_err(map_redis_error)?;
            Ok(removed > 0)
        })
    }

    fn scan<'a>(&'a self, prefix: &'a str) -> StoreFuture<'a, Vec<String>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let pattern = match_pattern(prefix);
            let mut cursor: u64 = 0;
            let mut keys = Vec::new();

            // SCAN may return a key more than once across rounds.
            loop {
                let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(&pattern)
                    .arg("COUNT")
                    .arg(SCAN_COUNT)
                    .query_async(&mut conn)
                    .await
                    .map_err(map_redis_error)?;
                keys.extend(batch);
                if next == 0 {
                    break;
                }
                cursor = next;
            }

            keys.sort();
            keys.dedup();
            tracing::trace!(prefix, count = keys.len(), "scan finished");
            Ok(keys)
        })
    }

    fn get_record<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            conn.get(key).await.map_err(map_redis_error)
        })
    }

    fn get_records<'a>(&'a self, keys: &'a [String]) -> StoreFuture<'a, Vec<Option<String>>> {
        Box::pin(async move {
            // MGET with no keys is a syntax error.
            if keys.is_empty() {
                return Ok(Vec::new());
            }
            let mut conn = self.conn_manager.clone();
            redis::cmd("MGET")
                .arg(keys)
                .query_async(&mut conn)
                .await
                .map_err(map_redis_error)
        })
    }

    fn set_record<'a>(
        &'a self,
        key: &'a str,
        value: String,
        ttl: Option<Duration>,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let mut cmd = redis::cmd("SET");
            cmd.arg(key).arg(value);
            if let Some(ttl) = ttl {
                cmd.arg("PX").arg(millis(ttl));
            }
            let _: () = cmd.query_async(&mut conn).await.map_err(map_redis_error)?;
            Ok(())
        })
    }

    fn set_if_absent<'a>(
        &'a self,
        key: &'a str,
        value: String,
        ttl: Duration,
    ) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let reply: Option<String> = redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("NX")
                .arg("PX")
                .arg(millis(ttl))
                .query_async(&mut conn)
                .await
                .map_err(map_redis_error)?;
            Ok(reply.is_some())
        })
    }

    fn delete_if_equals<'a>(&'a self, key: &'a str, expected: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let mut conn = self.conn_manager.clone();
            let removed: i64 = self
                .delete_if_equals
                .key(key)
                .arg(expected)
                .invoke_async(&mut conn)
                .await
                .map_err(map_redis_error)?;
            Ok(removed == 1)
        })
    }

    fn apply(&self, batch: WriteBatch) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            if batch.is_empty() {
                return Ok(());
            }

            let mut pipe = redis::pipe();
            pipe.atomic();
            for op in batch.into_ops() {
                match op {
                    WriteOp::SetRecord { key, value, ttl } => match ttl {
                        Some(ttl) => {
                            pipe.cmd("SET").arg(key).arg(value).arg("PX").arg(millis(ttl)).ignore();
                        }
                        None => {
                            pipe.set(key, value).ignore();
                        }
                    },
                    WriteOp::IncrBy { key, delta } => {
                        pipe.incr(key, delta).ignore();
                    }
                    WriteOp::DecrBy { key, delta } => {
                        pipe.decr(key, delta).ignore();
                    }
                    WriteOp::Delete { key } => {
                        pipe.del(key).ignore();
                    }
                }
            }

            let mut conn = self.conn_manager.clone();
            let _: () = pipe.query_async(&mut conn).await.map_err(map_redis_error)?;
            Ok(())
        })
    }
}
