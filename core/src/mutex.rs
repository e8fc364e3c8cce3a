//! Distributed mutex capability.
//!
//! A lease-based mutual-exclusion primitive. Any coordination service that can
//! grant expiring, token-owned leases satisfies it: the counter store itself
//! (`LeaseMutex`), or an in-process table for single-process deployments
//! (`LocalMutex`). Both live in `ticket-holds-runtime`.
//!
//! # Guarantees
//!
//! - At most one token owns a name at a time.
//! - A lease lapses after `lease` even if its owner never releases it.
//! - Only the current owner can release; a stale or foreign token gets
//!   `LockError::NotOwner` and changes nothing.
//! - Acquisition retries with backoff and gives up after `max_retries`
//!   attempts with `LockError::Timeout`; it never blocks indefinitely.

use crate::error::LockError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use uuid::Uuid;

/// Boxed future returned by mutex operations.
pub type LockFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, LockError>> + Send + 'a>>;

/// Proof of ownership for one acquisition of a named lock.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LockToken(String);

impl LockToken {
    /// Generate a fresh, unguessable token.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Wrap an existing token value.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Token value as stored by the backend.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lease-based mutual exclusion keyed by name.
pub trait DistributedMutex: Send + Sync {
    /// Acquire `name` for `lease`, retrying up to `max_retries` times.
    ///
    /// # Errors
    ///
    /// - `LockError::Timeout` if the lock stayed held for every attempt
    /// - `LockError::Store` if the coordination backend failed
    fn acquire<'a>(
        &'a self,
        name: &'a str,
        lease: Duration,
        max_retries: u32,
    ) -> LockFuture<'a, LockToken>;

    /// Release `name` if `token` still owns it.
    ///
    /// # Errors
    ///
    /// - `LockError::NotOwner` if the lease lapsed or belongs to another token
    /// - `LockError::Store` if the coordination backend failed
    fn release<'a>(&'a self, name: &'a str, token: &'a LockToken) -> LockFuture<'a, ()>;
}
