//! Distributed mutex implementations.
//!
//! - [`LeaseMutex`]: leases stored in any [`CounterStore`] with
//!   `SET NX PX`-style writes and compare-and-delete release. With a shared
//!   Redis this serializes every process that talks to it.
//! - [`LocalMutex`]: an in-process lease table for single-process
//!   deployments and tests.
//!
//! Both retry acquisition on the same [`BackoffPolicy`] schedule and give up
//! with [`LockError::Timeout`] once the attempt budget is spent.

use crate::backoff::BackoffPolicy;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use ticket_holds_core::counter_store::CounterStore;
use ticket_holds_core::error::{LockError, StoreError};
use ticket_holds_core::mutex::{DistributedMutex, LockFuture, LockToken};
use tokio::time::{Instant, sleep};

/// Run `try_once` until it grants the lock or the attempt budget is spent.
async fn acquire_with_backoff<F, Fut>(
    name: &str,
    max_retries: u32,
    backoff: &BackoffPolicy,
    mut try_once: F,
) -> Result<LockToken, LockError>
where
    F: FnMut(LockToken) -> Fut,
    Fut: Future<Output = Result<bool, LockError>>,
{
    let attempts = max_retries.max(1);

    for attempt in 0..attempts {
        let token = LockToken::generate();
        if try_once(token.clone()).await? {
            if attempt > 0 {
                tracing::debug!(lock = name, attempt, "lock acquired after contention");
            }
            return Ok(token);
        }

        if attempt + 1 < attempts {
            let delay = backoff.jittered_delay(attempt);
            tracing::debug!(
                lock = name,
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "lock contended, backing off"
            );
            sleep(delay).await;
        }
    }

    tracing::warn!(lock = name, attempts, "lock not acquired");
    Err(LockError::Timeout {
        name: name.to_string(),
        attempts,
    })
}

// ============================================================================
// LeaseMutex
// ============================================================================

/// Distributed mutex whose leases live in a [`CounterStore`].
///
/// The lock key holds the owner's token and expires after the lease, so a
/// crashed owner blocks others for at most one lease.
///
/// # Example
///
/// ```rust,ignore
/// let mutex = LeaseMutex::new(store.clone()).with_backoff(config.lock_backoff);
/// let token = mutex.acquire("lock:event:42", Duration::from_secs(10), 5).await?;
/// // critical section
/// mutex.release("lock:event:42", &token).await?;
/// ```
#[derive(Clone)]
pub struct LeaseMutex {
    store: Arc<dyn CounterStore>,
    backoff: BackoffPolicy,
}

impl LeaseMutex {
    /// Create a mutex over `store` with the default backoff.
    #[must_use]
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self {
            store,
            backoff: BackoffPolicy::default(),
        }
    }

    /// Replace the backoff schedule.
    #[must_use]
    pub const fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }
}

impl DistributedMutex for LeaseMutex {
    fn acquire<'a>(
        &'a self,
        name: &'a str,
        lease: Duration,
        max_retries: u32,
    ) -> LockFuture<'a, LockToken> {
        Box::pin(acquire_with_backoff(name, max_retries, &self.backoff, move |token| async move {
            Ok(self
                .store
                .set_if_absent(name, token.as_str().to_string(), lease)
                .await?)
        }))
    }

    fn release<'a>(&'a self, name: &'a str, token: &'a LockToken) -> LockFuture<'a, ()> {
        Box::pin(async move {
            if self.store.delete_if_equals(name, token.as_str()).await? {
                Ok(())
            } else {
                Err(LockError::NotOwner {
                    name: name.to_string(),
                })
            }
        })
    }
}

// ============================================================================
// LocalMutex
// ============================================================================

#[derive(Debug, Clone)]
struct Lease {
    token: LockToken,
    expires_at: Instant,
}

/// In-process lease table implementing [`DistributedMutex`].
///
/// Leases use the tokio clock, so paused-time tests can expire them.
#[derive(Clone, Default)]
pub struct LocalMutex {
    leases: Arc<Mutex<HashMap<String, Lease>>>,
    backoff: BackoffPolicy,
}

impl LocalMutex {
    /// Create an empty lease table with the default backoff.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the backoff schedule.
    #[must_use]
    pub const fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    fn poisoned() -> LockError {
        LockError::Store(StoreError::Command("local lease table poisoned".into()))
    }

    fn try_grant(&self, name: &str, token: LockToken, lease: Duration) -> Result<bool, LockError> {
        let now = Instant::now();
        let mut leases = self.leases.lock().map_err(|_| Self::poisoned())?;

        if leases.get(name).is_some_and(|held| held.expires_at > now) {
            return Ok(false);
        }
        leases.insert(
            name.to_string(),
            Lease {
                token,
                expires_at: now + lease,
            },
        );
        Ok(true)
    }
}

impl DistributedMutex for LocalMutex {
    fn acquire<'a>(
        &'a self,
        name: &'a str,
        lease: Duration,
        max_retries: u32,
    ) -> LockFuture<'a, LockToken> {
        Box::pin(acquire_with_backoff(name, max_retries, &self.backoff, move |token| {
            std::future::ready(self.try_grant(name, token, lease))
        }))
    }

    fn release<'a>(&'a self, name: &'a str, token: &'a LockToken) -> LockFuture<'a, ()> {
        let result = self
            .leases
            .lock()
            .map_err(|_| Self::poisoned())
            .and_then(|mut leases| {
                let owned = leases
                    .get(name)
                    .is_some_and(|held| held.token == *token && held.expires_at > Instant::now());
                if owned {
                    leases.remove(name);
                    Ok(())
                } else {
                    Err(LockError::NotOwner {
                        name: name.to_string(),
                    })
                }
            });
        Box::pin(std::future::ready(result))
    }
}
