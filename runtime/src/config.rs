//! Hold subsystem configuration.

use crate::backoff::BackoffPolicy;
use std::time::Duration;

/// Tunables shared by the hold manager, promoter and sweeper.
///
/// # Example
///
/// ```rust
/// use ticket_holds_runtime::HoldConfig;
/// use std::time::Duration;
///
/// let config = HoldConfig::default()
///     .with_hold_lease(Duration::from_secs(120))
///     .with_sweep_interval(Duration::from_secs(10));
///
/// assert_eq!(config.hold_lease, Duration::from_secs(120));
/// assert_eq!(config.lock_lease, Duration::from_secs(10));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoldConfig {
    /// How long a hold stays active before the sweeper may reclaim it
    pub hold_lease: Duration,
    /// Lease on the per-event lock; bounds how long a crashed holder blocks others
    pub lock_lease: Duration,
    /// Retry schedule for lock acquisition
    pub lock_backoff: BackoffPolicy,
    /// Pause between sweeper passes
    pub sweep_interval: Duration,
}

impl Default for HoldConfig {
    fn default() -> Self {
        Self {
            hold_lease: Duration::from_secs(5 * 60),
            lock_lease: Duration::from_secs(10),
            lock_backoff: BackoffPolicy::default(),
            sweep_interval: Duration::from_secs(30),
        }
    }
}

impl HoldConfig {
    /// Set the hold lease.
    #[must_use]
    pub const fn with_hold_lease(mut self, lease: Duration) -> Self {
        self.hold_lease = lease;
        self
    }

    /// Set the lock lease.
    #[must_use]
    pub const fn with_lock_lease(mut self, lease: Duration) -> Self {
        self.lock_lease = lease;
        self
    }

    /// Set the lock backoff policy.
    #[must_use]
    pub const fn with_lock_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.lock_backoff = backoff;
        self
    }

    /// Set the sweep interval.
    #[must_use]
    pub const fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self
    }
}
