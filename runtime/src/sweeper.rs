//! Reconciliation sweeper: restores the tickets of lapsed holds.
//!
//! The scan runs without any lock. Each candidate is then re-read and
//! released under its own event lock, so a hold promoted or released while
//! the scan ran is simply found gone.

use crate::manager::{HoldManager, LapseOutcome};
use crate::metrics::HoldMetrics;
use std::sync::Arc;
use std::time::Duration;
use ticket_holds_core::error::StoreError;
use ticket_holds_core::keys;
use tokio::sync::broadcast;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::MissedTickBehavior;

const SWEEP: &str = "sweep expired holds";

/// Outcome of one sweeper pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Hold keys found by the scan
    pub scanned: usize,
    /// Lapsed holds whose tickets were restored
    pub released: usize,
    /// Holds still inside their lease
    pub skipped_active: usize,
    /// Leftover records of booked holds, removed without restoring tickets
    pub retired: usize,
    /// Keys that could not be processed this pass
    pub failed: usize,
}

/// Periodic sweep of lapsed holds.
#[derive(Clone)]
pub struct Sweeper {
    manager: Arc<HoldManager>,
    interval: Duration,
}

impl Sweeper {
    /// Create a sweeper running every `sweep_interval` of the manager's config.
    #[must_use]
    pub fn new(manager: Arc<HoldManager>) -> Self {
        let interval = manager.config().sweep_interval;
        Self { manager, interval }
    }

    /// Override the pause between passes.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run a single pass over every hold record.
    ///
    /// Per-hold failures are counted in [`SweepReport::failed`] and retried
    /// on the next pass.
    ///
    /// # Errors
    ///
    /// Returns an error only if the key scan itself fails.
    pub async fn sweep_once(&self) -> Result<SweepReport, StoreError> {
        let hold_keys = self.manager.store().scan(keys::HOLD_PREFIX).await?;
        let mut report = SweepReport {
            scanned: hold_keys.len(),
            ..SweepReport::default()
        };

        for key in &hold_keys {
            let Some((event_id, user_id)) = keys::parse_hold_key(key) else {
                tracing::warn!(key = %key, "malformed hold key");
                report.failed += 1;
                continue;
            };

            match self.manager.release_if_lapsed(event_id, user_id, SWEEP).await {
                Ok(LapseOutcome::Released) => report.released += 1,
                Ok(LapseOutcome::Active) => report.skipped_active += 1,
                Ok(LapseOutcome::Retired) => report.retired += 1,
                Ok(LapseOutcome::Gone) => {}
                Err(err) => {
                    tracing::warn!(%event_id, %user_id, error = %err, "lapsed hold not released");
                    report.failed += 1;
                }
            }
        }

        HoldMetrics::record_sweep();
        if report.released > 0 || report.retired > 0 || report.failed > 0 {
            tracing::info!(
                scanned = report.scanned,
                released = report.released,
                retired = report.retired,
                failed = report.failed,
                "sweep finished"
            );
        } else {
            tracing::debug!(scanned = report.scanned, "sweep finished");
        }
        Ok(report)
    }

    /// Sweep on every tick until `shutdown` fires.
    ///
    /// A pass already running when the signal arrives completes first.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(interval_secs = self.interval.as_secs(), "sweeper started");

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                _ = ticker.tick() => {
                    if let Err(err) = self.sweep_once().await {
                        tracing::warn!(error = %err, "sweep scan failed");
                    }
                }
            }
        }

        tracing::info!("sweeper stopped");
    }

    /// Spawn [`Sweeper::run`] on the current runtime.
    #[must_use]
    pub fn spawn(self) -> SweeperHandle {
        let (shutdown, receiver) = broadcast::channel(1);
        let task = tokio::spawn(self.run(receiver));
        SweeperHandle { shutdown, task }
    }
}

/// Handle to a spawned [`Sweeper`].
pub struct SweeperHandle {
    shutdown: broadcast::Sender<()>,
    task: JoinHandle<()>,
}

impl SweeperHandle {
    /// Signal shutdown and wait for the in-flight pass to finish.
    ///
    /// # Errors
    ///
    /// Returns an error if the sweeper task panicked.
    pub async fn shutdown(self) -> Result<(), JoinError> {
        // Fails only if the task already exited.
        let _ = self.shutdown.send(());
        self.task.await
    }

    /// Whether the sweeper task has exited.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
