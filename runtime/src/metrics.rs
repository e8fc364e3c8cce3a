//! Prometheus metrics for the hold subsystem.
//!
//! # Example
//!
//! ```rust,no_run
//! use ticket_holds_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // Scrape endpoint on port 9090
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//! # Ok(())
//! # }
//! ```

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Errors from metrics setup.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build the exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install the exporter
    #[error("Failed to install metrics exporter: {0}")]
    Install(String),
}

/// Prometheus scrape endpoint.
pub struct MetricsServer {
    addr: SocketAddr,
    started: bool,
}

impl MetricsServer {
    /// Create a server that will listen on `addr`.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            started: false,
        }
    }

    /// Register metric descriptions and start the HTTP listener.
    ///
    /// Must run inside a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the exporter cannot be built or a recorder is
    /// already installed.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        if self.started {
            return Ok(());
        }

        PrometheusBuilder::new()
            .with_http_listener(self.addr)
            .set_buckets_for_metric(
                Matcher::Suffix("wait_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?
            .install()
            .map_err(|e| MetricsError::Install(e.to_string()))?;

        register_metrics();
        self.started = true;
        tracing::info!(addr = %self.addr, "Metrics available at http://{}/metrics", self.addr);
        Ok(())
    }
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!("ticket_holds_created_total", "Holds successfully placed");
    describe_counter!(
        "ticket_holds_rejected_total",
        "Hold requests rejected, labelled by reason"
    );
    describe_counter!(
        "ticket_holds_released_total",
        "Holds released, labelled by cause (explicit, expired, replaced)"
    );
    describe_counter!("ticket_holds_promoted_total", "Holds promoted into bookings");
    describe_counter!("ticket_holds_bookings_cancelled_total", "Confirmed bookings cancelled");
    describe_counter!("ticket_holds_sweep_runs_total", "Completed sweeper passes");
    describe_counter!(
        "ticket_holds_lock_timeouts_total",
        "Per-event lock acquisitions that exhausted their retry budget"
    );
    describe_histogram!(
        "ticket_holds_lock_wait_seconds",
        "Time spent acquiring the per-event lock"
    );
}

/// Hold subsystem metrics recorder.
pub struct HoldMetrics;

impl HoldMetrics {
    /// Record a placed hold.
    pub fn record_created() {
        counter!("ticket_holds_created_total").increment(1);
    }

    /// Record a rejected hold request.
    pub fn record_rejected(reason: &'static str) {
        counter!("ticket_holds_rejected_total", "reason" => reason).increment(1);
    }

    /// Record a released hold.
    pub fn record_released(cause: &'static str) {
        counter!("ticket_holds_released_total", "cause" => cause).increment(1);
    }

    /// Record a promotion.
    pub fn record_promoted() {
        counter!("ticket_holds_promoted_total").increment(1);
    }

    /// Record a cancelled booking.
    pub fn record_cancelled() {
        counter!("ticket_holds_bookings_cancelled_total").increment(1);
    }

    /// Record a finished sweeper pass.
    pub fn record_sweep() {
        counter!("ticket_holds_sweep_runs_total").increment(1);
    }

    /// Record time spent waiting for the event lock.
    pub fn record_lock_wait(waited: Duration) {
        histogram!("ticket_holds_lock_wait_seconds").record(waited.as_secs_f64());
    }

    /// Record an exhausted lock retry budget.
    pub fn record_lock_timeout() {
        counter!("ticket_holds_lock_timeouts_total").increment(1);
    }
}
