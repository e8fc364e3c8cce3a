//! # Ticket Holds Runtime
//!
//! The hold subsystem proper: everything that coordinates the counter store,
//! the per-event lock and the transactional store.
//!
//! ## Core Components
//!
//! - **`HoldManager`**: places and releases holds under the per-event lock
//! - **`BookingPromoter`**: converts an active hold into a durable booking
//! - **`Sweeper`**: periodically restores the tickets of lapsed holds
//! - **`LeaseMutex` / `LocalMutex`**: the two distributed mutex implementations
//!
//! ## Example
//!
//! ```ignore
//! use ticket_holds_runtime::{BookingPromoter, HoldManager, LeaseMutex, Sweeper};
//!
//! let mutex = Arc::new(LeaseMutex::new(store.clone()).with_backoff(config.lock_backoff));
//! let manager = Arc::new(
//!     HoldManager::new(store, mutex, events, bookings, Arc::new(SystemClock))
//!         .with_config(config),
//! );
//!
//! let hold = manager.hold_tickets(event_id, user_id, 3).await?;
//! let booking = BookingPromoter::new(Arc::clone(&manager))
//!     .promote_hold(event_id, user_id)
//!     .await?;
//!
//! let sweeper = Sweeper::new(manager).spawn();
//! sweeper.shutdown().await?;
//! ```

pub mod backoff;
pub mod config;
pub mod manager;
pub mod metrics;
pub mod mutex;
pub mod promoter;
pub mod sweeper;

pub use backoff::{BackoffPolicy, BackoffPolicyBuilder};
pub use config::HoldConfig;
pub use manager::HoldManager;
pub use mutex::{LeaseMutex, LocalMutex};
pub use promoter::BookingPromoter;
pub use sweeper::{SweepReport, Sweeper, SweeperHandle};
