//! Application state for Axum handlers.

use std::sync::Arc;
use ticket_holds_runtime::{BookingPromoter, HoldManager};

/// State shared across all HTTP handlers.
///
/// Handlers only reach the counters through the manager and promoter.
#[derive(Clone)]
pub struct AppState {
    /// Places and releases holds
    pub manager: Arc<HoldManager>,
    /// Turns holds into bookings
    pub promoter: BookingPromoter,
}

impl AppState {
    /// Create state around a shared manager.
    #[must_use]
    pub fn new(manager: Arc<HoldManager>) -> Self {
        Self {
            promoter: BookingPromoter::new(Arc::clone(&manager)),
            manager,
        }
    }
}
