//! HTTP handlers.
//!
//! Handlers translate requests into hold operations and map results back;
//! they never touch the counter store directly.

pub mod bookings;
pub mod events;
pub mod health;
pub mod holds;
