//! Counter store key naming.
//!
//! These names are shared by every process touching the counter store and by
//! the sweeper's scan, so they must never change:
//!
//! | Key | Holds |
//! |-----|-------|
//! | `hold:event:<eventID>:user:<userID>` | JSON hold record |
//! | `available:event:<eventID>` | live available-ticket counter |
//! | `capacity:event:<eventID>` | capacity mirror used by the release guard |
//! | `lock:event:<eventID>` | per-event mutex lease |
//!
//! Key names are internal: they appear in debug logs but never in errors
//! surfaced to callers.

use crate::types::{EventId, UserId};

/// Prefix shared by every hold record.
pub const HOLD_PREFIX: &str = "hold:event:";

/// Key of the hold record for `(event_id, user_id)`.
#[must_use]
pub fn hold_key(event_id: &EventId, user_id: &UserId) -> String {
    format!("{HOLD_PREFIX}{event_id}:user:{user_id}")
}

/// Prefix of every hold record for one event.
#[must_use]
pub fn event_hold_prefix(event_id: &EventId) -> String {
    format!("{HOLD_PREFIX}{event_id}:user:")
}

/// Key of the live available-ticket counter.
#[must_use]
pub fn available_key(event_id: &EventId) -> String {
    format!("available:event:{event_id}")
}

/// Key of the capacity mirror.
#[must_use]
pub fn capacity_key(event_id: &EventId) -> String {
    format!("capacity:event:{event_id}")
}

/// Name of the per-event mutex.
#[must_use]
pub fn lock_name(event_id: &EventId) -> String {
    format!("lock:event:{event_id}")
}

/// Recover `(event_id, user_id)` from a hold key.
///
/// Returns `None` for anything that is not a well-formed hold key.
#[must_use]
pub fn parse_hold_key(key: &str) -> Option<(EventId, UserId)> {
    let rest = key.strip_prefix(HOLD_PREFIX)?;
    let (event, user) = rest.split_once(":user:")?;
    Some((event.parse().ok()?, user.parse().ok()?))
}
