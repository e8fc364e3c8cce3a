//! Booking promoter: turns an active hold into a durable booking.

use crate::manager::HoldManager;
use crate::metrics::HoldMetrics;
use std::sync::Arc;
use ticket_holds_core::error::{HoldError, RepositoryError, Result};
use ticket_holds_core::keys;
use ticket_holds_core::types::{Booking, BookingId, EventId, Hold, UserId};
use tokio::time::sleep;

const PROMOTE_HOLD: &str = "promote hold";
const READ_BOOKING: &str = "read booking";
const CANCEL_BOOKING: &str = "cancel booking";

/// Promotes holds into bookings and manages the bookings afterwards.
///
/// Promotion runs under the event lock and re-checks the lease at that
/// instant, so a hold is either promoted or restored by the sweeper, never
/// both. The live counter is not touched: the tickets were debited when the
/// hold was placed.
///
/// The booking is written under the hold's own `booking_id`. Retrying a
/// promotion whose record delete failed finds that booking instead of
/// writing a second one.
#[derive(Clone)]
pub struct BookingPromoter {
    manager: Arc<HoldManager>,
}

impl BookingPromoter {
    /// Create a promoter sharing `manager`'s stores and lock.
    #[must_use]
    pub const fn new(manager: Arc<HoldManager>) -> Self {
        Self { manager }
    }

    /// Persist a confirmed booking for the hold and retire the hold.
    ///
    /// Safe to retry after any error: a booking already written for this
    /// hold is returned rather than duplicated.
    ///
    /// # Errors
    ///
    /// - `HoldExpired` if there is no hold or its lease has lapsed
    /// - `LockUnavailable` if the event lock stayed contended
    /// - `Repository` if the booking could not be written; the hold is kept
    /// - `Store` on counter store failure
    pub async fn promote_hold(&self, event_id: EventId, user_id: UserId) -> Result<Booking> {
        let lock = self.manager.lock_event(event_id, PROMOTE_HOLD).await?;
        let result = self.promote_locked(event_id, user_id).await;
        lock.release().await;
        result
    }

    /// Load a booking.
    ///
    /// # Errors
    ///
    /// - `Repository` with `NotFound` if no such booking exists
    /// - `Repository` on database failure
    pub async fn get_booking(&self, booking_id: BookingId) -> Result<Booking> {
        self.manager
            .bookings()
            .get_booking(booking_id)
            .await
            .map_err(|e| HoldError::repository(READ_BOOKING, e))
    }

    /// Cancel a confirmed booking and return its tickets to the live counter.
    ///
    /// The booking is marked cancelled first. If the counter credit then
    /// fails, the counter stays low until the next reconcile.
    ///
    /// # Errors
    ///
    /// - `Repository` with `NotFound` if no such booking exists
    /// - `Repository` with `Conflict` if it is already cancelled
    /// - `LockUnavailable` if the event lock stayed contended
    /// - `Store` on counter store failure
    pub async fn cancel_booking(&self, booking_id: BookingId) -> Result<Booking> {
        let event_id = self.get_booking(booking_id).await?.event_id;
        let lock = self.manager.lock_event(event_id, CANCEL_BOOKING).await?;
        let result = self.cancel_locked(booking_id, event_id).await;
        lock.release().await;
        result
    }

    async fn promote_locked(&self, event_id: EventId, user_id: UserId) -> Result<Booking> {
        let now = self.manager.clock().now();

        let Some(hold) = self.manager.read_hold(event_id, user_id, PROMOTE_HOLD).await? else {
            tracing::debug!(%event_id, %user_id, "no hold to promote");
            return Err(HoldError::HoldExpired);
        };
        if hold.is_expired_at(now) {
            // A record left by a promotion whose delete failed.
            if let Some(booking) = self.manager.booking_of(&hold).await? {
                self.retire(&hold).await?;
                tracing::info!(%event_id, %user_id, booking_id = %booking.id, "promotion completed");
                return Ok(booking);
            }
            tracing::debug!(
                %event_id,
                %user_id,
                expires_at = %hold.expires_at,
                "hold lapsed before promotion"
            );
            return Err(HoldError::HoldExpired);
        }

        let booking = self.persist(&hold, Booking::confirmed_from(&hold, now)).await?;
        self.retire(&hold).await?;

        HoldMetrics::record_promoted();
        tracing::info!(
            %event_id,
            %user_id,
            booking_id = %booking.id,
            quantity = booking.quantity,
            "hold promoted"
        );
        Ok(booking)
    }

    /// Write `booking`, or load it if an earlier attempt already did.
    async fn persist(&self, hold: &Hold, booking: Booking) -> Result<Booking> {
        let bookings = self.manager.bookings();
        match bookings.create_booking(booking.clone()).await {
            Ok(_) => Ok(booking),
            Err(RepositoryError::Conflict(_)) => {
                tracing::info!(
                    event_id = %hold.event_id,
                    user_id = %hold.user_id,
                    booking_id = %booking.id,
                    "booking already persisted by an earlier attempt"
                );
                bookings
                    .get_booking(booking.id)
                    .await
                    .map_err(|e| HoldError::repository(READ_BOOKING, e))
            }
            Err(e) => {
                tracing::warn!(
                    event_id = %hold.event_id,
                    user_id = %hold.user_id,
                    error = %e,
                    "booking not persisted, hold kept"
                );
                Err(HoldError::repository("create booking", e))
            }
        }
    }

    /// Delete the hold record of a persisted booking.
    ///
    /// Retried on the lock backoff schedule. A record that survives every
    /// attempt is settled by the next promote or release of the same hold,
    /// which finds the booking and drops the record without a credit.
    async fn retire(&self, hold: &Hold) -> Result<()> {
        let key = keys::hold_key(&hold.event_id, &hold.user_id);
        let backoff = self.manager.config().lock_backoff;
        let attempts = backoff.attempts();

        let mut attempt = 0;
        loop {
            match self.manager.store().delete(&key).await {
                Ok(_) => return Ok(()),
                Err(err) if attempt + 1 < attempts => {
                    tracing::warn!(
                        event_id = %hold.event_id,
                        attempt,
                        error = %err,
                        "hold record delete failed, retrying"
                    );
                    sleep(backoff.jittered_delay(attempt)).await;
                    attempt += 1;
                }
                Err(err) => {
                    tracing::error!(
                        event_id = %hold.event_id,
                        user_id = %hold.user_id,
                        key = %key,
                        error = %err,
                        "booking persisted but hold record remains"
                    );
                    return Err(HoldError::store(PROMOTE_HOLD, hold.event_id, err));
                }
            }
        }
    }

    async fn cancel_locked(&self, booking_id: BookingId, event_id: EventId) -> Result<Booking> {
        let now = self.manager.clock().now();
        let booking = self
            .manager
            .bookings()
            .cancel_booking(booking_id, now)
            .await
            .map_err(|e| HoldError::repository(CANCEL_BOOKING, e))?;

        let available = self
            .manager
            .credit_locked(event_id, booking.quantity, CANCEL_BOOKING)
            .await
            .inspect_err(|err| {
                tracing::error!(
                    %event_id,
                    %booking_id,
                    error = %err,
                    "booking cancelled but counter not credited"
                );
            })?;

        HoldMetrics::record_cancelled();
        tracing::info!(
            %event_id,
            %booking_id,
            quantity = booking.quantity,
            available,
            "booking cancelled"
        );
        Ok(booking)
    }
}
