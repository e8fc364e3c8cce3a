//! End-to-end hold scenarios over the in-memory harness.
//!
//! Each test wires a full manager, promoter and sweeper with a store-backed
//! lease mutex and drives the public operations only.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use futures::future::join_all;
use proptest::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use ticket_holds_core::{BookingStatus, CounterStore, EventId, Hold, HoldError, UserId, keys};
use ticket_holds_runtime::{BackoffPolicy, HoldConfig};
use ticket_holds_testing::TestHarness;

fn patient_config() -> HoldConfig {
    HoldConfig::default().with_lock_backoff(
        BackoffPolicy::builder()
            .max_attempts(500)
            .initial_delay(Duration::from_millis(1))
            .max_delay(Duration::from_millis(5))
            .build(),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_concurrent_holds_of_six_from_ten_admit_exactly_one() {
    let harness = TestHarness::with_config(patient_config());
    let event_id = harness.create_event(10).await.unwrap();

    let attempts: Vec<_> = (0..2)
        .map(|_| {
            let manager = Arc::clone(&harness.manager);
            tokio::spawn(async move { manager.hold_tickets(event_id, UserId::new(), 6).await })
        })
        .collect();
    let results: Vec<_> = join_all(attempts).await.into_iter().map(Result::unwrap).collect();

    let granted = results.iter().filter(|r| r.is_ok()).count();
    let refused = results
        .iter()
        .filter(|r| matches!(r, Err(HoldError::InsufficientInventory { requested: 6, .. })))
        .count();

    assert_eq!(granted, 1);
    assert_eq!(refused, 1);
    assert_eq!(harness.manager.available(event_id).await.unwrap(), 4);
}

#[tokio::test]
async fn lapsed_hold_is_restored_by_the_sweeper() {
    let harness = TestHarness::new();
    let event_id = harness.create_event(10).await.unwrap();
    let user = UserId::new();

    harness.manager.hold_tickets(event_id, user, 3).await.unwrap();
    assert_eq!(harness.manager.available(event_id).await.unwrap(), 7);

    harness.clock.advance(harness.manager.config().hold_lease);
    let report = harness.sweeper.sweep_once().await.unwrap();

    assert_eq!(report.released, 1);
    assert_eq!(harness.manager.available(event_id).await.unwrap(), 10);
    assert_eq!(
        harness.store.get_record(&keys::hold_key(&event_id, &user)).await.unwrap(),
        None
    );
}

#[tokio::test]
async fn promoted_hold_keeps_its_debit() {
    let harness = TestHarness::new();
    let event_id = harness.create_event(10).await.unwrap();
    let user = UserId::new();

    harness.manager.hold_tickets(event_id, user, 3).await.unwrap();
    let booking = harness.promoter.promote_hold(event_id, user).await.unwrap();

    assert_eq!(booking.quantity, 3);
    assert_eq!(harness.bookings.count(), 1);
    assert_eq!(harness.manager.get_hold(event_id, user).await.unwrap(), None);
    assert_eq!(harness.manager.available(event_id).await.unwrap(), 7);

    // A later sweep has nothing to hand back.
    harness.clock.advance(harness.manager.config().hold_lease);
    assert_eq!(harness.sweeper.sweep_once().await.unwrap().released, 0);
    assert_eq!(harness.manager.available(event_id).await.unwrap(), 7);
}

#[tokio::test]
async fn lapsed_hold_fails_promotion_then_sweeps_cleanly() {
    let harness = TestHarness::new();
    let event_id = harness.create_event(10).await.unwrap();
    let user = UserId::new();

    harness.manager.hold_tickets(event_id, user, 3).await.unwrap();
    harness.clock.advance(harness.manager.config().hold_lease + Duration::from_secs(1));

    let err = harness.promoter.promote_hold(event_id, user).await.unwrap_err();
    assert_eq!(err, HoldError::HoldExpired);

    harness.sweeper.sweep_once().await.unwrap();
    assert_eq!(harness.manager.available(event_id).await.unwrap(), 10);
    assert_eq!(harness.bookings.count(), 0);
}

#[tokio::test]
async fn hold_then_release_restores_exact_count() {
    let harness = TestHarness::new();
    let event_id = harness.create_event(25).await.unwrap();
    let before = harness.manager.available(event_id).await.unwrap();
    let user = UserId::new();

    harness.manager.hold_tickets(event_id, user, 9).await.unwrap();
    harness.manager.release_hold(event_id, user).await.unwrap();
    harness.manager.release_hold(event_id, user).await.unwrap();

    assert_eq!(harness.manager.available(event_id).await.unwrap(), before);
}

#[tokio::test]
async fn holds_on_different_events_do_not_interfere() {
    let harness = TestHarness::new();
    let first = harness.create_event(5).await.unwrap();
    let second = harness.create_event(5).await.unwrap();

    harness.manager.hold_tickets(first, UserId::new(), 5).await.unwrap();
    harness.manager.hold_tickets(second, UserId::new(), 2).await.unwrap();

    assert_eq!(harness.manager.available(first).await.unwrap(), 0);
    assert_eq!(harness.manager.available(second).await.unwrap(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn many_contenders_never_oversell() {
    let harness = TestHarness::with_config(patient_config());
    let event_id = harness.create_event(20).await.unwrap();
    let granted = Arc::new(AtomicUsize::new(0));

    let attempts: Vec<_> = (0..40)
        .map(|_| {
            let manager = Arc::clone(&harness.manager);
            let granted = Arc::clone(&granted);
            tokio::spawn(async move {
                if manager.hold_tickets(event_id, UserId::new(), 1).await.is_ok() {
                    granted.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();
    for result in join_all(attempts).await {
        result.unwrap();
    }

    assert_eq!(granted.load(Ordering::SeqCst), 20);
    assert_eq!(harness.manager.available(event_id).await.unwrap(), 0);
}

#[derive(Debug, Clone)]
enum Step {
    Hold { user: usize, quantity: u32 },
    Release { user: usize },
    Promote { user: usize },
    Expire,
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        4 => (0..6usize, 1..5u32).prop_map(|(user, quantity)| Step::Hold { user, quantity }),
        2 => (0..6usize).prop_map(|user| Step::Release { user }),
        1 => (0..6usize).prop_map(|user| Step::Promote { user }),
        1 => Just(Step::Expire),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Held plus booked never exceeds capacity, and the counter always
    /// equals capacity minus both.
    #[test]
    fn counter_matches_holds_and_bookings(capacity in 1..15u32, steps in prop::collection::vec(step(), 1..30)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime");

        runtime.block_on(async {
            let harness = TestHarness::new();
            let event_id = harness.create_event(capacity).await.unwrap();
            let users: Vec<UserId> = (0..6).map(|_| UserId::new()).collect();

            for step in steps {
                match step {
                    Step::Hold { user, quantity } => {
                        let _ = harness.manager.hold_tickets(event_id, users[user], quantity).await;
                    }
                    Step::Release { user } => {
                        harness.manager.release_hold(event_id, users[user]).await.unwrap();
                    }
                    Step::Promote { user } => {
                        let _ = harness.promoter.promote_hold(event_id, users[user]).await;
                    }
                    Step::Expire => {
                        harness.clock.advance(harness.manager.config().hold_lease);
                        harness.sweeper.sweep_once().await.unwrap();
                    }
                }

                let mut held = 0i64;
                for user in &users {
                    let key = keys::hold_key(&event_id, user);
                    if let Some(record) = harness.store.get_record(&key).await.unwrap() {
                        held += i64::from(Hold::from_record(&record).unwrap().quantity);
                    }
                }
                let booked: i64 = harness
                    .bookings
                    .all()
                    .iter()
                    .map(|b| i64::from(b.quantity))
                    .sum();
                let available = harness.manager.available(event_id).await.unwrap();

                prop_assert!(held + booked <= i64::from(capacity));
                prop_assert!(available >= 0);
                prop_assert_eq!(available, i64::from(capacity) - held - booked);
            }
            Ok(())
        })?;
    }
}

#[derive(Debug, Clone)]
enum Race {
    Hold { user: usize, quantity: u32 },
    Release { user: usize },
    Promote { user: usize },
    Cancel { user: usize },
    Sweep,
}

fn race() -> impl Strategy<Value = Race> {
    prop_oneof![
        4 => (0..4usize, 1..5u32).prop_map(|(user, quantity)| Race::Hold { user, quantity }),
        2 => (0..4usize).prop_map(|user| Race::Release { user }),
        2 => (0..4usize).prop_map(|user| Race::Promote { user }),
        1 => (0..4usize).prop_map(|user| Race::Cancel { user }),
        2 => Just(Race::Sweep),
    ]
}

/// Run one racing step. Business rejections are expected; anything that
/// signals broken counters is returned.
async fn run_race(harness: Arc<TestHarness>, event_id: EventId, user: UserId, race: Race) -> Result<(), HoldError> {
    let outcome = match race {
        Race::Hold { quantity, .. } => harness.manager.hold_tickets(event_id, user, quantity).await.map(|_| ()),
        Race::Release { .. } => harness.manager.release_hold(event_id, user).await.map(|_| ()),
        Race::Promote { .. } => harness.promoter.promote_hold(event_id, user).await.map(|_| ()),
        Race::Cancel { .. } => {
            let confirmed = harness
                .bookings
                .all()
                .into_iter()
                .find(|b| b.user_id == user && b.status == BookingStatus::Confirmed);
            match confirmed {
                Some(booking) => harness.promoter.cancel_booking(booking.id).await.map(|_| ()),
                None => Ok(()),
            }
        }
        Race::Sweep => harness.sweeper.sweep_once().await.map(|_| ()).map_err(|e| {
            HoldError::store("sweep", event_id, e)
        }),
    };

    match outcome {
        Err(err @ (HoldError::InvariantViolation { .. } | HoldError::Store { .. })) => Err(err),
        _ => Ok(()),
    }
}

fn race_user(race: &Race) -> usize {
    match race {
        Race::Hold { user, .. }
        | Race::Release { user }
        | Race::Promote { user }
        | Race::Cancel { user } => *user,
        Race::Sweep => 0,
    }
}

/// `held + booked + available`, read once every task has finished.
async fn accounted_tickets(harness: &TestHarness, event_id: EventId) -> (i64, i64, i64) {
    let mut held = 0i64;
    for key in harness.store.scan(&keys::event_hold_prefix(&event_id)).await.unwrap() {
        let record = harness.store.get_record(&key).await.unwrap().unwrap();
        held += i64::from(Hold::from_record(&record).unwrap().quantity);
    }
    let booked: i64 = harness
        .bookings
        .all()
        .iter()
        .filter(|b| b.status == BookingStatus::Confirmed)
        .map(|b| i64::from(b.quantity))
        .sum();
    let available = harness.manager.available(event_id).await.unwrap();
    (held, booked, available)
}

// Holds lapse after one second of manual time. At most four ticks run per
// case, so the ten-second lock leases (judged on the same clock) never lapse
// under a running critical section.
fn racing_harness() -> Arc<TestHarness> {
    Arc::new(TestHarness::with_config(
        patient_config().with_hold_lease(Duration::from_secs(1)),
    ))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Concurrent holds, releases, promotions, cancellations and sweeps on
    /// one event leave every ticket accounted for exactly once.
    #[test]
    fn concurrent_operations_account_for_every_ticket(
        capacity in 1..20u32,
        races in prop::collection::vec(race(), 1..40),
        ticks in 0..=4usize,
    ) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_all()
            .build()
            .expect("runtime");

        runtime.block_on(async {
            let harness = racing_harness();
            let event_id = harness.create_event(capacity).await.unwrap();
            let users: Vec<UserId> = (0..4).map(|_| UserId::new()).collect();

            let mut tasks: Vec<_> = races
                .into_iter()
                .map(|race| {
                    let harness = Arc::clone(&harness);
                    let user = users[race_user(&race)];
                    tokio::spawn(async move {
                        tokio::task::yield_now().await;
                        run_race(harness, event_id, user, race).await
                    })
                })
                .collect();

            let clock = harness.clock.clone();
            let lease = harness.manager.config().hold_lease;
            tasks.push(tokio::spawn(async move {
                for _ in 0..ticks {
                    tokio::task::yield_now().await;
                    clock.advance(lease);
                }
                Ok(())
            }));

            for result in join_all(tasks).await {
                prop_assert_eq!(result.unwrap(), Ok(()));
            }

            let (held, booked, available) = accounted_tickets(&harness, event_id).await;
            prop_assert!(available >= 0);
            prop_assert_eq!(held + booked + available, i64::from(capacity));
            Ok(())
        })?;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn same_user_hold_release_and_sweep_race_cleanly() {
    let harness = racing_harness();
    let event_id = harness.create_event(12).await.unwrap();
    let user = UserId::new();

    for round in 0..20u32 {
        let quantity = round % 3 + 1;
        let tasks = vec![
            tokio::spawn(run_race(Arc::clone(&harness), event_id, user, Race::Hold { user: 0, quantity })),
            tokio::spawn(run_race(Arc::clone(&harness), event_id, user, Race::Release { user: 0 })),
            tokio::spawn(run_race(Arc::clone(&harness), event_id, user, Race::Sweep)),
            tokio::spawn(run_race(Arc::clone(&harness), event_id, user, Race::Promote { user: 0 })),
        ];
        if round % 5 == 0 {
            harness.clock.advance(Duration::from_millis(400));
        }
        for result in join_all(tasks).await {
            assert_eq!(result.unwrap(), Ok(()));
        }

        let (held, booked, available) = accounted_tickets(&harness, event_id).await;
        assert!(held <= 3, "one user holds at most one hold");
        assert_eq!(held + booked + available, 12);
    }
}
