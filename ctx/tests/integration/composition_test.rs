use std::time::Duration;

use ctx::test_utils::{assert_completes_within, assert_pending_for};
use ctx::{Signal, create_signal, join, link, with_cancel, with_ref_count};
use ctx_telemetry::tracing::init_test_tracing;
use tokio::time::{Instant, sleep};

#[tokio::test]
async fn link_of_nothing_never_completes_test() {
    init_test_tracing();

    let signal = link(Vec::<Signal>::new());

    assert_pending_for(&signal, Duration::from_millis(50)).await;
}

#[tokio::test]
async fn join_of_nothing_completes_immediately_test() {
    init_test_tracing();

    let signal = join(Vec::<Signal>::new());

    assert!(signal.is_done());
}

#[tokio::test]
async fn link_completes_on_completed_constituent_test() {
    init_test_tracing();

    let (_never_fired, pending) = create_signal();
    let signal = link([Signal::completed(), pending]);

    assert_completes_within(&signal, Duration::from_millis(50)).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn join_waits_for_slowest_constituent_test() {
    init_test_tracing();

    let (fast, fast_signal) = create_signal();
    let (slow, slow_signal) = create_signal();
    let signal = join([fast_signal, slow_signal]);

    let started = Instant::now();
    fast.fire();
    tokio::spawn(async move {
        sleep(Duration::from_millis(50)).await;
        slow.fire();
    });

    assert_pending_for(&signal, Duration::from_millis(30)).await;
    assert_completes_within(&signal, Duration::from_secs(1)).await;
    assert!(started.elapsed() >= Duration::from_millis(50));
}

#[tokio::test(flavor = "multi_thread")]
async fn nested_links_and_joins_compose_test() {
    init_test_tracing();

    let (a, a_signal) = create_signal();
    let (b, b_signal) = create_signal();
    let (_c, c_signal) = create_signal();

    // (a AND b) OR c
    let both = join([a_signal, b_signal]);
    let either = link([both.clone(), c_signal]);

    a.fire();
    assert_pending_for(&either, Duration::from_millis(20)).await;

    b.fire();
    assert_completes_within(&both, Duration::from_secs(1)).await;
    assert_completes_within(&either, Duration::from_secs(1)).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_triggers_have_exactly_one_winner_test() {
    init_test_tracing();

    let (trigger, signal) = create_signal();
    let (_, cancel) = with_cancel(&signal);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let trigger = trigger.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                cancel.cancel();
                trigger.fire()
            })
        })
        .collect();

    let mut winners = 0;
    for handle in handles {
        if handle.await.unwrap() {
            winners += 1;
        }
    }

    assert_eq!(winners, 1);
    assert!(signal.is_done());
}

#[tokio::test]
async fn completion_is_never_reverted_test() {
    init_test_tracing();

    let (trigger, signal) = create_signal();
    trigger.fire();
    drop(trigger);

    for _ in 0..10 {
        assert!(signal.is_done());
        tokio::task::yield_now().await;
    }
    assert!(signal.clone().is_done());
}

#[tokio::test(flavor = "multi_thread")]
async fn ref_count_gates_completion_test() {
    init_test_tracing();

    let (parent_trigger, parent) = create_signal();
    let (signal, counter) = with_ref_count(&parent);

    counter.incr();
    counter.add(2);
    counter.add(-2);
    assert_pending_for(&signal, Duration::from_millis(20)).await;

    counter.decr();
    assert_completes_within(&signal, Duration::from_secs(1)).await;
    assert_eq!(counter.count(), 0);

    // Releasing the last reference does not touch the parent.
    assert!(!parent.is_done());
    drop(parent_trigger);
}

#[tokio::test(flavor = "multi_thread")]
async fn ref_count_follows_parent_test() {
    init_test_tracing();

    let (parent_trigger, parent) = create_signal();
    let (signal, counter) = with_ref_count(&parent);
    counter.add(5);

    parent_trigger.fire();

    assert_completes_within(&signal, Duration::from_secs(1)).await;
    assert_eq!(counter.count(), 5);
}
