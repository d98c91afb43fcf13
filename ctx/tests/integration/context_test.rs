use std::time::Duration;

use ctx::context::{self, as_context, background, with_value};
use ctx::test_utils::{assert_completes_within, assert_pending_for};
use ctx::{
    Context, ContextError, ContextExt, Doner, MergePolicy, context_with_ref_count, create_signal,
    merge,
};
use ctx_telemetry::tracing::init_test_tracing;
use tokio::time::Instant;

#[derive(Debug, PartialEq)]
struct TraceId(&'static str);

#[tokio::test]
async fn merged_deadline_follows_policy_test() {
    init_test_tracing();

    let now = Instant::now();
    let early = now + Duration::from_secs(60);
    let late = now + Duration::from_secs(120);

    let (first, _) = context::with_deadline(background(), early);
    let (second, _) = context::with_deadline(background(), late);
    let (or, _) = merge(first.clone(), second.clone(), MergePolicy::Or);
    let (and, _) = merge(first, second, MergePolicy::And);

    assert_eq!(or.deadline(), Some(early));
    assert_eq!(and.deadline(), Some(late));
}

#[tokio::test(flavor = "multi_thread")]
async fn or_merge_reports_timeout_of_one_parent_test() {
    init_test_tracing();

    let (request, _) = context::with_timeout(background(), Duration::from_millis(20));
    let (server, _cancel_server) = context::with_cancel(background());
    let (merged, _) = merge(request, server, MergePolicy::Or);

    assert_completes_within(&merged.done(), Duration::from_secs(1)).await;
    assert_eq!(merged.err(), Some(ContextError::DeadlineExceeded));
}

#[tokio::test(flavor = "multi_thread")]
async fn and_merge_waits_for_both_parents_test() {
    init_test_tracing();

    let (first_trigger, first) = create_signal();
    let (second_trigger, second) = create_signal();
    let (merged, _) = merge(as_context(&first), as_context(&second), MergePolicy::And);

    first_trigger.fire();
    assert_pending_for(&merged.done(), Duration::from_millis(20)).await;
    assert!(merged.err().is_none());

    second_trigger.fire();
    assert_completes_within(&merged.done(), Duration::from_secs(1)).await;
    assert_eq!(merged.err(), Some(ContextError::Canceled));
}

#[tokio::test]
async fn values_survive_derivation_and_merge_test() {
    init_test_tracing();

    let traced = with_value(background(), TraceId("abc"));
    let (derived, _) = context::with_timeout(traced, Duration::from_secs(60));
    let (merged, _) = merge(background(), derived, MergePolicy::Or);

    assert_eq!(merged.value_of::<TraceId>().as_deref(), Some(&TraceId("abc")));
    assert!(merged.value_of::<u64>().is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn ref_counted_context_reports_canceled_test() {
    init_test_tracing();

    let (context, counter) = context_with_ref_count(background());
    counter.incr();
    counter.incr();

    counter.decr();
    assert_pending_for(&context.done(), Duration::from_millis(20)).await;

    counter.decr();
    assert_completes_within(&context.done(), Duration::from_secs(1)).await;
    assert_eq!(context.err(), Some(ContextError::Canceled));
}

#[tokio::test(flavor = "multi_thread")]
async fn cancelling_parent_cancels_chain_test() {
    init_test_tracing();

    let (root, cancel_root) = context::with_cancel(background());
    let (middle, _) = context::with_timeout(root, Duration::from_secs(60));
    let (leaf, _) = merge(middle, background(), MergePolicy::Or);

    cancel_root.cancel();

    assert_completes_within(&leaf.done(), Duration::from_secs(1)).await;
    assert_eq!(leaf.err(), Some(ContextError::Canceled));
}
