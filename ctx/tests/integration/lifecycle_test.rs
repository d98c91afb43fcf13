use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use ctx::context::{background, with_timeout};
use ctx::test_utils::CallRecorder;
use ctx::{Doner, Signal, create_signal, defer, defer_async, link, tick, tick_every};
use ctx_telemetry::tracing::init_test_tracing;
use futures::StreamExt;
use tokio::time::sleep;

#[tokio::test]
async fn defer_on_completed_signal_runs_promptly_test() {
    init_test_tracing();

    let recorded = CallRecorder::new();
    defer(&Signal::completed(), recorded.callback());

    recorded
        .wait_for_calls_within(1, Duration::from_millis(100))
        .await;
}

#[tokio::test(flavor = "multi_thread")]
async fn defer_runs_exactly_once_after_completion_test() {
    init_test_tracing();

    let (trigger, signal) = create_signal();
    let recorded = CallRecorder::new();

    let handle = defer(&link([signal]), recorded.callback());
    sleep(Duration::from_millis(20)).await;
    assert_eq!(recorded.calls(), 0);

    trigger.fire();
    trigger.fire();
    handle.await.unwrap();
    sleep(Duration::from_millis(20)).await;

    assert_eq!(recorded.calls(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn defer_async_awaits_callback_test() {
    init_test_tracing();

    let (trigger, signal) = create_signal();
    let recorded = CallRecorder::new();

    let recorder = recorded.clone();
    let handle = defer_async(&signal, move || async move {
        sleep(Duration::from_millis(10)).await;
        recorder.record();
    });

    trigger.fire();
    handle.await.unwrap();

    assert_eq!(recorded.calls(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn tick_stream_ends_after_completion_test() {
    init_test_tracing();

    let (trigger, signal) = create_signal();
    let mut ticks = tick(&signal);

    for _ in 0..3 {
        assert_eq!(ticks.next().await, Some(()));
    }

    trigger.fire();
    assert_eq!(ticks.next().await, None);
    assert_eq!(ticks.next().await, None);
}

#[tokio::test(flavor = "multi_thread")]
async fn tick_every_stops_with_signal_test() {
    init_test_tracing();

    let (trigger, signal) = create_signal();
    let recorded = CallRecorder::new();

    let handle = tick_every(&signal, Duration::from_millis(5), recorded.callback()).unwrap();
    recorded.wait_for_calls(2).await;

    trigger.fire();
    handle.await.unwrap();

    let calls = recorded.calls();
    sleep(Duration::from_millis(25)).await;
    assert_eq!(recorded.calls(), calls);
}

#[test]
fn tick_loop_ends_on_current_thread_runtime_test() {
    init_test_tracing();

    let (done_tx, done_rx) = mpsc::channel();

    // Runs on its own thread so that a loop that never yields fails the test instead of
    // hanging the harness.
    thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let beats = runtime.block_on(async {
            let (context, _cancel) = with_timeout(background(), Duration::from_millis(20));
            let mut ticks = tick(&context.done());

            let mut beats: u64 = 0;
            while ticks.next().await.is_some() {
                beats += 1;
            }
            beats
        });

        let _ = done_tx.send(beats);
    });

    let beats = done_rx
        .recv_timeout(Duration::from_secs(5))
        .expect("tick loop did not end after the deadline");
    assert!(beats > 0);
}
