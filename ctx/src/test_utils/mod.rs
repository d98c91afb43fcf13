//! Testing utilities for signals and combinators.
//!
//! The helpers here bound every wait with a timeout so that a signal which never fires
//! fails the test quickly with a descriptive message instead of hanging the test binary.

pub mod calls;

use std::time::Duration;

use tokio::time::{Instant, sleep, timeout};

use crate::signal::Signal;
use crate::watcher::active_watchers;

pub use calls::CallRecorder;

/// Default upper bound for waits in tests.
///
/// Completions in this crate are scheduling-delay fast, so anything slower than this
/// indicates that the expected completion never happens.
pub const DEFAULT_SIGNAL_TIMEOUT: Duration = Duration::from_secs(5);

/// Waits for `signal` to complete within `limit`.
///
/// # Panics
///
/// Panics if `limit` elapses first.
pub async fn assert_completes_within(signal: &Signal, limit: Duration) {
    if timeout(limit, signal.wait()).await.is_err() {
        panic!("signal did not complete within {limit:?}");
    }
}

/// Asserts that `signal` stays pending for the whole of `duration`.
///
/// # Panics
///
/// Panics as soon as the signal completes.
pub async fn assert_pending_for(signal: &Signal, duration: Duration) {
    if timeout(duration, signal.wait()).await.is_ok() {
        panic!("signal completed before {duration:?} elapsed");
    }
}

/// Waits until the number of live watcher tasks drops to `baseline` or below.
///
/// # Panics
///
/// Panics if the count is still above `baseline` after `limit`.
pub async fn wait_for_watchers(baseline: usize, limit: Duration) {
    let deadline = Instant::now() + limit;

    loop {
        let active = active_watchers();
        if active <= baseline {
            return;
        }

        if Instant::now() >= deadline {
            panic!("{active} watchers still running after {limit:?}, expected at most {baseline}");
        }

        sleep(Duration::from_millis(5)).await;
    }
}
