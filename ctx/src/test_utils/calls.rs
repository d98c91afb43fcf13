use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::Notify;
use tokio::time::timeout;

use crate::test_utils::DEFAULT_SIGNAL_TIMEOUT;

/// Records how many times a callback was invoked.
///
/// Clones share the same counter, so a clone can be moved into the callback under test
/// while the original is used for assertions.
#[derive(Debug, Clone, Default)]
pub struct CallRecorder {
    calls: Arc<AtomicUsize>,
    notify: Arc<Notify>,
}

impl CallRecorder {
    /// Creates a recorder with no recorded calls.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one invocation.
    pub fn record(&self) {
        self.calls.fetch_add(1, Ordering::AcqRel);
        self.notify.notify_waiters();
    }

    /// Returns a callback that records an invocation each time it is called.
    pub fn callback(&self) -> impl Fn() + Send + Sync + 'static {
        let recorded = self.clone();
        move || recorded.record()
    }

    /// Returns the number of recorded invocations.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Acquire)
    }

    /// Waits until at least `count` invocations were recorded.
    ///
    /// # Panics
    ///
    /// Panics if [`DEFAULT_SIGNAL_TIMEOUT`] elapses first.
    pub async fn wait_for_calls(&self, count: usize) {
        self.wait_for_calls_within(count, DEFAULT_SIGNAL_TIMEOUT)
            .await
    }

    /// Waits until at least `count` invocations were recorded within `limit`.
    ///
    /// # Panics
    ///
    /// Panics if `limit` elapses first.
    pub async fn wait_for_calls_within(&self, count: usize, limit: Duration) {
        let wait = async {
            loop {
                let notified = self.notify.notified();
                if self.calls() >= count {
                    return;
                }
                notified.await;
            }
        };

        if timeout(limit, wait).await.is_err() {
            panic!(
                "expected at least {count} calls within {limit:?}, got {}",
                self.calls()
            );
        }
    }
}
