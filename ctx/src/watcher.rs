use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use metrics::{counter, gauge};
use tokio::task::JoinHandle;
use tracing::trace;

use crate::metrics::{CTX_WATCHERS_ACTIVE, CTX_WATCHERS_SPAWNED_TOTAL, WATCHER_KIND_LABEL};

// Process-wide count of live watcher tasks, kept next to the gauge so that tests can
// assert on it without installing a metrics recorder.
static ACTIVE_WATCHERS: AtomicUsize = AtomicUsize::new(0);

/// Returns the number of watcher tasks that have been spawned and not yet finished.
///
/// Every combinator watcher exits once its outcome is determined, so after all
/// signals in a program have either completed or been dropped this returns to its
/// baseline. Long-lived sources such as the interrupt listener stay counted.
pub fn active_watchers() -> usize {
    ACTIVE_WATCHERS.load(Ordering::Acquire)
}

/// The combinator that owns a watcher task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WatcherKind {
    Cancel,
    Context,
    Defer,
    Interrupt,
    Interval,
    Join,
    Link,
    Merge,
}

impl WatcherKind {
    fn as_str(&self) -> &'static str {
        match self {
            WatcherKind::Cancel => "cancel",
            WatcherKind::Context => "context",
            WatcherKind::Defer => "defer",
            WatcherKind::Interrupt => "interrupt",
            WatcherKind::Interval => "interval",
            WatcherKind::Join => "join",
            WatcherKind::Link => "link",
            WatcherKind::Merge => "merge",
        }
    }
}

impl fmt::Display for WatcherKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keeps the live-watcher accounting balanced, including when the task is aborted or
/// dropped by a shutting down runtime.
struct WatcherGuard {
    kind: WatcherKind,
}

impl WatcherGuard {
    fn register(kind: WatcherKind) -> Self {
        ACTIVE_WATCHERS.fetch_add(1, Ordering::AcqRel);
        counter!(CTX_WATCHERS_SPAWNED_TOTAL, WATCHER_KIND_LABEL => kind.as_str()).increment(1);
        gauge!(CTX_WATCHERS_ACTIVE, WATCHER_KIND_LABEL => kind.as_str()).increment(1.0);
        trace!(%kind, "watcher started");

        Self { kind }
    }
}

impl Drop for WatcherGuard {
    fn drop(&mut self) {
        ACTIVE_WATCHERS.fetch_sub(1, Ordering::AcqRel);
        gauge!(CTX_WATCHERS_ACTIVE, WATCHER_KIND_LABEL => self.kind.as_str()).decrement(1.0);
        trace!(kind = %self.kind, "watcher finished");
    }
}

/// Spawns `watcher` on the current Tokio runtime.
///
/// # Panics
///
/// Panics when called outside of a Tokio runtime, like [`tokio::spawn`].
pub(crate) fn spawn_watcher<F>(kind: WatcherKind, watcher: F) -> JoinHandle<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let guard = WatcherGuard::register(kind);

    tokio::spawn(async move {
        let _guard = guard;
        watcher.await;
    })
}
