//! Owned cancellation of derived signals.

use std::fmt;
use std::sync::Arc;

use tracing::trace;

use crate::signal::{Doner, Settled, Signal, create_signal};
use crate::watcher::{WatcherKind, spawn_watcher};

/// Idempotent, cloneable cancellation trigger.
///
/// Calling [`CancelFunc::cancel`] any number of times, from any number of tasks or
/// threads, has the same effect as calling it once. It never blocks and never fails,
/// including after the target has already completed.
#[derive(Clone)]
pub struct CancelFunc(Arc<dyn Fn() + Send + Sync>);

impl CancelFunc {
    /// Wraps `cancel`, which must itself be idempotent.
    pub fn new<F>(cancel: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self(Arc::new(cancel))
    }

    /// Cancels the associated signal or context.
    pub fn cancel(&self) {
        (self.0)()
    }
}

impl fmt::Debug for CancelFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelFunc").finish_non_exhaustive()
    }
}

/// Derives a child signal that completes when `parent` completes or when the returned
/// [`CancelFunc`] is called, whichever happens first.
pub fn with_cancel<D>(parent: &D) -> (Signal, CancelFunc)
where
    D: Doner + ?Sized,
{
    let (trigger, child) = create_signal();
    let cancel = trigger.cancel_func();
    let parent = parent.done();

    if parent.is_done() {
        trigger.fire();
        return (child, cancel);
    }

    let observed = child.clone();
    spawn_watcher(WatcherKind::Cancel, async move {
        tokio::select! {
            settled = parent.settled() => {
                if settled == Settled::Fired {
                    trace!("parent completed, cancelling child signal");
                    trigger.fire();
                }
            }
            _ = observed.settled() => {}
        }
    });

    (child, cancel)
}
