//! Callbacks scheduled on completion.
//!
//! [`defer`] never blocks the caller: it hands the wait to a watcher task and returns its
//! [`JoinHandle`]. The callback runs exactly once after the signal completes, including
//! when the signal is already complete at call time.
//!
//! A signal that is never fired keeps its watcher parked for as long as some trigger of
//! that signal is alive. Once every trigger is dropped the signal is abandoned: the
//! callback is dropped without running and the watcher exits.

use std::future::Future;

use tokio::task::JoinHandle;
use tracing::trace;

use crate::signal::{Doner, Settled};
use crate::watcher::{WatcherKind, spawn_watcher};

/// Runs `callback` once after `doner` completes.
pub fn defer<D, F>(doner: &D, callback: F) -> JoinHandle<()>
where
    D: Doner + ?Sized,
    F: FnOnce() + Send + 'static,
{
    defer_async(doner, move || async move { callback() })
}

/// Runs the future returned by `callback` once after `doner` completes.
///
/// The future is awaited on the watcher task, so aborting the returned handle also
/// cancels a callback that is still running.
pub fn defer_async<D, F, Fut>(doner: &D, callback: F) -> JoinHandle<()>
where
    D: Doner + ?Sized,
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let signal = doner.done();

    spawn_watcher(WatcherKind::Defer, async move {
        match signal.settled().await {
            Settled::Fired => callback().await,
            Settled::Abandoned => trace!("signal abandoned, dropping deferred callback"),
        }
    })
}
