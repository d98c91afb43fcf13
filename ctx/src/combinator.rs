//! OR and AND combinations of signals.
//!
//! Both combinators spawn a single watcher task per instance that waits on the
//! constituents' completions concurrently. The watcher exits as soon as the result is
//! determined: when the result fires, or when every constituent that could still fire
//! has been abandoned. Composition (a `link` of `join`s and so on) only ever waits on
//! direct children, so nesting cannot deadlock.

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tracing::trace;

use crate::signal::{Doner, Settled, Signal, create_signal};
use crate::watcher::{WatcherKind, spawn_watcher};

/// Returns a signal that completes as soon as any of `doners` completes.
///
/// With no constituents the result never completes. Abandoned constituents are ignored;
/// if all of them are abandoned the result is abandoned as well.
pub fn link<I>(doners: I) -> Signal
where
    I: IntoIterator,
    I::Item: Doner,
{
    let (trigger, signal) = create_signal();
    let constituents = doners.into_iter().map(|d| d.done()).collect::<Vec<_>>();

    if constituents.iter().any(Signal::is_done) {
        trigger.fire();
        return signal;
    }

    if constituents.is_empty() {
        return signal;
    }

    spawn_watcher(WatcherKind::Link, async move {
        match first_fired(&constituents).await {
            Some(index) => {
                trace!(index, "linked signal fired");
                trigger.fire();
            }
            None => trace!("every linked signal was abandoned"),
        }
    });

    signal
}

/// Returns a signal that completes once every one of `doners` has completed.
///
/// With no constituents the result is complete immediately, unlike [`link`]. If any
/// constituent is abandoned the result can never complete and is abandoned too.
pub fn join<I>(doners: I) -> Signal
where
    I: IntoIterator,
    I::Item: Doner,
{
    let (trigger, signal) = create_signal();
    let pending = doners
        .into_iter()
        .map(|d| d.done())
        .filter(|s| !s.is_done())
        .collect::<Vec<_>>();

    if pending.is_empty() {
        trigger.fire();
        return signal;
    }

    spawn_watcher(WatcherKind::Join, async move {
        if all_fired(&pending).await {
            trigger.fire();
        }
    });

    signal
}

/// Waits for the first of `signals` to fire and returns its index.
///
/// Returns `None` once every signal has been abandoned.
pub(crate) async fn first_fired(signals: &[Signal]) -> Option<usize> {
    let mut settles = signals
        .iter()
        .enumerate()
        .map(|(index, signal)| async move { (index, signal.settled().await) })
        .collect::<FuturesUnordered<_>>();

    while let Some((index, settled)) = settles.next().await {
        if settled == Settled::Fired {
            return Some(index);
        }
    }

    None
}

/// Waits for every one of `signals` to fire.
///
/// Returns `false` as soon as one of them is abandoned.
pub(crate) async fn all_fired(signals: &[Signal]) -> bool {
    let mut remaining = signals.len();
    let mut settles = signals
        .iter()
        .map(Signal::settled)
        .collect::<FuturesUnordered<_>>();

    while let Some(settled) = settles.next().await {
        if settled == Settled::Abandoned {
            trace!(remaining, "joined signal abandoned");
            return false;
        }

        remaining -= 1;
    }

    remaining == 0
}
