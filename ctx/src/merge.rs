//! Merging two contexts into one.
//!
//! A [`MergedContext`] is a child of two parents at once. Its completion, deadline and
//! error follow a [`MergePolicy`]; value lookups always consult the first parent before
//! the second.
//!
//! | facet      | [`MergePolicy::Or`]            | [`MergePolicy::And`]                  |
//! |------------|--------------------------------|---------------------------------------|
//! | completion | either parent completes        | both parents complete                 |
//! | deadline   | earliest (none = +infinity)    | latest (none = +infinity)             |
//! | error      | from the parent that completed | first parent's, else second's         |
//!
//! The `And` error choice is a heuristic. It is only meaningful when at most one parent
//! completed with an error other than the one the caller expects.

use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

use tokio::time::Instant;
use tracing::{debug, trace};

use crate::cancel::CancelFunc;
use crate::combinator::{all_fired, first_fired};
use crate::context::{Completion, Context, ContextRef, Value};
use crate::error::ContextError;
use crate::signal::{Doner, Signal};
use crate::watcher::{WatcherKind, spawn_watcher};

/// How the two parents of a [`MergedContext`] combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MergePolicy {
    /// Complete with the first parent; earliest deadline wins.
    #[default]
    Or,
    /// Complete once both parents have; latest deadline wins.
    And,
}

/// A context derived from two parents.
#[derive(Clone)]
pub struct MergedContext {
    inner: Arc<MergedInner>,
}

struct MergedInner {
    parents: [ContextRef; 2],
    policy: MergePolicy,
    completion: Arc<Completion>,
}

impl MergedContext {
    /// Returns the policy this context was merged with.
    pub fn policy(&self) -> MergePolicy {
        self.inner.policy
    }
}

impl Doner for MergedContext {
    fn done(&self) -> Signal {
        self.inner.completion.signal()
    }
}

impl Context for MergedContext {
    fn deadline(&self) -> Option<Instant> {
        let [first, second] = &self.inner.parents;

        merge_deadlines(first.deadline(), second.deadline(), self.inner.policy)
    }

    fn err(&self) -> Option<ContextError> {
        self.inner.completion.err()
    }

    fn value(&self, key: TypeId) -> Option<Value> {
        let [first, second] = &self.inner.parents;

        first.value(key).or_else(|| second.value(key))
    }
}

impl fmt::Debug for MergedContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MergedContext")
            .field("policy", &self.inner.policy)
            .field("deadline", &self.deadline())
            .field("err", &self.err())
            .finish_non_exhaustive()
    }
}

/// Combines two deadlines, treating `None` as an infinitely distant deadline.
fn merge_deadlines(
    first: Option<Instant>,
    second: Option<Instant>,
    policy: MergePolicy,
) -> Option<Instant> {
    match (first, second, policy) {
        (Some(first), Some(second), MergePolicy::Or) => Some(first.min(second)),
        (Some(first), Some(second), MergePolicy::And) => Some(first.max(second)),
        (Some(deadline), None, MergePolicy::Or) | (None, Some(deadline), MergePolicy::Or) => {
            Some(deadline)
        }
        (_, _, MergePolicy::And) | (None, None, MergePolicy::Or) => None,
    }
}

/// Error recorded when both parents of an `And` merge have completed.
fn and_error(first: &ContextRef, second: &ContextRef) -> ContextError {
    first
        .err()
        .or_else(|| second.err())
        .unwrap_or(ContextError::Canceled)
}

/// Merges `first` and `second` into a single context under `policy`.
///
/// The returned [`CancelFunc`] completes the merged context with
/// [`ContextError::Canceled`] unless a parent's completion was already recorded. It is
/// idempotent and does not affect the parents.
pub fn merge<C0, C1>(first: C0, second: C1, policy: MergePolicy) -> (MergedContext, CancelFunc)
where
    C0: Context + 'static,
    C1: Context + 'static,
{
    let parents: [ContextRef; 2] = [Arc::new(first) as ContextRef, Arc::new(second)];
    let completion = Arc::new(Completion::new());

    let cancel = {
        let completion = completion.clone();
        CancelFunc::new(move || {
            if completion.complete(ContextError::Canceled) {
                debug!("merged context cancelled");
            }
        })
    };

    watch_parents(completion.clone(), parents.clone(), policy);

    let context = MergedContext {
        inner: Arc::new(MergedInner {
            parents,
            policy,
            completion,
        }),
    };

    (context, cancel)
}

/// Completes `completion` once the parents satisfy `policy`.
fn watch_parents(completion: Arc<Completion>, parents: [ContextRef; 2], policy: MergePolicy) {
    let signals = [parents[0].done(), parents[1].done()];

    match policy {
        MergePolicy::Or => {
            if let Some(index) = signals.iter().position(Signal::is_done) {
                completion.complete(parents[index].err().unwrap_or(ContextError::Canceled));
                return;
            }
        }
        MergePolicy::And => {
            if signals.iter().all(Signal::is_done) {
                completion.complete(and_error(&parents[0], &parents[1]));
                return;
            }
        }
    }

    spawn_watcher(WatcherKind::Merge, async move {
        let own = completion.signal();

        match policy {
            MergePolicy::Or => {
                tokio::select! {
                    fired = first_fired(&signals) => match fired {
                        Some(index) => {
                            let err = parents[index].err().unwrap_or(ContextError::Canceled);
                            trace!(parent = index, %err, "merged parent completed");
                            completion.complete(err);
                        }
                        None => trace!("both merged parents abandoned"),
                    },
                    _ = own.settled() => {}
                }
            }
            MergePolicy::And => {
                tokio::select! {
                    fired = all_fired(&signals) => {
                        if fired {
                            let err = and_error(&parents[0], &parents[1]);
                            trace!(%err, "both merged parents completed");
                            completion.complete(err);
                        }
                    }
                    _ = own.settled() => {}
                }
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{self, ContextExt, background, with_cancel, with_deadline};
    use crate::test_utils::{assert_completes_within, assert_pending_for};
    use std::time::Duration;

    #[derive(Debug, PartialEq)]
    struct Key(&'static str);

    #[test]
    fn test_merge_deadlines_or_picks_earliest() {
        let now = Instant::now();
        let early = now + Duration::from_millis(50);
        let late = now + Duration::from_millis(100);

        assert_eq!(merge_deadlines(Some(late), Some(early), MergePolicy::Or), Some(early));
        assert_eq!(merge_deadlines(None, Some(late), MergePolicy::Or), Some(late));
        assert_eq!(merge_deadlines(Some(early), None, MergePolicy::Or), Some(early));
        assert_eq!(merge_deadlines(None, None, MergePolicy::Or), None);
    }

    #[test]
    fn test_merge_deadlines_and_picks_latest() {
        let now = Instant::now();
        let early = now + Duration::from_millis(50);
        let late = now + Duration::from_millis(100);

        assert_eq!(merge_deadlines(Some(late), Some(early), MergePolicy::And), Some(late));
        assert_eq!(merge_deadlines(None, Some(late), MergePolicy::And), None);
        assert_eq!(merge_deadlines(None, None, MergePolicy::And), None);
    }

    #[tokio::test]
    async fn test_or_completes_with_first_parent() {
        let (first, _cancel_first) = with_cancel(background());
        let (second, cancel_second) = with_cancel(background());

        let (merged, _cancel) = merge(first, second, MergePolicy::Or);
        assert_pending_for(&merged.done(), Duration::from_millis(20)).await;
        assert!(merged.err().is_none());

        cancel_second.cancel();

        assert_completes_within(&merged.done(), Duration::from_millis(100)).await;
        assert_eq!(merged.err(), Some(ContextError::Canceled));
    }

    #[tokio::test]
    async fn test_or_propagates_deadline_error() {
        let (first, _cancel_first) =
            with_deadline(background(), Instant::now() + Duration::from_millis(20));
        let (second, _cancel_second) = with_cancel(background());

        let (merged, _cancel) = merge(first, second, MergePolicy::Or);

        assert_completes_within(&merged.done(), Duration::from_secs(1)).await;
        assert_eq!(merged.err(), Some(ContextError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_and_waits_for_both_parents() {
        let (first, cancel_first) = with_cancel(background());
        let (second, cancel_second) = with_cancel(background());

        let (merged, _cancel) = merge(first, second, MergePolicy::And);

        cancel_first.cancel();
        assert_pending_for(&merged.done(), Duration::from_millis(30)).await;

        cancel_second.cancel();
        assert_completes_within(&merged.done(), Duration::from_millis(100)).await;
    }

    // Best-effort: with two distinct parent errors the first parent's is reported.
    #[tokio::test]
    async fn test_and_prefers_first_parent_error() {
        let (first, _cancel_first) = with_deadline(background(), Instant::now());
        let (second, cancel_second) = with_cancel(background());
        cancel_second.cancel();

        let (merged, _cancel) = merge(first, second, MergePolicy::And);

        assert!(merged.done().is_done());
        assert_eq!(merged.err(), Some(ContextError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_cancel_is_idempotent_and_keeps_parent_error() {
        let (first, _cancel_first) = with_deadline(background(), Instant::now());
        let (merged, cancel) = merge(first, background(), MergePolicy::Or);

        cancel.cancel();
        cancel.cancel();

        assert_eq!(merged.err(), Some(ContextError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_cancel_completes_merged_context() {
        let (merged, cancel) = merge(background(), background(), MergePolicy::Or);

        cancel.cancel();

        assert!(merged.done().is_done());
        assert_eq!(merged.err(), Some(ContextError::Canceled));
    }

    #[tokio::test]
    async fn test_values_prefer_first_parent() {
        let first = context::with_value(background(), Key("first"));
        let second = context::with_value(background(), Key("second"));
        let second = context::with_value(second, 42u32);

        let (merged, _cancel) = merge(first, second, MergePolicy::Or);

        assert_eq!(merged.value_of::<Key>().as_deref(), Some(&Key("first")));
        assert_eq!(merged.value_of::<u32>().as_deref(), Some(&42));
        assert!(merged.value_of::<String>().is_none());
    }

    #[tokio::test]
    async fn test_deadline_follows_policy() {
        let now = Instant::now();
        let (first, _c0) = with_deadline(background(), now + Duration::from_secs(100));
        let (second, _c1) = with_deadline(background(), now + Duration::from_secs(50));

        let (or, _cancel_or) = merge(first.clone(), second.clone(), MergePolicy::Or);
        let (and, _cancel_and) = merge(first, second, MergePolicy::And);

        assert_eq!(or.deadline(), Some(now + Duration::from_secs(50)));
        assert_eq!(and.deadline(), Some(now + Duration::from_secs(100)));
    }
}
