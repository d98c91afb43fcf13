//! Reference-counted cancellation.
//!
//! [`with_ref_count`] derives a cancellable child signal and pairs it with a
//! [`RefCounter`]. Holders take a reference with [`RefCounter::incr`] and give it back
//! with [`RefCounter::decr`]; the child is cancelled when the references run out.
//!
//! The counter starts at zero and is a single signed atomic. The cancellation rule is:
//! a mutation with a negative delta that leaves the count at or below zero cancels the
//! child. Therefore:
//!
//! - releasing the last reference (positive to zero) cancels;
//! - releasing past zero without a matching reference (over-release) cancels at once;
//! - taking references never cancels, and a count that starts at zero does not cancel
//!   until something is released;
//! - after cancellation, further mutations only move the counter.
//!
//! Completion of the parent cancels the child as well.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use tracing::debug;

use crate::cancel::{CancelFunc, with_cancel};
use crate::context::{self, CancelContext, Context};
use crate::signal::{Doner, Signal};

/// Shared reference counter that cancels its signal when references run out.
///
/// Clones share the same counter.
#[derive(Debug, Clone)]
pub struct RefCounter {
    inner: Arc<RefCounterInner>,
}

#[derive(Debug)]
struct RefCounterInner {
    cancel: CancelFunc,
    count: AtomicI64,
}

impl RefCounter {
    fn new(cancel: CancelFunc) -> Self {
        Self {
            inner: Arc::new(RefCounterInner {
                cancel,
                count: AtomicI64::new(0),
            }),
        }
    }

    /// Takes one reference.
    pub fn incr(&self) {
        self.add(1);
    }

    /// Releases one reference.
    pub fn decr(&self) {
        self.add(-1);
    }

    /// Adds `delta` references, which may be negative to release several at once.
    pub fn add(&self, delta: i64) {
        let previous = self.inner.count.fetch_add(delta, Ordering::AcqRel);
        let current = previous.wrapping_add(delta);

        if delta < 0 && current <= 0 {
            debug!(previous, current, "references released, cancelling");
            self.inner.cancel.cancel();
        }
    }

    /// Returns the current number of references.
    pub fn count(&self) -> i64 {
        self.inner.count.load(Ordering::Acquire)
    }
}

/// Derives a signal that is cancelled when `parent` completes or when all references
/// taken on the returned [`RefCounter`] have been released.
pub fn with_ref_count<D>(parent: &D) -> (Signal, RefCounter)
where
    D: Doner + ?Sized,
{
    let (signal, cancel) = with_cancel(parent);

    (signal, RefCounter::new(cancel))
}

/// Context flavour of [`with_ref_count`].
///
/// The derived context completes with [`crate::ContextError::Canceled`] when the
/// references run out, and otherwise inherits deadline, error and values from `parent`.
pub fn context_with_ref_count<C>(parent: C) -> (CancelContext, RefCounter)
where
    C: Context + 'static,
{
    let (context, cancel) = context::with_cancel(parent);

    (context, RefCounter::new(cancel))
}
