//! Deadline- and value-carrying contexts.
//!
//! A [`Context`] extends the [`Doner`] capability with an optional deadline, an error
//! that explains why it completed, and a type-keyed value lookup. Completion and error
//! are separate channels: callers wait on [`Doner::done`] and then read
//! [`Context::err`], which stays `None` until completion has been broadcast.
//!
//! Derived contexts record their error exactly once, under a mutex, strictly before the
//! completion is broadcast, so a later cancellation can never replace an error that a
//! parent or a deadline already recorded.

use std::any::{Any, TypeId};
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::trace;

use crate::cancel::CancelFunc;
use crate::error::ContextError;
use crate::signal::{Doner, Settled, Signal, Trigger, create_signal};
use crate::timer::Expiry;
use crate::watcher::{WatcherKind, spawn_watcher};

/// A value stored in a context.
pub type Value = Arc<dyn Any + Send + Sync>;

/// Shared handle to a type-erased context.
pub type ContextRef = Arc<dyn Context>;

/// Completion, deadline, error and value lookup of a unit of work.
pub trait Context: Doner {
    /// Returns the time at which this context will complete on its own, if any.
    fn deadline(&self) -> Option<Instant>;

    /// Returns why the context completed, or `None` while it is still pending.
    fn err(&self) -> Option<ContextError>;

    /// Looks up the value stored under `key`.
    fn value(&self, key: TypeId) -> Option<Value>;
}

impl<C: Context + ?Sized> Context for &C {
    fn deadline(&self) -> Option<Instant> {
        (**self).deadline()
    }

    fn err(&self) -> Option<ContextError> {
        (**self).err()
    }

    fn value(&self, key: TypeId) -> Option<Value> {
        (**self).value(key)
    }
}

impl<C: Context + ?Sized> Context for Arc<C> {
    fn deadline(&self) -> Option<Instant> {
        (**self).deadline()
    }

    fn err(&self) -> Option<ContextError> {
        (**self).err()
    }

    fn value(&self, key: TypeId) -> Option<Value> {
        (**self).value(key)
    }
}

impl<C: Context + ?Sized> Context for Box<C> {
    fn deadline(&self) -> Option<Instant> {
        (**self).deadline()
    }

    fn err(&self) -> Option<ContextError> {
        (**self).err()
    }

    fn value(&self, key: TypeId) -> Option<Value> {
        (**self).value(key)
    }
}

/// Typed helpers on top of [`Context`].
pub trait ContextExt: Context {
    /// Looks up the value stored for type `T`.
    fn value_of<T>(&self) -> Option<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.value(TypeId::of::<T>())
            .and_then(|value| value.downcast::<T>().ok())
    }
}

impl<C: Context + ?Sized> ContextExt for C {}

/// Write-once completion error paired with the signal that broadcasts it.
pub(crate) struct Completion {
    trigger: Trigger,
    signal: Signal,
    err: Mutex<Option<ContextError>>,
}

impl Completion {
    pub(crate) fn new() -> Self {
        let (trigger, signal) = create_signal();

        Self {
            trigger,
            signal,
            err: Mutex::new(None),
        }
    }

    pub(crate) fn signal(&self) -> Signal {
        self.signal.clone()
    }

    /// Records `err` unless an error was already recorded, then broadcasts completion.
    ///
    /// Returns `true` if this call completed the context.
    pub(crate) fn complete(&self, err: ContextError) -> bool {
        {
            let mut slot = self.err.lock().unwrap_or_else(PoisonError::into_inner);
            if slot.is_some() {
                return false;
            }
            *slot = Some(err);
        }

        self.trigger.fire()
    }

    /// Returns the recorded error once completion has been broadcast.
    pub(crate) fn err(&self) -> Option<ContextError> {
        if !self.signal.is_done() {
            return None;
        }

        *self.err.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The root context: never completes, has no deadline and stores no values.
#[derive(Debug, Clone, Copy, Default)]
pub struct Background;

impl Doner for Background {
    fn done(&self) -> Signal {
        Signal::never()
    }
}

impl Context for Background {
    fn deadline(&self) -> Option<Instant> {
        None
    }

    fn err(&self) -> Option<ContextError> {
        None
    }

    fn value(&self, _key: TypeId) -> Option<Value> {
        None
    }
}

/// Returns the root [`Background`] context.
pub fn background() -> Background {
    Background
}

/// A context that completes on cancellation, on its deadline, or with its parent.
#[derive(Clone)]
pub struct CancelContext {
    inner: Arc<CancelInner>,
}

struct CancelInner {
    parent: ContextRef,
    deadline: Option<Instant>,
    completion: Arc<Completion>,
}

impl CancelContext {
    fn derive(parent: ContextRef, deadline: Option<Instant>) -> (Self, CancelFunc) {
        let completion = Arc::new(Completion::new());

        let cancel = {
            let completion = completion.clone();
            CancelFunc::new(move || {
                completion.complete(ContextError::Canceled);
            })
        };

        watch_parent(completion.clone(), parent.clone(), deadline);

        let context = Self {
            inner: Arc::new(CancelInner {
                parent,
                deadline,
                completion,
            }),
        };

        (context, cancel)
    }
}

impl Doner for CancelContext {
    fn done(&self) -> Signal {
        self.inner.completion.signal()
    }
}

impl Context for CancelContext {
    fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    fn err(&self) -> Option<ContextError> {
        self.inner.completion.err()
    }

    fn value(&self, key: TypeId) -> Option<Value> {
        self.inner.parent.value(key)
    }
}

impl fmt::Debug for CancelContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelContext")
            .field("deadline", &self.inner.deadline)
            .field("err", &self.err())
            .finish_non_exhaustive()
    }
}

/// Completes `completion` when `parent` completes or `deadline` passes.
///
/// The watcher exits once the context is complete, or once the parent has been
/// abandoned and there is no deadline left to wait for.
fn watch_parent(completion: Arc<Completion>, parent: ContextRef, deadline: Option<Instant>) {
    let parent_done = parent.done();

    if parent_done.is_done() {
        completion.complete(parent.err().unwrap_or(ContextError::Canceled));
        return;
    }

    if deadline.is_some_and(|deadline| deadline <= Instant::now()) {
        completion.complete(ContextError::DeadlineExceeded);
        return;
    }

    spawn_watcher(WatcherKind::Context, async move {
        let own = completion.signal();
        let expiry = Expiry::new(deadline);
        tokio::pin!(expiry);

        let mut parent_live = true;
        loop {
            tokio::select! {
                settled = parent_done.settled(), if parent_live => match settled {
                    Settled::Fired => {
                        let err = parent.err().unwrap_or(ContextError::Canceled);
                        trace!(%err, "parent context completed");
                        completion.complete(err);
                        return;
                    }
                    Settled::Abandoned if deadline.is_none() => return,
                    Settled::Abandoned => parent_live = false,
                },
                () = &mut expiry => {
                    trace!("context deadline exceeded");
                    completion.complete(ContextError::DeadlineExceeded);
                    return;
                }
                _ = own.settled() => return,
            }
        }
    });
}

/// Derives a context that is cancelled by the returned [`CancelFunc`] or when `parent`
/// completes.
pub fn with_cancel<C>(parent: C) -> (CancelContext, CancelFunc)
where
    C: Context + 'static,
{
    let parent: ContextRef = Arc::new(parent);
    let deadline = parent.deadline();

    CancelContext::derive(parent, deadline)
}

/// Derives a context that additionally completes with
/// [`ContextError::DeadlineExceeded`] at `deadline`.
///
/// A child can never outlive its parent, so the effective deadline is the earlier of
/// `deadline` and the parent's.
pub fn with_deadline<C>(parent: C, deadline: Instant) -> (CancelContext, CancelFunc)
where
    C: Context + 'static,
{
    let parent: ContextRef = Arc::new(parent);
    let deadline = match parent.deadline() {
        Some(parent_deadline) => parent_deadline.min(deadline),
        None => deadline,
    };

    CancelContext::derive(parent, Some(deadline))
}

/// Derives a context whose deadline is `timeout` from now.
pub fn with_timeout<C>(parent: C, timeout: Duration) -> (CancelContext, CancelFunc)
where
    C: Context + 'static,
{
    with_deadline(parent, Instant::now() + timeout)
}

/// A context that stores one value on top of its parent.
#[derive(Clone)]
pub struct ValueContext {
    parent: ContextRef,
    key: TypeId,
    value: Value,
}

impl Doner for ValueContext {
    fn done(&self) -> Signal {
        self.parent.done()
    }
}

impl Context for ValueContext {
    fn deadline(&self) -> Option<Instant> {
        self.parent.deadline()
    }

    fn err(&self) -> Option<ContextError> {
        self.parent.err()
    }

    fn value(&self, key: TypeId) -> Option<Value> {
        if key == self.key {
            return Some(self.value.clone());
        }

        self.parent.value(key)
    }
}

impl fmt::Debug for ValueContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueContext")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// Derives a context that stores `value`, keyed by its type.
pub fn with_value<C, T>(parent: C, value: T) -> ValueContext
where
    C: Context + 'static,
    T: Any + Send + Sync,
{
    ValueContext {
        parent: Arc::new(parent),
        key: TypeId::of::<T>(),
        value: Arc::new(value),
    }
}

/// A context view of a bare signal.
///
/// It has no deadline and no values, and reports [`ContextError::Canceled`] once the
/// signal completes.
#[derive(Debug, Clone)]
pub struct SignalContext {
    signal: Signal,
}

impl Doner for SignalContext {
    fn done(&self) -> Signal {
        self.signal.clone()
    }
}

impl Context for SignalContext {
    fn deadline(&self) -> Option<Instant> {
        None
    }

    fn err(&self) -> Option<ContextError> {
        self.signal.is_done().then_some(ContextError::Canceled)
    }

    fn value(&self, _key: TypeId) -> Option<Value> {
        None
    }
}

/// Wraps the completion of `doner` as a [`Context`].
pub fn as_context<D>(doner: &D) -> SignalContext
where
    D: Doner + ?Sized,
{
    SignalContext {
        signal: doner.done(),
    }
}
