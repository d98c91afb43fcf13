//! One-shot completion signals.
//!
//! This module wraps tokio's watch channels into a completion primitive. A [`Signal`] is
//! the read side: it starts pending and transitions to complete exactly once, after which
//! every current and future observer sees it as complete. A [`Trigger`] is the write side.
//!
//! When every [`Trigger`] of a signal has been dropped without firing, the signal can no
//! longer complete and is considered abandoned. Observers waiting through
//! [`Signal::wait`] stay pending forever, while the crate's own watcher tasks use
//! abandonment to terminate instead of parking indefinitely.

use std::fmt;
use std::future::IntoFuture;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::future::BoxFuture;
use metrics::counter;
use tokio::sync::watch;
use tracing::trace;

use crate::cancel::CancelFunc;
use crate::metrics::CTX_SIGNALS_FIRED_TOTAL;

/// Capability of anything that can hand out a completion [`Signal`].
///
/// Every combinator in this crate is generic over this trait rather than over concrete
/// signal types.
pub trait Doner: Send + Sync {
    /// Returns a signal that completes when `self` completes.
    fn done(&self) -> Signal;
}

impl<D: Doner + ?Sized> Doner for &D {
    fn done(&self) -> Signal {
        (**self).done()
    }
}

impl<D: Doner + ?Sized> Doner for Arc<D> {
    fn done(&self) -> Signal {
        (**self).done()
    }
}

impl<D: Doner + ?Sized> Doner for Box<D> {
    fn done(&self) -> Signal {
        (**self).done()
    }
}

/// Wraps a foreign channel as a [`Signal`] without creating a new channel.
///
/// The sender is expected to only ever move the value from `false` to `true`. If it
/// stores `false` again, the returned signal and its clones still report completion once
/// any of them has observed `true`. A signal obtained from a later call starts from the
/// channel's current value.
impl Doner for watch::Receiver<bool> {
    fn done(&self) -> Signal {
        Signal {
            rx: Some(self.clone()),
            latch: Some(Arc::new(AtomicBool::new(false))),
        }
    }
}

/// How waiting on a signal ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Settled {
    /// The signal completed.
    Fired,
    /// Every trigger was dropped without firing.
    Abandoned,
}

/// Read side of a one-shot completion event.
///
/// Cloning a [`Signal`] is cheap and every clone observes the same completion.
#[derive(Clone)]
pub struct Signal {
    rx: Option<watch::Receiver<bool>>,
    // Only set for channels whose sender lives outside this crate.
    latch: Option<Arc<AtomicBool>>,
}

impl Signal {
    fn from_receiver(rx: watch::Receiver<bool>) -> Self {
        Self {
            rx: Some(rx),
            latch: None,
        }
    }

    /// Returns a signal that never completes.
    pub fn never() -> Self {
        Self {
            rx: None,
            latch: None,
        }
    }

    /// Returns a signal that is already complete.
    pub fn completed() -> Self {
        let (_, rx) = watch::channel(true);

        Self::from_receiver(rx)
    }

    /// Returns `true` once the signal has completed.
    ///
    /// The result never reverts to `false` after it was observed as `true`.
    pub fn is_done(&self) -> bool {
        let Some(rx) = &self.rx else {
            return false;
        };

        if self.is_latched() {
            return true;
        }

        let done = *rx.borrow();
        if done {
            self.latch_done();
        }

        done
    }

    /// Returns `true` if the signal is pending and can no longer complete.
    pub fn is_abandoned(&self) -> bool {
        match &self.rx {
            Some(rx) => !self.is_done() && rx.has_changed().is_err(),
            None => true,
        }
    }

    fn is_latched(&self) -> bool {
        self.latch
            .as_ref()
            .is_some_and(|latch| latch.load(Ordering::Acquire))
    }

    fn latch_done(&self) {
        if let Some(latch) = &self.latch {
            latch.store(true, Ordering::Release);
        }
    }

    /// Waits until the signal completes.
    ///
    /// Resolves immediately if the signal is already complete. Waiting on an abandoned
    /// signal never resolves.
    pub async fn wait(&self) {
        if self.settled().await == Settled::Abandoned {
            std::future::pending::<()>().await;
        }
    }

    /// Waits until the signal either completes or is abandoned.
    pub(crate) async fn settled(&self) -> Settled {
        let Some(rx) = &self.rx else {
            return Settled::Abandoned;
        };

        if self.is_latched() {
            return Settled::Fired;
        }

        let mut rx = rx.clone();
        if rx.wait_for(|done| *done).await.is_ok() {
            self.latch_done();
            Settled::Fired
        } else {
            Settled::Abandoned
        }
    }
}

impl Doner for Signal {
    fn done(&self) -> Signal {
        self.clone()
    }
}

impl IntoFuture for Signal {
    type Output = ();
    type IntoFuture = BoxFuture<'static, ()>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(async move { self.wait().await })
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("done", &self.is_done())
            .finish()
    }
}

/// Write side of a one-shot completion event.
///
/// Cloned triggers share the same signal. Firing is idempotent: only the first call to
/// [`Trigger::fire`] across all clones completes the signal.
#[derive(Debug, Clone)]
pub struct Trigger {
    tx: Arc<watch::Sender<bool>>,
}

impl Trigger {
    /// Completes the signal.
    ///
    /// Returns `true` only for the call that performed the transition. Later and
    /// concurrent calls are no-ops that return `false`.
    pub fn fire(&self) -> bool {
        let fired = self.tx.send_if_modified(|done| {
            if *done {
                return false;
            }

            *done = true;
            true
        });

        if fired {
            trace!("signal fired");
            counter!(CTX_SIGNALS_FIRED_TOTAL).increment(1);
        }

        fired
    }

    /// Returns `true` once the signal has been fired.
    pub fn is_fired(&self) -> bool {
        *self.tx.borrow()
    }

    /// Returns a new read handle for the signal.
    pub fn signal(&self) -> Signal {
        Signal::from_receiver(self.tx.subscribe())
    }

    /// Returns a type-erased cancel function that fires this trigger.
    pub fn cancel_func(&self) -> CancelFunc {
        let trigger = self.clone();
        CancelFunc::new(move || {
            trigger.fire();
        })
    }
}

/// Creates a new pending signal together with its trigger.
pub fn create_signal() -> (Trigger, Signal) {
    let (tx, rx) = watch::channel(false);

    (Trigger { tx: Arc::new(tx) }, Signal::from_receiver(rx))
}

/// Something that attaches its own lifetime to a [`Doner`].
pub trait Binder {
    /// Binds `self` to the completion of `doner`.
    fn bind(&self, doner: &dyn Doner);
}

/// Adapts a closure into a [`Binder`].
pub struct BindFunc<F>(pub F);

impl<F> Binder for BindFunc<F>
where
    F: Fn(&dyn Doner),
{
    fn bind(&self, doner: &dyn Doner) {
        (self.0)(doner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    #[test]
    fn test_signal_starts_pending() {
        let (_trigger, signal) = create_signal();
        assert!(!signal.is_done());
        assert!(!signal.is_abandoned());
    }

    #[test]
    fn test_fire_is_observed_by_all_clones() {
        let (trigger, signal) = create_signal();
        let clone = signal.clone();

        assert!(trigger.fire());

        assert!(signal.is_done());
        assert!(clone.is_done());
        assert!(trigger.signal().is_done());
    }

    #[test]
    fn test_completion_never_reverts() {
        let (trigger, signal) = create_signal();
        trigger.fire();
        drop(trigger);

        for _ in 0..100 {
            assert!(signal.is_done());
        }
        assert!(!signal.is_abandoned());
    }

    #[test]
    fn test_only_first_fire_wins() {
        let (trigger, _signal) = create_signal();
        let other = trigger.clone();

        assert!(trigger.fire());
        assert!(!trigger.fire());
        assert!(!other.fire());
        assert!(other.is_fired());
    }

    #[test]
    fn test_dropping_all_triggers_abandons_signal() {
        let (trigger, signal) = create_signal();
        let clone = trigger.clone();

        drop(trigger);
        assert!(!signal.is_abandoned());

        drop(clone);
        assert!(signal.is_abandoned());
        assert!(!signal.is_done());
    }

    #[test]
    fn test_never_and_completed() {
        assert!(!Signal::never().is_done());
        assert!(Signal::never().is_abandoned());
        assert!(Signal::completed().is_done());
        assert!(!Signal::completed().is_abandoned());
    }

    #[test]
    fn test_receiver_holding_true_is_complete() {
        let (_tx, rx) = watch::channel(true);

        assert!(rx.done().is_done());
    }

    #[test]
    fn test_receiver_completion_latches() {
        let (tx, rx) = watch::channel(false);
        let signal = rx.done();
        let clone = signal.clone();
        assert!(!signal.is_done());

        tx.send_replace(true);
        assert!(signal.is_done());

        tx.send_replace(false);
        assert!(signal.is_done());
        assert!(clone.is_done());
        assert!(!signal.is_abandoned());

        // A signal obtained afterwards starts from the channel's current value.
        assert!(!rx.done().is_done());
    }

    #[tokio::test]
    async fn test_receiver_wait_latches() {
        let (tx, rx) = watch::channel(false);
        let signal = rx.done();

        let waiter = {
            let signal = signal.clone();
            tokio::spawn(async move { signal.settled().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        tx.send_replace(true);
        let settled = timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter did not observe completion")
            .unwrap();
        assert_eq!(settled, Settled::Fired);

        tx.send_replace(false);
        assert!(signal.is_done());
        assert_eq!(signal.settled().await, Settled::Fired);
    }

    #[tokio::test]
    async fn test_receiver_dropped_sender_abandons_signal() {
        let (tx, rx) = watch::channel(false);
        let signal = rx.done();

        drop(tx);

        assert_eq!(signal.settled().await, Settled::Abandoned);
    }

    #[tokio::test]
    async fn test_wait_resolves_after_fire() {
        let (trigger, signal) = create_signal();

        let waiter = tokio::spawn(async move { signal.await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        trigger.fire();
        timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter did not observe completion")
            .unwrap();
    }

    #[tokio::test]
    async fn test_wait_on_abandoned_signal_stays_pending() {
        let (trigger, signal) = create_signal();
        drop(trigger);

        assert_eq!(signal.settled().await, Settled::Abandoned);
        assert!(
            timeout(Duration::from_millis(50), signal.wait())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_concurrent_fires_complete_once() {
        let (trigger, signal) = create_signal();

        let handles = (0..8)
            .map(|_| {
                let trigger = trigger.clone();
                tokio::spawn(async move { trigger.fire() })
            })
            .collect::<Vec<_>>();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }

        assert_eq!(winners, 1);
        assert!(signal.is_done());
    }

    #[test]
    #[should_panic(expected = "called")]
    fn test_bind_func_invokes_closure() {
        let binder = BindFunc(|_: &dyn Doner| panic!("called"));
        binder.bind(&Signal::never());
    }
}
