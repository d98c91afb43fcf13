//! Periodic callbacks bounded by a signal.

use std::future::{Future, ready};
use std::time::Duration;

use ctx_config::shared::{IntervalConfig, MissedTickPolicy};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::debug;

use crate::error::{CtxError, CtxResult};
use crate::signal::{Doner, Settled};
use crate::watcher::{WatcherKind, spawn_watcher};

/// Invokes a callback every period until a signal completes.
///
/// The first invocation happens one full period after [`IntervalDriver::run`] is called.
/// Invocations never overlap: a callback that overruns the period delays the next one
/// according to the [`MissedTickPolicy`].
#[derive(Debug, Clone, Copy)]
pub struct IntervalDriver {
    period: Duration,
    missed_tick_policy: MissedTickPolicy,
}

impl IntervalDriver {
    /// Creates a driver that skips missed ticks.
    ///
    /// Fails with [`CtxError::ZeroPeriod`] if `period` is zero.
    pub fn new(period: Duration) -> CtxResult<Self> {
        if period.is_zero() {
            return Err(CtxError::ZeroPeriod);
        }

        Ok(Self {
            period,
            missed_tick_policy: MissedTickPolicy::default(),
        })
    }

    /// Creates a driver from validated configuration.
    pub fn from_config(config: &IntervalConfig) -> CtxResult<Self> {
        config.validate()?;

        Ok(Self {
            period: config.period(),
            missed_tick_policy: config.missed_tick_policy,
        })
    }

    pub fn with_missed_tick_policy(mut self, policy: MissedTickPolicy) -> Self {
        self.missed_tick_policy = policy;
        self
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn missed_tick_policy(&self) -> MissedTickPolicy {
        self.missed_tick_policy
    }

    /// Spawns the driver task and returns its handle.
    ///
    /// The task finishes once `doner` completes. If `doner` is abandoned the task keeps
    /// ticking until the handle is aborted or the runtime shuts down.
    pub fn run<D, F, Fut>(&self, doner: &D, mut callback: F) -> JoinHandle<()>
    where
        D: Doner + ?Sized,
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let signal = doner.done();
        let period = self.period;
        let behavior = missed_tick_behavior(self.missed_tick_policy);

        spawn_watcher(WatcherKind::Interval, async move {
            if signal.is_done() {
                return;
            }

            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(behavior);

            let mut live = true;
            let mut invocations: u64 = 0;

            loop {
                tokio::select! {
                    biased;

                    settled = signal.settled(), if live => match settled {
                        Settled::Fired => break,
                        Settled::Abandoned => live = false,
                    },

                    _ = ticker.tick() => {
                        // The signal may have completed while the timer was due.
                        if signal.is_done() {
                            break;
                        }

                        callback().await;
                        invocations += 1;
                    }
                }
            }

            debug!(?period, invocations, "interval driver stopped");
        })
    }
}

fn missed_tick_behavior(policy: MissedTickPolicy) -> MissedTickBehavior {
    match policy {
        MissedTickPolicy::Skip => MissedTickBehavior::Skip,
        MissedTickPolicy::Delay => MissedTickBehavior::Delay,
    }
}

/// Calls `callback` every `period` until `doner` completes.
pub fn tick_every<D, F>(doner: &D, period: Duration, mut callback: F) -> CtxResult<JoinHandle<()>>
where
    D: Doner + ?Sized,
    F: FnMut() + Send + 'static,
{
    let driver = IntervalDriver::new(period)?;

    Ok(driver.run(doner, move || {
        callback();
        ready(())
    }))
}

/// Awaits the future returned by `callback` on every tick configured by `config`, until
/// `doner` completes.
pub fn tick_every_with<D, F, Fut>(
    doner: &D,
    config: &IntervalConfig,
    callback: F,
) -> CtxResult<JoinHandle<()>>
where
    D: Doner + ?Sized,
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let driver = IntervalDriver::from_config(config)?;

    Ok(driver.run(doner, callback))
}
