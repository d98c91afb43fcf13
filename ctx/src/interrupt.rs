//! Process-wide signal that completes on the first termination request.
//!
//! On Unix the signal completes on the first `SIGINT` or `SIGTERM`, elsewhere on the
//! first Ctrl+C. Handlers are installed lazily by the first call to [`signal`] and shared
//! by every later caller. Components should receive the returned [`Signal`] as an
//! argument rather than calling [`signal`] themselves.

use std::sync::{Mutex, PoisonError};

use tracing::info;

use crate::context::{SignalContext, as_context};
use crate::error::CtxResult;
use crate::signal::{Signal, create_signal};
use crate::watcher::{WatcherKind, spawn_watcher};

// Initialisation can fail, so this is a mutex rather than a `OnceLock`. A cached signal
// is replaced if its listener died with the runtime that spawned it.
static INTERRUPT: Mutex<Option<Signal>> = Mutex::new(None);

/// Returns the interrupt signal, installing the OS handlers on first use.
///
/// # Panics
///
/// Panics when called outside of a Tokio runtime with the signal driver enabled.
pub fn signal() -> CtxResult<Signal> {
    let mut cached = INTERRUPT.lock().unwrap_or_else(PoisonError::into_inner);

    if let Some(signal) = cached.as_ref().filter(|signal| !signal.is_abandoned()) {
        return Ok(signal.clone());
    }

    let signal = listen()?;
    *cached = Some(signal.clone());

    Ok(signal)
}

/// Returns the interrupt signal as a [`crate::Context`] whose error is
/// [`crate::ContextError::Canceled`] once a termination request arrived.
pub fn context() -> CtxResult<SignalContext> {
    Ok(as_context(&signal()?))
}

#[cfg(unix)]
fn listen() -> CtxResult<Signal> {
    use tokio::signal::unix::{SignalKind, signal as register};
    use tracing::debug;

    use crate::error::CtxError;

    let mut sigint =
        register(SignalKind::interrupt()).map_err(|source| CtxError::SignalRegistration {
            signal: "SIGINT",
            source,
        })?;
    let mut sigterm =
        register(SignalKind::terminate()).map_err(|source| CtxError::SignalRegistration {
            signal: "SIGTERM",
            source,
        })?;

    let (trigger, signal) = create_signal();

    spawn_watcher(WatcherKind::Interrupt, async move {
        tokio::select! {
            Some(()) = sigint.recv() => info!("sigint received, firing interrupt signal"),
            Some(()) = sigterm.recv() => info!("sigterm received, firing interrupt signal"),
            else => {
                debug!("signal streams closed, interrupt listener stopped");
                return;
            }
        }

        trigger.fire();
    });

    Ok(signal)
}

#[cfg(not(unix))]
fn listen() -> CtxResult<Signal> {
    use tracing::warn;

    let (trigger, signal) = create_signal();

    spawn_watcher(WatcherKind::Interrupt, async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("ctrl+c received, firing interrupt signal");
                trigger.fire();
            }
            Err(error) => warn!(%error, "failed to listen for ctrl+c"),
        }
    });

    Ok(signal)
}
