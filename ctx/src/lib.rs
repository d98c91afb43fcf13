//! Composable completion signals for Tokio.
//!
//! A [`Signal`] represents an operation that completes exactly once. Combinators derive
//! new signals from existing ones so that concurrent components can depend on each
//! other's lifetimes without holding references to each other:
//!
//! - [`link`] completes when any constituent completes.
//! - [`join`] completes when every constituent has completed.
//! - [`with_cancel`] and [`with_ref_count`] add an owned trigger to a parent signal.
//! - [`merge`] unions two [`Context`]s under an OR or AND policy.
//! - [`defer`], [`tick`] and [`tick_every`] react to eventual completion.
//!
//! Every combinator that needs to watch its inputs spawns one Tokio task, so they must be
//! called from within a runtime.

pub mod cancel;
pub mod combinator;
pub mod context;
pub mod defer;
pub mod error;
#[cfg(feature = "signal")]
pub mod interrupt;
pub mod interval;
pub mod merge;
pub mod metrics;
pub mod refcount;
pub mod signal;
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
pub mod tick;

mod timer;
mod watcher;

pub use cancel::{CancelFunc, with_cancel};
pub use combinator::{join, link};
pub use context::{Context, ContextExt};
pub use defer::{defer, defer_async};
pub use error::{ContextError, CtxError, CtxResult};
pub use interval::{IntervalDriver, tick_every, tick_every_with};
pub use merge::{MergePolicy, MergedContext, merge};
pub use refcount::{RefCounter, context_with_ref_count, with_ref_count};
pub use signal::{BindFunc, Binder, Doner, Signal, Trigger, create_signal};
pub use tick::{Ticks, tick};
pub use watcher::active_watchers;
