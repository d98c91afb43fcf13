//! Error types for signal setup and context completion.
//!
//! Completion itself never fails. [`ContextError`] is the value a context caches when it
//! completes and exposes through [`crate::Context::err`]. [`CtxError`] covers the few
//! fallible setup paths, such as registering OS signal handlers.

use ctx_config::shared::ValidationError;
use thiserror::Error;

/// Convenient result type for fallible setup operations.
pub type CtxResult<T> = Result<T, CtxError>;

/// Reason a context completed.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextError {
    /// The context was cancelled explicitly or because a parent was cancelled.
    #[error("context canceled")]
    Canceled,
    /// The context's deadline elapsed before it was cancelled.
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Errors raised while constructing signals or drivers.
#[derive(Debug, Error)]
pub enum CtxError {
    /// An interval driver was configured with a zero period.
    #[error("interval period must be greater than zero")]
    ZeroPeriod,

    /// The OS refused to install a handler for a termination signal.
    #[error("failed to register {signal} handler: {source}")]
    SignalRegistration {
        signal: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// A configuration value failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ValidationError),
}
