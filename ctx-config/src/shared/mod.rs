//! Shared configuration types for signal-driven services.

mod base;
mod interval;
mod shutdown;

pub use base::ValidationError;
pub use interval::{IntervalConfig, MissedTickPolicy};
pub use shutdown::ShutdownConfig;
