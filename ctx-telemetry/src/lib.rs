//! Logging and metrics setup shared by binaries and tests built on `ctx`.

pub mod metrics;
pub mod tracing;
