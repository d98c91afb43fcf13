use std::sync::Once;

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Environment variable that turns on log output in tests.
const ENABLE_TRACING_ENV_NAME: &str = "ENABLE_TRACING";

/// Flushes buffered log lines when dropped.
///
/// Keep it alive until the end of `main`, otherwise the last log lines are lost.
pub type LogFlusher = WorkerGuard;

#[derive(Debug, Error)]
pub enum TracingError {
    #[error("failed to install the global tracing subscriber: {0}")]
    Init(#[from] TryInitError),
}

/// Installs the global subscriber for a binary named `app_name`.
///
/// Log lines are written to stdout from a background thread. Filtering follows
/// `RUST_LOG` and defaults to `info` for the binary and the `ctx` crate.
pub fn init_tracing(app_name: &str) -> Result<LogFlusher, TracingError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{app_name}=info,ctx=info")));
    let (writer, flusher) = tracing_appender::non_blocking(std::io::stdout());

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(writer))
        .try_init()?;

    Ok(flusher)
}

static INIT_TEST_TRACING: Once = Once::new();

/// Installs a subscriber that writes through the test harness.
///
/// Does nothing unless `ENABLE_TRACING` is set, so test output stays quiet by default.
/// Safe to call from every test.
pub fn init_test_tracing() {
    if std::env::var_os(ENABLE_TRACING_ENV_NAME).is_none() {
        return;
    }

    INIT_TEST_TRACING.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("ctx=trace"));

        // Another subscriber may already be installed by the test binary.
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_test_writer())
            .try_init();
    });
}
