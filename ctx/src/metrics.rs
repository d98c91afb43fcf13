//! Metrics definitions for signal and watcher monitoring.

use metrics::{Unit, describe_counter, describe_gauge};
use std::sync::Once;

static REGISTER: Once = Once::new();

/// Label for the kind of watcher task (`link`, `join`, `merge`, ...).
pub const WATCHER_KIND_LABEL: &str = "kind";

/// Gauge for watcher tasks currently parked on a completion.
pub const CTX_WATCHERS_ACTIVE: &str = "ctx_watchers_active";

/// Counter for watcher tasks spawned since startup.
pub const CTX_WATCHERS_SPAWNED_TOTAL: &str = "ctx_watchers_spawned_total";

/// Counter for signals that transitioned to complete.
pub const CTX_SIGNALS_FIRED_TOTAL: &str = "ctx_signals_fired_total";

/// Register signal metrics. Safe to call multiple times.
pub fn register_metrics() {
    REGISTER.call_once(|| {
        describe_gauge!(
            CTX_WATCHERS_ACTIVE,
            Unit::Count,
            "Number of watcher tasks waiting on a completion"
        );
        describe_counter!(
            CTX_WATCHERS_SPAWNED_TOTAL,
            Unit::Count,
            "Total number of watcher tasks spawned"
        );
        describe_counter!(
            CTX_SIGNALS_FIRED_TOTAL,
            Unit::Count,
            "Total number of signals that completed"
        );
    });
}
