//! Interval driver configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// What an interval driver does when a callback overruns one or more ticks.
///
/// Neither policy queues up missed invocations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissedTickPolicy {
    /// Drop the missed ticks and stay aligned to the original schedule.
    #[default]
    Skip,
    /// Restart the schedule one full period after the late invocation.
    Delay,
}

/// Configuration for a periodic callback bounded by a signal.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct IntervalConfig {
    /// Time between invocations, in milliseconds.
    ///
    /// Default: 1000 (1 second)
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,

    /// Behavior when an invocation takes longer than the period.
    #[serde(default)]
    pub missed_tick_policy: MissedTickPolicy,
}

impl IntervalConfig {
    /// Default period: 1 second.
    pub const DEFAULT_PERIOD_MS: u64 = 1_000;

    /// Returns the configured period.
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    /// Validates the interval configuration.
    ///
    /// Ensures period_ms is non-zero.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.period_ms == 0 {
            return Err(ValidationError::InvalidFieldValue {
                field: "period_ms".to_string(),
                constraint: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

impl Default for IntervalConfig {
    fn default() -> Self {
        Self {
            period_ms: default_period_ms(),
            missed_tick_policy: MissedTickPolicy::default(),
        }
    }
}

fn default_period_ms() -> u64 {
    IntervalConfig::DEFAULT_PERIOD_MS
}
