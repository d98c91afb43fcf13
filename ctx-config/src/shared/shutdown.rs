//! Graceful shutdown configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::shared::ValidationError;

/// Configuration for draining work after a shutdown request.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ShutdownConfig {
    /// How long in-flight work may keep running after shutdown was requested, in
    /// milliseconds.
    ///
    /// Default: 5000 (5 seconds)
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,
}

impl ShutdownConfig {
    /// Default grace period: 5 seconds.
    pub const DEFAULT_GRACE_PERIOD_MS: u64 = 5_000;

    /// Upper bound for the grace period: 10 minutes.
    pub const MAX_GRACE_PERIOD_MS: u64 = 600_000;

    /// Returns the configured grace period.
    pub fn grace_period(&self) -> Duration {
        Duration::from_millis(self.grace_period_ms)
    }

    /// Validates the shutdown configuration.
    ///
    /// Ensures grace_period_ms does not exceed [`ShutdownConfig::MAX_GRACE_PERIOD_MS`].
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.grace_period_ms > Self::MAX_GRACE_PERIOD_MS {
            return Err(ValidationError::InvalidFieldValue {
                field: "grace_period_ms".to_string(),
                constraint: format!("must be <= {}", Self::MAX_GRACE_PERIOD_MS),
            });
        }

        Ok(())
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period_ms: default_grace_period_ms(),
        }
    }
}

fn default_grace_period_ms() -> u64 {
    ShutdownConfig::DEFAULT_GRACE_PERIOD_MS
}
