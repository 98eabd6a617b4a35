//! Retention policy definitions.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Default maximum age of stored values (7 days).
pub const DEFAULT_MAX_STORAGE_HOURS: u64 = 7 * 24;

/// Default time between retention sweeps (1 hour).
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60 * 60;

/// Upper bound for the window, far beyond any representable timestamp.
const MAX_WINDOW_HOURS: u64 = 1_000_000 * 366 * 24;

/// Retention policy for the value tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Rows older than this are deleted
    #[serde(default = "default_max_storage_hours")]
    pub max_storage_hours: u64,
    /// How often the sweeper runs
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

fn default_max_storage_hours() -> u64 {
    DEFAULT_MAX_STORAGE_HOURS
}

fn default_sweep_interval_secs() -> u64 {
    DEFAULT_SWEEP_INTERVAL_SECS
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_storage_hours: default_max_storage_hours(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl RetentionPolicy {
    pub fn from_hours(max_storage_hours: u64) -> Self {
        Self {
            max_storage_hours,
            ..Self::default()
        }
    }

    /// The retention window as a duration.
    pub fn window(&self) -> Duration {
        Duration::hours(self.max_storage_hours.min(MAX_WINDOW_HOURS) as i64)
    }

    /// Timestamp before which rows are expired.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.window())
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    pub fn sweep_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}
