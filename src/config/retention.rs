//! Data retention configuration.
//!
//! Configures automatic purging of old ledger and request log rows.
//!
//! # Example
//!
//! ```toml
//! [retention]
//! enabled = true
//! interval_hours = 24
//!
//! [retention.periods]
//! daily_usage_days = 90
//! request_log_days = 90
//!
//! [retention.safety]
//! dry_run = false
//! max_deletes_per_run = 100000
//! ```

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Longest accepted retention period (100 years).
pub const MAX_RETENTION_DAYS: u32 = 36_500;

/// Data retention configuration.
///
/// When enabled, a background worker periodically deletes records
/// older than their configured retention period.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetentionConfig {
    /// Whether retention purging is enabled.
    /// Default: false (must be explicitly enabled)
    #[serde(default)]
    pub enabled: bool,

    /// How often to run the retention worker (in hours).
    #[serde(default = "default_interval_hours")]
    pub interval_hours: u64,

    /// Retention periods per table.
    #[serde(default)]
    pub periods: RetentionPeriods,

    /// Safety settings to prevent accidental data loss.
    #[serde(default)]
    pub safety: RetentionSafety,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_hours: default_interval_hours(),
            periods: RetentionPeriods::default(),
            safety: RetentionSafety::default(),
        }
    }
}

fn default_interval_hours() -> u64 {
    24
}

/// Retention periods for the two reporting tables.
///
/// Each field is a number of days. 0 keeps rows forever.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetentionPeriods {
    /// Days to keep daily ledger rows (one per org, model and day).
    #[serde(default = "default_retention_days")]
    pub daily_usage_days: u32,

    /// Days to keep request log rows (one per AI call).
    #[serde(default = "default_retention_days")]
    pub request_log_days: u32,
}

impl Default for RetentionPeriods {
    fn default() -> Self {
        Self {
            daily_usage_days: default_retention_days(),
            request_log_days: default_retention_days(),
        }
    }
}

fn default_retention_days() -> u32 {
    90
}

/// Safety settings for retention operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetentionSafety {
    /// If true, log what would be deleted without deleting.
    #[serde(default)]
    pub dry_run: bool,

    /// Maximum number of rows to delete per run per table.
    /// Set to 0 for unlimited.
    #[serde(default = "default_max_deletes_per_run")]
    pub max_deletes_per_run: u64,

    /// Rows deleted per statement.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
}

impl Default for RetentionSafety {
    fn default() -> Self {
        Self {
            dry_run: false,
            max_deletes_per_run: default_max_deletes_per_run(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_max_deletes_per_run() -> u64 {
    100_000
}

fn default_batch_size() -> u32 {
    1000
}

impl RetentionConfig {
    /// Check if any retention periods are configured (non-zero).
    pub fn has_any_retention(&self) -> bool {
        self.periods.should_retain_daily_usage() || self.periods.should_retain_request_log()
    }

    /// Get the interval as a Duration.
    pub fn interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.interval_hours * 3600)
    }

    /// Upper bound on rows deleted per table in one run.
    pub fn max_deletes(&self) -> u64 {
        if self.safety.max_deletes_per_run == 0 {
            u64::MAX
        } else {
            self.safety.max_deletes_per_run
        }
    }
}

impl RetentionPeriods {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, days) in [
            ("daily_usage_days", self.daily_usage_days),
            ("request_log_days", self.request_log_days),
        ] {
            if days > MAX_RETENTION_DAYS {
                return Err(ConfigError::Validation(format!(
                    "retention.periods.{} must be at most {} (got {})",
                    name, MAX_RETENTION_DAYS, days
                )));
            }
        }
        Ok(())
    }

    pub fn should_retain_daily_usage(&self) -> bool {
        self.daily_usage_days > 0
    }

    pub fn should_retain_request_log(&self) -> bool {
        self.request_log_days > 0
    }
}
