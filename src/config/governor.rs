use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Counter layout and window sizes for the usage governor.
///
/// ```toml
/// [governor]
/// rate_namespace = "ai_rate"
/// usage_namespace = "ai_usage"
/// rate_window_secs = 60
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GovernorSettings {
    /// Namespace of the per-minute rate counters: `<ns>:<org>:<window>`.
    #[serde(default = "default_rate_namespace")]
    pub rate_namespace: String,

    /// Namespace of the monthly quota counters: `<ns>:<org>:<YYYY-MM>:<metric>`.
    #[serde(default = "default_usage_namespace")]
    pub usage_namespace: String,

    /// Length of a rate window in seconds. Plan rate limits are expressed
    /// per window.
    #[serde(default = "default_rate_window_secs")]
    pub rate_window_secs: u64,
}

impl Default for GovernorSettings {
    fn default() -> Self {
        Self {
            rate_namespace: default_rate_namespace(),
            usage_namespace: default_usage_namespace(),
            rate_window_secs: default_rate_window_secs(),
        }
    }
}

impl GovernorSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_window_secs == 0 {
            return Err(ConfigError::Validation(
                "governor.rate_window_secs must be greater than 0".into(),
            ));
        }
        for (name, ns) in [
            ("rate_namespace", &self.rate_namespace),
            ("usage_namespace", &self.usage_namespace),
        ] {
            if ns.is_empty() || ns.contains(':') {
                return Err(ConfigError::Validation(format!(
                    "governor.{} must be non-empty and must not contain ':'",
                    name
                )));
            }
        }
        if self.rate_namespace == self.usage_namespace {
            return Err(ConfigError::Validation(
                "governor.rate_namespace and governor.usage_namespace must differ".into(),
            ));
        }
        Ok(())
    }
}

fn default_rate_namespace() -> String {
    "ai_rate".to_string()
}

fn default_usage_namespace() -> String {
    "ai_usage".to_string()
}

fn default_rate_window_secs() -> u64 {
    60
}
