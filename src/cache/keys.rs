use std::{fmt, time::Duration};

use chrono::{DateTime, Datelike, TimeZone, Utc};
use uuid::Uuid;

use crate::config::GovernorSettings;

/// Fallback quota TTL when the calendar arithmetic cannot produce a date.
const FALLBACK_QUOTA_TTL: Duration = Duration::from_secs(62 * 86_400);

/// Monthly quota metric tracked per organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuotaMetric {
    Messages,
    Tokens,
}

impl QuotaMetric {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaMetric::Messages => "messages",
            QuotaMetric::Tokens => "tokens",
        }
    }
}

impl fmt::Display for QuotaMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Counter key layout.
///
/// Keys are `ai_rate:<org>:<window>` and `ai_usage:<org>:<YYYY-MM>:<metric>`.
/// With hash tags enabled the org segment becomes `{<org>}` so all counters
/// of one organization hash to the same Redis cluster slot.
#[derive(Debug, Clone)]
pub struct CacheKeys {
    rate_namespace: String,
    usage_namespace: String,
    hash_tags: bool,
}

impl CacheKeys {
    pub fn new(settings: &GovernorSettings) -> Self {
        Self {
            rate_namespace: settings.rate_namespace.clone(),
            usage_namespace: settings.usage_namespace.clone(),
            hash_tags: false,
        }
    }

    pub fn with_hash_tags(mut self, enabled: bool) -> Self {
        self.hash_tags = enabled;
        self
    }

    fn org(&self, org_id: Uuid) -> String {
        if self.hash_tags {
            format!("{{{}}}", org_id)
        } else {
            org_id.to_string()
        }
    }

    /// Rate limiting (requests): ai_rate:<org_id>:<window>
    pub fn rate_limit(&self, org_id: Uuid, window: &str) -> String {
        format!("{}:{}:{}", self.rate_namespace, self.org(org_id), window)
    }

    /// Monthly quota: ai_usage:<org_id>:<YYYY-MM>:<metric>
    pub fn quota(&self, org_id: Uuid, year_month: &str, metric: QuotaMetric) -> String {
        format!(
            "{}:{}:{}:{}",
            self.usage_namespace,
            self.org(org_id),
            year_month,
            metric
        )
    }

    /// Both quota counters for a month, messages first.
    pub fn quota_pair(&self, org_id: Uuid, year_month: &str) -> [String; 2] {
        [
            self.quota(org_id, year_month, QuotaMetric::Messages),
            self.quota(org_id, year_month, QuotaMetric::Tokens),
        ]
    }

    /// Clock-aligned window identifier: the number of whole windows since
    /// the Unix epoch.
    pub fn rate_window(now: DateTime<Utc>, window_secs: u64) -> String {
        let window_secs = window_secs.max(1) as i64;
        now.timestamp().div_euclid(window_secs).to_string()
    }

    /// Seconds until the current clock-aligned window closes.
    pub fn secs_until_window_end(now: DateTime<Utc>, window_secs: u64) -> u64 {
        let window_secs = window_secs.max(1) as i64;
        (window_secs - now.timestamp().rem_euclid(window_secs)) as u64
    }

    /// Calendar month of `now` as `YYYY-MM`.
    pub fn year_month(now: DateTime<Utc>) -> String {
        now.format("%Y-%m").to_string()
    }

    /// TTL for a monthly quota counter: until the end of the month *after*
    /// the current one, so late writes near the boundary still land on a
    /// live key.
    pub fn quota_ttl(now: DateTime<Utc>) -> Duration {
        let month_index = now.year() * 12 + now.month0() as i32 + 2;
        let (year, month) = (month_index.div_euclid(12), month_index.rem_euclid(12) as u32 + 1);

        Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
            .single()
            .and_then(|end| (end - now).to_std().ok())
            .unwrap_or(FALLBACK_QUOTA_TTL)
    }
}
