use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{GovernorError, UsageGovernor};
use crate::{
    cache::{CacheKeys, QuotaMetric},
    models::{CallStatus, DailyUsageDelta, NewRequestLog},
    observability::metrics,
    pricing,
};

/// What happened on a completed upstream call.
#[derive(Debug, Clone)]
pub struct CallOutcome {
    pub org_id: Uuid,
    pub user_id: Option<Uuid>,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub prompt_length: u64,
    pub response_length: u64,
    pub duration_ms: u64,
    pub status: CallStatus,
}

impl CallOutcome {
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// Counter values after recording a call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedUsage {
    pub current_messages: u64,
    pub current_tokens: u64,
    pub cost_cents: i64,
}

fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

impl UsageGovernor {
    /// Account for a completed call.
    ///
    /// A successful call increments both monthly counters, adds to the daily
    /// ledger and appends a request log entry. A failed call only appends a
    /// log entry with zero tokens. Counter failures are returned; ledger and
    /// log failures are logged and swallowed, since the counters already
    /// reflect the call.
    pub async fn record_usage(&self, outcome: CallOutcome) -> Result<RecordedUsage, GovernorError> {
        self.record_usage_at(outcome, Utc::now()).await
    }

    #[tracing::instrument(
        skip(self, outcome, now),
        fields(org_id = %outcome.org_id, model = %outcome.model, status = outcome.status.as_str())
    )]
    pub async fn record_usage_at(
        &self,
        outcome: CallOutcome,
        now: DateTime<Utc>,
    ) -> Result<RecordedUsage, GovernorError> {
        let year_month = CacheKeys::year_month(now);

        let recorded = if outcome.status.is_success() {
            let cost_cents =
                pricing::cost_cents(&outcome.model, outcome.input_tokens, outcome.output_tokens);
            let ttl = CacheKeys::quota_ttl(now);

            let current_messages = self
                .cache
                .incr_by(
                    &self.keys.quota(outcome.org_id, &year_month, QuotaMetric::Messages),
                    1,
                    ttl,
                )
                .await?;
            let current_tokens = self
                .cache
                .incr_by(
                    &self.keys.quota(outcome.org_id, &year_month, QuotaMetric::Tokens),
                    to_i64(outcome.total_tokens()),
                    ttl,
                )
                .await?;

            metrics::record_tokens(
                &outcome.model,
                outcome.input_tokens,
                outcome.output_tokens,
                cost_cents,
            );

            let delta = DailyUsageDelta {
                org_id: outcome.org_id,
                model: outcome.model.clone(),
                date: now.date_naive(),
                messages: 1,
                input_tokens: to_i64(outcome.input_tokens),
                output_tokens: to_i64(outcome.output_tokens),
                cost_cents,
            };
            if let Err(e) = self.usage.upsert_daily_usage(delta).await {
                tracing::error!(error = %e, "Failed to update daily usage ledger");
                metrics::record_secondary_write_failure("ai_daily_usage");
            }

            RecordedUsage {
                current_messages: current_messages.max(0) as u64,
                current_tokens: current_tokens.max(0) as u64,
                cost_cents,
            }
        } else {
            metrics::record_failed_call(&outcome.model);
            let counters = self
                .cache
                .get_counters(&self.keys.quota_pair(outcome.org_id, &year_month))
                .await?;
            let current = |i: usize| counters.get(i).copied().unwrap_or(0).max(0) as u64;

            RecordedUsage {
                current_messages: current(0),
                current_tokens: current(1),
                cost_cents: 0,
            }
        };

        let (input_tokens, output_tokens) = if outcome.status.is_success() {
            (to_i64(outcome.input_tokens), to_i64(outcome.output_tokens))
        } else {
            (0, 0)
        };
        let entry = NewRequestLog {
            org_id: outcome.org_id,
            user_id: outcome.user_id,
            model: outcome.model,
            prompt_length: to_i64(outcome.prompt_length),
            response_length: to_i64(outcome.response_length),
            input_tokens,
            output_tokens,
            duration_ms: to_i64(outcome.duration_ms),
            status: outcome.status,
            created_at: now,
        };
        if let Err(e) = self.usage.log_request(entry).await {
            tracing::error!(error = %e, "Failed to write request log");
            metrics::record_secondary_write_failure("ai_request_log");
        }

        tracing::debug!(
            current_messages = recorded.current_messages,
            current_tokens = recorded.current_tokens,
            cost_cents = recorded.cost_cents,
            "Recorded AI usage"
        );

        Ok(recorded)
    }
}
