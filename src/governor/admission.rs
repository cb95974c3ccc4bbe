use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::{GovernorError, UsageGovernor};
use crate::{
    cache::{CacheKeys, QuotaMetric},
    models::PlanType,
    observability::metrics,
    plans::{Limit, PlanLimits},
};

/// Monthly quota position at admission time. `None` limits are unlimited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuotaUsage {
    pub current_messages: u64,
    pub current_tokens: u64,
    pub messages_limit: Limit,
    pub tokens_limit: Limit,
    pub messages_remaining: Option<u64>,
    pub tokens_remaining: Option<u64>,
}

impl QuotaUsage {
    fn new(limits: &PlanLimits, current_messages: u64, current_tokens: u64) -> Self {
        Self {
            current_messages,
            current_tokens,
            messages_limit: limits.messages_per_month,
            tokens_limit: limits.tokens_per_month,
            messages_remaining: limits
                .messages_per_month
                .map(|l| l.saturating_sub(current_messages)),
            tokens_remaining: limits
                .tokens_per_month
                .map(|l| l.saturating_sub(current_tokens)),
        }
    }

    /// The first exhausted counter, messages before tokens.
    fn exhausted(&self) -> Option<QuotaMetric> {
        let over = |limit: Limit, current: u64| limit.is_some_and(|l| current >= l);

        if over(self.messages_limit, self.current_messages) {
            Some(QuotaMetric::Messages)
        } else if over(self.tokens_limit, self.current_tokens) {
            Some(QuotaMetric::Tokens)
        } else {
            None
        }
    }
}

/// A granted admission. The call may proceed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Admission {
    pub plan: PlanType,
    pub rate_limit_remaining: u32,
    pub usage: QuotaUsage,
}

impl UsageGovernor {
    /// Decide whether `org_id` may call `model` with a budget of `max_tokens`.
    ///
    /// Checks run in order: subscription, model allow-list, token ceiling,
    /// per-minute rate, monthly quota. An admitted call consumes one slot of
    /// the current rate window; later rejections do not refund it.
    pub async fn check_admission(
        &self,
        org_id: Uuid,
        model: &str,
        max_tokens: u32,
    ) -> Result<Admission, GovernorError> {
        self.check_admission_at(org_id, model, max_tokens, Utc::now())
            .await
    }

    #[tracing::instrument(skip(self, now), fields(plan = tracing::field::Empty))]
    pub async fn check_admission_at(
        &self,
        org_id: Uuid,
        model: &str,
        max_tokens: u32,
        now: DateTime<Utc>,
    ) -> Result<Admission, GovernorError> {
        let result = self.evaluate(org_id, model, max_tokens, now).await;

        match &result {
            Ok(admission) => {
                tracing::Span::current().record("plan", admission.plan.as_str());
                metrics::record_admission("allowed", Some(admission.plan.as_str()));
            }
            Err(e) if e.is_rejection() => {
                tracing::info!(code = e.code(), "AI call rejected: {}", e);
                metrics::record_admission(e.code(), None);
            }
            Err(e) => {
                tracing::error!(error = %e, "Admission check failed");
                metrics::record_admission("error", None);
            }
        }

        result
    }

    async fn evaluate(
        &self,
        org_id: Uuid,
        model: &str,
        max_tokens: u32,
        now: DateTime<Utc>,
    ) -> Result<Admission, GovernorError> {
        let plan = match self.subscriptions.get_by_org(org_id).await? {
            Some(subscription) if subscription.admits_calls() => subscription.plan,
            _ => return Err(GovernorError::PlanRequired),
        };
        let limits = plan.limits();

        if !limits.allows_model(model) {
            return Err(GovernorError::ForbiddenModel {
                model: model.to_string(),
                plan,
            });
        }

        if max_tokens > limits.max_tokens_per_request {
            return Err(GovernorError::RequestTooLarge {
                requested: max_tokens,
                max: limits.max_tokens_per_request,
                plan,
            });
        }

        let window = CacheKeys::rate_window(now, self.window_secs);
        let rate_key = self.keys.rate_limit(org_id, &window);
        let rate = self
            .cache
            .check_and_incr_rate_limit(&rate_key, limits.requests_per_minute, self.window_secs)
            .await?;

        if !rate.allowed {
            metrics::record_rate_limit("limited", self.cache.backend());
            let retry_after = rate
                .reset_secs
                .min(CacheKeys::secs_until_window_end(now, self.window_secs))
                .max(1);
            return Err(GovernorError::RateLimited {
                limit: limits.requests_per_minute,
                current: rate.current,
                retry_after,
            });
        }
        metrics::record_rate_limit("allowed", self.cache.backend());

        let year_month = CacheKeys::year_month(now);
        let counters = self
            .cache
            .get_counters(&self.keys.quota_pair(org_id, &year_month))
            .await?;
        let current = |i: usize| counters.get(i).copied().unwrap_or(0).max(0) as u64;
        let usage = QuotaUsage::new(limits, current(0), current(1));

        if let Some(metric) = usage.exhausted() {
            return Err(GovernorError::QuotaExceeded {
                plan,
                metric,
                current_messages: usage.current_messages,
                current_tokens: usage.current_tokens,
            });
        }

        Ok(Admission {
            plan,
            rate_limit_remaining: rate.remaining(),
            usage,
        })
    }
}
