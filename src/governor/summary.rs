use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::{GovernorError, UsageGovernor};
use crate::{
    cache::CacheKeys,
    db::DateRange,
    models::{AvailableModel, AvailableModels, LedgerTotals, PlanType, UsageSummary},
    pricing,
};

/// Percentage of `limit` used, rounded to two decimals. Zero when unlimited.
fn usage_percentage(current: u64, limit: Option<u64>) -> f64 {
    match limit {
        Some(limit) if limit > 0 => {
            let pct = current as f64 / limit as f64 * 100.0;
            (pct * 100.0).round() / 100.0
        }
        _ => 0.0,
    }
}

impl UsageGovernor {
    /// Plan used for reporting. Organizations without a subscription are
    /// reported against Free regardless of status.
    async fn reporting_plan(&self, org_id: Uuid) -> Result<PlanType, GovernorError> {
        Ok(self
            .subscriptions
            .get_by_org(org_id)
            .await?
            .map(|s| s.plan)
            .unwrap_or(PlanType::Free))
    }

    /// Current-month usage of an organization. Read-only.
    pub async fn usage_summary(&self, org_id: Uuid) -> Result<UsageSummary, GovernorError> {
        self.usage_summary_at(org_id, Utc::now()).await
    }

    pub async fn usage_summary_at(
        &self,
        org_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<UsageSummary, GovernorError> {
        let plan = self.reporting_plan(org_id).await?;
        let limits = plan.limits();
        let period = CacheKeys::year_month(now);

        let counters = self
            .cache
            .get_counters(&self.keys.quota_pair(org_id, &period))
            .await?;
        let current = |i: usize| counters.get(i).copied().unwrap_or(0).max(0) as u64;
        let (current_messages, current_tokens) = (current(0), current(1));

        let by_model = self
            .usage
            .get_model_usage(org_id, DateRange::month_of(now.date_naive()))
            .await?;

        Ok(UsageSummary {
            org_id,
            plan,
            period,
            current_messages,
            current_tokens,
            messages_limit: limits.messages_per_month,
            tokens_limit: limits.tokens_per_month,
            usage_percentage: usage_percentage(current_messages, limits.messages_per_month),
            totals: LedgerTotals::from_models(&by_model),
            by_model,
        })
    }

    /// Models the organization's plan may call, with their catalog details.
    pub async fn available_models(&self, org_id: Uuid) -> Result<AvailableModels, GovernorError> {
        let plan = self.reporting_plan(org_id).await?;
        let models = plan
            .limits()
            .allowed_models
            .iter()
            .filter_map(|id| pricing::lookup(id))
            .map(|info| AvailableModel {
                id: info.id.to_string(),
                name: info.name.to_string(),
                provider: info.provider.to_string(),
                max_tokens: info.max_tokens,
            })
            .collect();

        Ok(AvailableModels { plan, models })
    }
}
