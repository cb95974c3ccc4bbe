use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::PlanType;

/// Outcome of an upstream AI call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallStatus {
    Success,
    Error(String),
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Success => "success",
            CallStatus::Error(_) => "error",
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, CallStatus::Success)
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            CallStatus::Success => None,
            CallStatus::Error(message) => Some(message),
        }
    }

    /// Rebuild from the stored `status` and `error_message` columns.
    pub fn from_parts(status: &str, error_message: Option<String>) -> Self {
        match status {
            "success" => CallStatus::Success,
            _ => CallStatus::Error(error_message.unwrap_or_default()),
        }
    }
}

/// One row of the daily usage ledger: aggregate consumption of a model by an
/// organization on a calendar day (UTC).
#[derive(Debug, Clone, Serialize)]
pub struct DailyUsage {
    pub id: i64,
    pub org_id: Uuid,
    pub model: String,
    pub date: NaiveDate,
    pub message_count: i64,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
    pub estimated_cost_cents: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Additive change applied to a ledger row; the row is created on first use.
#[derive(Debug, Clone)]
pub struct DailyUsageDelta {
    pub org_id: Uuid,
    pub model: String,
    pub date: NaiveDate,
    pub messages: i64,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cost_cents: i64,
}

/// Append-only record of a single AI call attempt.
#[derive(Debug, Clone)]
pub struct NewRequestLog {
    pub org_id: Uuid,
    pub user_id: Option<Uuid>,
    pub model: String,
    pub prompt_length: i64,
    pub response_length: i64,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub duration_ms: i64,
    pub status: CallStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct RequestLogEntry {
    pub id: i64,
    pub org_id: Uuid,
    pub user_id: Option<Uuid>,
    pub model: String,
    pub prompt_length: i64,
    pub response_length: i64,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub total_tokens: i64,
    pub duration_ms: i64,
    pub status: CallStatus,
    pub created_at: DateTime<Utc>,
}

/// Ledger consumption of one model over a date range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelUsage {
    pub model: String,
    pub message_count: i64,
    pub total_tokens: i64,
    pub estimated_cost_cents: i64,
}

/// Ledger totals over a date range.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerTotals {
    pub message_count: i64,
    pub total_tokens: i64,
    pub estimated_cost_cents: i64,
}

impl LedgerTotals {
    pub fn from_models(models: &[ModelUsage]) -> Self {
        models.iter().fold(Self::default(), |acc, m| Self {
            message_count: acc.message_count.saturating_add(m.message_count),
            total_tokens: acc.total_tokens.saturating_add(m.total_tokens),
            estimated_cost_cents: acc
                .estimated_cost_cents
                .saturating_add(m.estimated_cost_cents),
        })
    }
}

/// Current-month usage of an organization.
///
/// Counters come from the counter store; totals and the per-model breakdown
/// come from the ledger. The two may briefly disagree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSummary {
    pub org_id: Uuid,
    pub plan: PlanType,
    /// Calendar month as `YYYY-MM`
    pub period: String,
    pub current_messages: u64,
    pub current_tokens: u64,
    /// `None` means unlimited
    pub messages_limit: Option<u64>,
    /// `None` means unlimited
    pub tokens_limit: Option<u64>,
    /// Message quota used, in percent with two decimals (0 when unlimited)
    pub usage_percentage: f64,
    pub totals: LedgerTotals,
    pub by_model: Vec<ModelUsage>,
}

/// A model an organization's plan may call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableModel {
    pub id: String,
    pub name: String,
    pub provider: String,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableModels {
    pub plan: PlanType,
    pub models: Vec<AvailableModel>,
}
