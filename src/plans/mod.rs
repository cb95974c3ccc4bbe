//! Subscription tier limits.
//!
//! The table is fixed at compile time. A limit of `None` means unlimited,
//! which is distinct from `Some(0)` (nothing allowed).

use crate::models::PlanType;

/// Monthly or per-window allowance. `None` is unlimited.
pub type Limit = Option<u64>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanLimits {
    pub plan: PlanType,
    pub messages_per_month: Limit,
    pub tokens_per_month: Limit,
    pub allowed_models: &'static [&'static str],
    pub max_tokens_per_request: u32,
    pub requests_per_minute: u32,
}

impl PlanLimits {
    pub fn allows_model(&self, model: &str) -> bool {
        self.allowed_models.contains(&model)
    }

    pub fn is_unlimited(&self) -> bool {
        self.messages_per_month.is_none() && self.tokens_per_month.is_none()
    }
}

const ALL_MODELS: &[&str] = &[
    "gemini-2.0-flash",
    "gemini-1.5-flash",
    "gemini-1.5-pro",
    "claude-3-haiku",
    "gpt-4o-mini",
];

static FREE: PlanLimits = PlanLimits {
    plan: PlanType::Free,
    messages_per_month: Some(50),
    tokens_per_month: Some(50_000),
    allowed_models: &["gemini-2.0-flash", "gemini-1.5-flash", "gpt-4o-mini"],
    max_tokens_per_request: 1024,
    requests_per_minute: 5,
};

static PRO: PlanLimits = PlanLimits {
    plan: PlanType::Pro,
    messages_per_month: Some(10_000),
    tokens_per_month: Some(10_000_000),
    allowed_models: ALL_MODELS,
    max_tokens_per_request: 4096,
    requests_per_minute: 60,
};

static TEAM: PlanLimits = PlanLimits {
    plan: PlanType::Team,
    messages_per_month: None,
    tokens_per_month: None,
    allowed_models: ALL_MODELS,
    max_tokens_per_request: 8192,
    requests_per_minute: 300,
};

impl PlanType {
    pub fn limits(&self) -> &'static PlanLimits {
        match self {
            PlanType::Free => &FREE,
            PlanType::Pro => &PRO,
            PlanType::Team => &TEAM,
        }
    }
}
