//! Model catalog and cost estimation.
//!
//! Prices are USD per 1,000 tokens, held as exact decimals. Estimated costs
//! are whole cents, rounded down.

use std::sync::LazyLock;

use rust_decimal::{Decimal, dec, prelude::ToPrimitive};
use serde::Serialize;

/// Catalog entry for a callable model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelInfo {
    pub id: &'static str,
    pub provider: &'static str,
    pub name: &'static str,
    pub max_tokens: u32,
    /// USD per 1k input tokens
    pub input_per_1k: Decimal,
    /// USD per 1k output tokens
    pub output_per_1k: Decimal,
}

static MODELS: LazyLock<Vec<ModelInfo>> = LazyLock::new(|| {
    vec![
        ModelInfo {
            id: "gemini-2.0-flash",
            provider: "google",
            name: "Gemini 2.0 Flash",
            max_tokens: 8192,
            input_per_1k: dec!(0.00035),
            output_per_1k: dec!(0.00105),
        },
        ModelInfo {
            id: "gemini-1.5-flash",
            provider: "google",
            name: "Gemini 1.5 Flash",
            max_tokens: 8192,
            input_per_1k: dec!(0.00035),
            output_per_1k: dec!(0.00105),
        },
        ModelInfo {
            id: "gemini-1.5-pro",
            provider: "google",
            name: "Gemini 1.5 Pro",
            max_tokens: 8192,
            input_per_1k: dec!(0.00125),
            output_per_1k: dec!(0.00375),
        },
        ModelInfo {
            id: "claude-3-haiku",
            provider: "anthropic",
            name: "Claude 3 Haiku",
            max_tokens: 4096,
            input_per_1k: dec!(0.00025),
            output_per_1k: dec!(0.00125),
        },
        ModelInfo {
            id: "gpt-4o-mini",
            provider: "openai",
            name: "GPT-4o Mini",
            max_tokens: 16384,
            input_per_1k: dec!(0.00015),
            output_per_1k: dec!(0.00060),
        },
    ]
});

/// All catalog entries in table order.
pub fn models() -> &'static [ModelInfo] {
    &MODELS
}

pub fn lookup(model: &str) -> Option<&'static ModelInfo> {
    MODELS.iter().find(|m| m.id == model)
}

impl ModelInfo {
    /// Exact cost in USD.
    pub fn cost_usd(&self, input_tokens: u64, output_tokens: u64) -> Decimal {
        let thousand = Decimal::from(1000);
        Decimal::from(input_tokens) / thousand * self.input_per_1k
            + Decimal::from(output_tokens) / thousand * self.output_per_1k
    }

    /// Cost in whole cents, rounded down.
    pub fn cost_cents(&self, input_tokens: u64, output_tokens: u64) -> i64 {
        (self.cost_usd(input_tokens, output_tokens) * Decimal::ONE_HUNDRED)
            .floor()
            .to_i64()
            .unwrap_or(i64::MAX)
    }
}

/// Estimated cost of a call in whole cents. Unknown models cost nothing.
pub fn cost_cents(model: &str, input_tokens: u64, output_tokens: u64) -> i64 {
    lookup(model)
        .map(|info| info.cost_cents(input_tokens, output_tokens))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("claude-3-haiku", 1000, 1000, 0)]
    #[case("claude-3-haiku", 10_000, 10_000, 1)]
    #[case("gemini-1.5-pro", 100_000, 100_000, 50)]
    #[case("gpt-4o-mini", 0, 0, 0)]
    #[case("gpt-4o-mini", 1_000_000, 1_000_000, 75)]
    #[case("unknown-model", 1_000_000, 1_000_000, 0)]
    fn test_cost_cents(
        #[case] model: &str,
        #[case] input: u64,
        #[case] output: u64,
        #[case] expected: i64,
    ) {
        assert_eq!(cost_cents(model, input, output), expected);
    }

    #[test]
    fn test_cost_usd_is_exact() {
        let haiku = lookup("claude-3-haiku").unwrap();
        assert_eq!(haiku.cost_usd(1000, 1000), dec!(0.0015));
    }

    #[test]
    fn test_lookup() {
        let info = lookup("gpt-4o-mini").unwrap();
        assert_eq!(info.provider, "openai");
        assert_eq!(info.name, "GPT-4o Mini");
        assert_eq!(info.max_tokens, 16384);
        assert!(lookup("gpt-5").is_none());
    }

    #[test]
    fn test_model_ids_are_unique() {
        let mut ids: Vec<_> = models().iter().map(|m| m.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), models().len());
    }
}
