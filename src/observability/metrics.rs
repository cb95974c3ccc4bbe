//! Prometheus metrics for the governor.
//!
//! Provides metrics for:
//! - Admission decisions by outcome
//! - Rate limit checks
//! - Recorded token usage
//! - Failed ledger and request log writes
//! - Retention deletions
//!
//! Every recording function compiles to a no-op without the `prometheus` feature.

#[cfg(feature = "prometheus")]
use std::sync::OnceLock;

#[cfg(feature = "prometheus")]
use metrics::{counter, histogram};
#[cfg(feature = "prometheus")]
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::config::MetricsConfig;

/// Global Prometheus handle for the metrics endpoint.
#[cfg(feature = "prometheus")]
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the metrics system with the given configuration.
#[cfg(feature = "prometheus")]
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if !config.enabled {
        return Ok(());
    }

    let builder = PrometheusBuilder::new()
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Suffix("_tokens".to_string()),
            &config.token_buckets,
        )
        .map_err(|e| MetricsError::Setup(e.to_string()))?;

    let handle = builder.install_recorder().map_err(MetricsError::Install)?;

    PROMETHEUS_HANDLE
        .set(handle)
        .map_err(|_| MetricsError::Setup("Metrics already initialized".to_string()))?;

    Ok(())
}

/// Initialize the metrics system (no-op without prometheus feature).
#[cfg(not(feature = "prometheus"))]
pub fn init_metrics(_config: &MetricsConfig) -> Result<(), MetricsError> {
    Ok(())
}

/// Get the Prometheus handle for rendering metrics.
#[cfg(feature = "prometheus")]
pub fn get_prometheus_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

// ─────────────────────────────────────────────────────────────────────────────
// Metric Recording Functions
// ─────────────────────────────────────────────────────────────────────────────

/// Record an admission decision.
///
/// `outcome` is `allowed` or the machine code of the rejection
/// (`plan_required`, `model_not_allowed`, `rate_limit_exceeded`, ...).
pub fn record_admission(outcome: &str, plan: Option<&str>) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "governor_admissions_total",
            "outcome" => outcome.to_string(),
            "plan" => plan.unwrap_or("none").to_string()
        )
        .increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (outcome, plan);
    }
}

/// Record rate limit check.
pub fn record_rate_limit(result: &str, backend: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "rate_limit_checks_total",
            "result" => result.to_string(),
            "backend" => backend.to_string()
        )
        .increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (result, backend);
    }
}

/// Record tokens consumed by a successful call.
pub fn record_tokens(model: &str, input_tokens: u64, output_tokens: u64, cost_cents: i64) {
    #[cfg(feature = "prometheus")]
    {
        counter!("governor_recorded_calls_total", "model" => model.to_string()).increment(1);
        histogram!("governor_input_tokens", "model" => model.to_string())
            .record(input_tokens as f64);
        histogram!("governor_output_tokens", "model" => model.to_string())
            .record(output_tokens as f64);
        if cost_cents > 0 {
            counter!("governor_estimated_cost_cents_total", "model" => model.to_string())
                .increment(cost_cents as u64);
        }
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (model, input_tokens, output_tokens, cost_cents);
    }
}

/// Record a failed call (nothing is charged).
pub fn record_failed_call(model: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!("governor_failed_calls_total", "model" => model.to_string()).increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = model;
    }
}

/// Record a ledger or request log write that failed after the counters were
/// already updated.
///
/// # Arguments
/// * `table` - `ai_daily_usage` or `ai_request_log`
pub fn record_secondary_write_failure(table: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!("governor_secondary_write_failures_total", "table" => table.to_string())
            .increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = table;
    }
}

/// Record data retention deletion.
///
/// # Arguments
/// * `table` - The table from which records were deleted (`ai_daily_usage`, `ai_request_log`)
/// * `count` - The number of records deleted
pub fn record_retention_deletion(table: &str, count: u64) {
    #[cfg(feature = "prometheus")]
    {
        counter!(
            "retention_deletions_total",
            "table" => table.to_string()
        )
        .increment(count);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (table, count);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Failed to set up metrics: {0}")]
    Setup(String),

    #[cfg(feature = "prometheus")]
    #[error("Failed to install metrics recorder: {0}")]
    Install(#[from] metrics_exporter_prometheus::BuildError),
}
