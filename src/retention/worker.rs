use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::{
    config::RetentionConfig,
    db::{DbError, DbPool, DbResult},
    observability::metrics,
};

/// Results from a single retention run.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct RetentionRunResult {
    /// Number of daily ledger rows deleted.
    pub daily_usage_deleted: u64,
    /// Number of request log entries deleted.
    pub request_log_deleted: u64,
}

impl RetentionRunResult {
    /// Total number of records deleted across all tables.
    pub fn total(&self) -> u64 {
        self.daily_usage_deleted + self.request_log_deleted
    }

    pub fn has_deletions(&self) -> bool {
        self.total() > 0
    }
}

/// Starts the retention worker as a background task.
///
/// Runs until the task is cancelled.
pub async fn start_retention_worker(db: Arc<DbPool>, config: RetentionConfig) {
    if !config.enabled {
        tracing::info!("Retention worker disabled by configuration");
        return;
    }

    if !config.has_any_retention() {
        tracing::info!("Retention worker enabled but no retention periods configured");
        return;
    }

    let dry_run_msg = if config.safety.dry_run {
        " (DRY RUN)"
    } else {
        ""
    };

    tracing::info!(
        interval_hours = config.interval_hours,
        daily_usage_days = config.periods.daily_usage_days,
        request_log_days = config.periods.request_log_days,
        dry_run = config.safety.dry_run,
        "Starting retention worker{}",
        dry_run_msg
    );

    let interval = config.interval();

    loop {
        match run_retention(&db, &config).await {
            Ok(result) if result.has_deletions() => {
                tracing::info!(
                    daily_usage = result.daily_usage_deleted,
                    request_log = result.request_log_deleted,
                    total = result.total(),
                    "Retention run complete{}",
                    dry_run_msg
                );
            }
            Ok(_) => tracing::debug!("Retention run complete, no records to delete"),
            Err(e) => tracing::error!(error = %e, "Error running retention"),
        }

        tokio::time::sleep(interval).await;
    }
}

/// Run a single retention pass over both reporting tables.
pub async fn run_retention(db: &DbPool, config: &RetentionConfig) -> DbResult<RetentionRunResult> {
    run_retention_at(db, config, Utc::now()).await
}

pub async fn run_retention_at(
    db: &DbPool,
    config: &RetentionConfig,
    now: DateTime<Utc>,
) -> DbResult<RetentionRunResult> {
    let mut result = RetentionRunResult::default();

    if config.periods.should_retain_daily_usage() {
        result.daily_usage_deleted = delete_daily_usage(db, config, now).await?;
    }

    if config.periods.should_retain_request_log() {
        result.request_log_deleted = delete_request_logs(db, config, now).await?;
    }

    Ok(result)
}

/// `now` minus a retention period, or an error when the result falls
/// outside chrono's date range.
fn retention_cutoff(now: DateTime<Utc>, days: u32) -> DbResult<DateTime<Utc>> {
    Duration::try_days(i64::from(days))
        .and_then(|period| now.checked_sub_signed(period))
        .ok_or_else(|| {
            DbError::Internal(format!("Retention period of {} days is out of range", days))
        })
}

/// Delete ledger rows dated before the retention cutoff day.
async fn delete_daily_usage(
    db: &DbPool,
    config: &RetentionConfig,
    now: DateTime<Utc>,
) -> DbResult<u64> {
    let cutoff = retention_cutoff(now, config.periods.daily_usage_days)?.date_naive();

    if config.safety.dry_run {
        tracing::info!(%cutoff, "DRY RUN: Would delete daily usage rows before {}", cutoff);
        return Ok(0);
    }

    let deleted = db
        .usage()
        .delete_daily_usage_before(cutoff, config.safety.batch_size, config.max_deletes())
        .await?;

    if deleted > 0 {
        tracing::debug!(deleted, %cutoff, "Deleted daily usage rows");
        metrics::record_retention_deletion("ai_daily_usage", deleted);
    }

    Ok(deleted)
}

/// Delete request log entries older than the retention period.
async fn delete_request_logs(
    db: &DbPool,
    config: &RetentionConfig,
    now: DateTime<Utc>,
) -> DbResult<u64> {
    let cutoff = retention_cutoff(now, config.periods.request_log_days)?;

    if config.safety.dry_run {
        tracing::info!(%cutoff, "DRY RUN: Would delete request log entries before {}", cutoff);
        return Ok(0);
    }

    let deleted = db
        .usage()
        .delete_request_logs_before(cutoff, config.safety.batch_size, config.max_deletes())
        .await?;

    if deleted > 0 {
        tracing::debug!(deleted, %cutoff, "Deleted request log entries");
        metrics::record_retention_deletion("ai_request_log", deleted);
    }

    Ok(deleted)
}
