use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

use super::DateRange;
use crate::{
    db::error::DbResult,
    models::{DailyUsage, DailyUsageDelta, ModelUsage, NewRequestLog, RequestLogEntry},
};

#[async_trait]
pub trait UsageRepo: Send + Sync {
    /// Add a delta to the ledger row for (org, model, date), creating the row
    /// if it does not exist yet.
    async fn upsert_daily_usage(&self, delta: DailyUsageDelta) -> DbResult<()>;

    /// Append a request log entry.
    async fn log_request(&self, entry: NewRequestLog) -> DbResult<()>;

    /// Ledger rows for an organization, newest day first.
    async fn get_daily_usage(&self, org_id: Uuid, range: DateRange) -> DbResult<Vec<DailyUsage>>;

    /// Ledger consumption per model, highest cost first.
    async fn get_model_usage(&self, org_id: Uuid, range: DateRange) -> DbResult<Vec<ModelUsage>>;

    /// Most recent request log entries for an organization, newest first.
    async fn list_request_logs(&self, org_id: Uuid, limit: i64)
    -> DbResult<Vec<RequestLogEntry>>;

    // ==================== Retention Operations ====================

    /// Delete ledger rows dated before `cutoff`.
    ///
    /// Deletes in batches to avoid locking the database.
    /// Returns the total number of rows deleted.
    async fn delete_daily_usage_before(
        &self,
        cutoff: NaiveDate,
        batch_size: u32,
        max_deletes: u64,
    ) -> DbResult<u64>;

    /// Delete request log entries created before `cutoff`.
    ///
    /// Deletes in batches to avoid locking the database.
    /// Returns the total number of rows deleted.
    async fn delete_request_logs_before(
        &self,
        cutoff: DateTime<Utc>,
        batch_size: u32,
        max_deletes: u64,
    ) -> DbResult<u64>;
}
