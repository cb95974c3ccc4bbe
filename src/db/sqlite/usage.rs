use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::common::parse_uuid;
use crate::{
    db::{
        error::DbResult,
        repos::{DateRange, UsageRepo},
    },
    models::{
        CallStatus, DailyUsage, DailyUsageDelta, ModelUsage, NewRequestLog, RequestLogEntry,
    },
};

pub struct SqliteUsageRepo {
    pool: SqlitePool,
}

impl SqliteUsageRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Run `delete_sql` (bound to the cutoff and a LIMIT) until a batch comes
    /// back short or `max_deletes` is reached.
    /// SQLite doesn't support LIMIT in DELETE directly, so ids come from a subquery.
    async fn delete_in_batches<T>(
        &self,
        delete_sql: &str,
        cutoff: T,
        batch_size: u32,
        max_deletes: u64,
    ) -> DbResult<u64>
    where
        T: for<'q> sqlx::Encode<'q, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite> + Clone + Send + 'static,
    {
        let mut total_deleted: u64 = 0;

        loop {
            if total_deleted >= max_deletes {
                break;
            }

            let remaining = max_deletes - total_deleted;
            let limit = std::cmp::min(batch_size as u64, remaining) as i64;

            let result = sqlx::query(delete_sql)
                .bind(cutoff.clone())
                .bind(limit)
                .execute(&self.pool)
                .await?;

            let rows_deleted = result.rows_affected();
            total_deleted += rows_deleted;

            // Fewer rows than the batch size means nothing is left
            if rows_deleted < limit as u64 {
                break;
            }
        }

        Ok(total_deleted)
    }
}

#[async_trait]
impl UsageRepo for SqliteUsageRepo {
    async fn upsert_daily_usage(&self, delta: DailyUsageDelta) -> DbResult<()> {
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO ai_daily_usage (
                org_id, model, date, message_count, input_tokens, output_tokens,
                total_tokens, estimated_cost_cents, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (org_id, model, date) DO UPDATE SET
                message_count = ai_daily_usage.message_count + excluded.message_count,
                input_tokens = ai_daily_usage.input_tokens + excluded.input_tokens,
                output_tokens = ai_daily_usage.output_tokens + excluded.output_tokens,
                total_tokens = ai_daily_usage.total_tokens + excluded.total_tokens,
                estimated_cost_cents = ai_daily_usage.estimated_cost_cents + excluded.estimated_cost_cents,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(delta.org_id.to_string())
        .bind(&delta.model)
        .bind(delta.date)
        .bind(delta.messages)
        .bind(delta.input_tokens)
        .bind(delta.output_tokens)
        .bind(delta.input_tokens.saturating_add(delta.output_tokens))
        .bind(delta.cost_cents)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn log_request(&self, entry: NewRequestLog) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO ai_request_log (
                org_id, user_id, model, prompt_length, response_length,
                input_tokens, output_tokens, total_tokens, duration_ms,
                status, error_message, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(entry.org_id.to_string())
        .bind(entry.user_id.map(|id| id.to_string()))
        .bind(&entry.model)
        .bind(entry.prompt_length)
        .bind(entry.response_length)
        .bind(entry.input_tokens)
        .bind(entry.output_tokens)
        .bind(entry.input_tokens.saturating_add(entry.output_tokens))
        .bind(entry.duration_ms)
        .bind(entry.status.as_str())
        .bind(entry.status.error_message())
        .bind(entry.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_daily_usage(&self, org_id: Uuid, range: DateRange) -> DbResult<Vec<DailyUsage>> {
        let rows = sqlx::query(
            r#"
            SELECT id, org_id, model, date, message_count, input_tokens, output_tokens,
                   total_tokens, estimated_cost_cents, created_at, updated_at
            FROM ai_daily_usage
            WHERE org_id = ? AND date >= ? AND date <= ?
            ORDER BY date DESC, model ASC
            "#,
        )
        .bind(org_id.to_string())
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(DailyUsage {
                    id: row.get("id"),
                    org_id: parse_uuid(&row.get::<String, _>("org_id"))?,
                    model: row.get("model"),
                    date: row.get("date"),
                    message_count: row.get("message_count"),
                    input_tokens: row.get("input_tokens"),
                    output_tokens: row.get("output_tokens"),
                    total_tokens: row.get("total_tokens"),
                    estimated_cost_cents: row.get("estimated_cost_cents"),
                    created_at: row.get("created_at"),
                    updated_at: row.get("updated_at"),
                })
            })
            .collect()
    }

    async fn get_model_usage(&self, org_id: Uuid, range: DateRange) -> DbResult<Vec<ModelUsage>> {
        let rows = sqlx::query(
            r#"
            SELECT
                model,
                SUM(message_count) as message_count,
                SUM(total_tokens) as total_tokens,
                SUM(estimated_cost_cents) as estimated_cost_cents
            FROM ai_daily_usage
            WHERE org_id = ? AND date >= ? AND date <= ?
            GROUP BY model
            ORDER BY estimated_cost_cents DESC, model ASC
            "#,
        )
        .bind(org_id.to_string())
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| ModelUsage {
                model: row.get("model"),
                message_count: row.get("message_count"),
                total_tokens: row.get("total_tokens"),
                estimated_cost_cents: row.get("estimated_cost_cents"),
            })
            .collect())
    }

    async fn list_request_logs(
        &self,
        org_id: Uuid,
        limit: i64,
    ) -> DbResult<Vec<RequestLogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, org_id, user_id, model, prompt_length, response_length,
                   input_tokens, output_tokens, total_tokens, duration_ms,
                   status, error_message, created_at
            FROM ai_request_log
            WHERE org_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(org_id.to_string())
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let user_id: Option<String> = row.get("user_id");
                Ok(RequestLogEntry {
                    id: row.get("id"),
                    org_id: parse_uuid(&row.get::<String, _>("org_id"))?,
                    user_id: user_id.as_deref().map(parse_uuid).transpose()?,
                    model: row.get("model"),
                    prompt_length: row.get("prompt_length"),
                    response_length: row.get("response_length"),
                    input_tokens: row.get("input_tokens"),
                    output_tokens: row.get("output_tokens"),
                    total_tokens: row.get("total_tokens"),
                    duration_ms: row.get("duration_ms"),
                    status: CallStatus::from_parts(
                        &row.get::<String, _>("status"),
                        row.get("error_message"),
                    ),
                    created_at: row.get("created_at"),
                })
            })
            .collect()
    }

    async fn delete_daily_usage_before(
        &self,
        cutoff: NaiveDate,
        batch_size: u32,
        max_deletes: u64,
    ) -> DbResult<u64> {
        self.delete_in_batches(
            r#"
            DELETE FROM ai_daily_usage
            WHERE id IN (
                SELECT id FROM ai_daily_usage
                WHERE date < ?
                LIMIT ?
            )
            "#,
            cutoff,
            batch_size,
            max_deletes,
        )
        .await
    }

    async fn delete_request_logs_before(
        &self,
        cutoff: DateTime<Utc>,
        batch_size: u32,
        max_deletes: u64,
    ) -> DbResult<u64> {
        self.delete_in_batches(
            r#"
            DELETE FROM ai_request_log
            WHERE id IN (
                SELECT id FROM ai_request_log
                WHERE created_at < ?
                LIMIT ?
            )
            "#,
            cutoff,
            batch_size,
            max_deletes,
        )
        .await
    }
}
