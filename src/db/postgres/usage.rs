use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::{
    db::{
        error::DbResult,
        repos::{DateRange, UsageRepo},
    },
    models::{
        CallStatus, DailyUsage, DailyUsageDelta, ModelUsage, NewRequestLog, RequestLogEntry,
    },
};

pub struct PostgresUsageRepo {
    write_pool: PgPool,
    read_pool: PgPool,
}

impl PostgresUsageRepo {
    pub fn new(write_pool: PgPool, read_pool: Option<PgPool>) -> Self {
        let read_pool = read_pool.unwrap_or_else(|| write_pool.clone());
        Self {
            write_pool,
            read_pool,
        }
    }

    /// Run `delete_sql` (bound to the cutoff and a LIMIT) until a batch comes
    /// back short or `max_deletes` is reached.
    async fn delete_in_batches<T>(
        &self,
        delete_sql: &str,
        cutoff: T,
        batch_size: u32,
        max_deletes: u64,
    ) -> DbResult<u64>
    where
        T: for<'q> sqlx::Encode<'q, sqlx::Postgres>
            + sqlx::Type<sqlx::Postgres>
            + Clone
            + Send
            + 'static,
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
                .execute(&self.write_pool)
                .await?;

            let rows_deleted = result.rows_affected();
            total_deleted += rows_deleted;

            if rows_deleted < limit as u64 {
                break;
            }
        }

        Ok(total_deleted)
    }
}

#[async_trait]
impl UsageRepo for PostgresUsageRepo {
    async fn upsert_daily_usage(&self, delta: DailyUsageDelta) -> DbResult<()> {
        let now = Utc::now();

        sqlx::query(
            r#"
            INSERT INTO ai_daily_usage (
                org_id, model, date, message_count, input_tokens, output_tokens,
                total_tokens, estimated_cost_cents, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $9)
            ON CONFLICT (org_id, model, date) DO UPDATE SET
                message_count = ai_daily_usage.message_count + EXCLUDED.message_count,
                input_tokens = ai_daily_usage.input_tokens + EXCLUDED.input_tokens,
                output_tokens = ai_daily_usage.output_tokens + EXCLUDED.output_tokens,
                total_tokens = ai_daily_usage.total_tokens + EXCLUDED.total_tokens,
                estimated_cost_cents = ai_daily_usage.estimated_cost_cents + EXCLUDED.estimated_cost_cents,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(delta.org_id)
        .bind(&delta.model)
        .bind(delta.date)
        .bind(delta.messages)
        .bind(delta.input_tokens)
        .bind(delta.output_tokens)
        .bind(delta.input_tokens.saturating_add(delta.output_tokens))
        .bind(delta.cost_cents)
        .bind(now)
        .execute(&self.write_pool)
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
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(entry.org_id)
        .bind(entry.user_id)
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
        .execute(&self.write_pool)
        .await?;

        Ok(())
    }

    async fn get_daily_usage(&self, org_id: Uuid, range: DateRange) -> DbResult<Vec<DailyUsage>> {
        let rows = sqlx::query(
            r#"
            SELECT id, org_id, model, date, message_count, input_tokens, output_tokens,
                   total_tokens, estimated_cost_cents, created_at, updated_at
            FROM ai_daily_usage
            WHERE org_id = $1 AND date >= $2 AND date <= $3
            ORDER BY date DESC, model ASC
            "#,
        )
        .bind(org_id)
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&self.read_pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| DailyUsage {
                id: row.get("id"),
                org_id: row.get("org_id"),
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
            .collect())
    }

    async fn get_model_usage(&self, org_id: Uuid, range: DateRange) -> DbResult<Vec<ModelUsage>> {
        // SUM(BIGINT) is NUMERIC in PostgreSQL
        let rows = sqlx::query(
            r#"
            SELECT
                model,
                SUM(message_count)::BIGINT as message_count,
                SUM(total_tokens)::BIGINT as total_tokens,
                SUM(estimated_cost_cents)::BIGINT as estimated_cost_cents
            FROM ai_daily_usage
            WHERE org_id = $1 AND date >= $2 AND date <= $3
            GROUP BY model
            ORDER BY estimated_cost_cents DESC, model ASC
            "#,
        )
        .bind(org_id)
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&self.read_pool)
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
            WHERE org_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(org_id)
        .bind(limit)
        .fetch_all(&self.read_pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| RequestLogEntry {
                id: row.get("id"),
                org_id: row.get("org_id"),
                user_id: row.get("user_id"),
                model: row.get("model"),
                prompt_length: row.get("prompt_length"),
                response_length: row.get("response_length"),
                input_tokens: row.get("input_tokens"),
                output_tokens: row.get("output_tokens"),
                total_tokens: row.get("total_tokens"),
                duration_ms: row.get("duration_ms"),
                status: CallStatus::from_parts(row.get("status"), row.get("error_message")),
                created_at: row.get("created_at"),
            })
            .collect())
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
                WHERE date < $1
                LIMIT $2
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
                WHERE created_at < $1
                LIMIT $2
            )
            "#,
            cutoff,
            batch_size,
            max_deletes,
        )
        .await
    }
}
