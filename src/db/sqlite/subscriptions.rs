use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::common::{parse_enum, parse_uuid};
use crate::{
    db::{
        error::{DbError, DbResult},
        repos::SubscriptionRepo,
    },
    models::{Subscription, UpsertSubscription},
};

pub struct SqliteSubscriptionRepo {
    pool: SqlitePool,
}

impl SqliteSubscriptionRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn parse_subscription(row: &sqlx::sqlite::SqliteRow) -> DbResult<Subscription> {
        Ok(Subscription {
            org_id: parse_uuid(&row.get::<String, _>("org_id"))?,
            plan: parse_enum(&row.get::<String, _>("plan"))?,
            status: parse_enum(&row.get::<String, _>("status"))?,
            current_period_end: row.get("current_period_end"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl SubscriptionRepo for SqliteSubscriptionRepo {
    async fn get_by_org(&self, org_id: Uuid) -> DbResult<Option<Subscription>> {
        let row = sqlx::query(
            r#"
            SELECT org_id, plan, status, current_period_end, created_at, updated_at
            FROM subscriptions
            WHERE org_id = ?
            "#,
        )
        .bind(org_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::parse_subscription).transpose()
    }

    async fn upsert(&self, input: UpsertSubscription) -> DbResult<Subscription> {
        let now = chrono::Utc::now();

        sqlx::query(
            r#"
            INSERT INTO subscriptions (org_id, plan, status, current_period_end, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (org_id) DO UPDATE SET
                plan = excluded.plan,
                status = excluded.status,
                current_period_end = excluded.current_period_end,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(input.org_id.to_string())
        .bind(input.plan.as_str())
        .bind(input.status.as_str())
        .bind(input.current_period_end)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_by_org(input.org_id)
            .await?
            .ok_or(DbError::NotFound)
    }
}
