use async_trait::async_trait;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::parse_enum;
use crate::{
    db::{error::DbResult, repos::SubscriptionRepo},
    models::{Subscription, UpsertSubscription},
};

pub struct PostgresSubscriptionRepo {
    write_pool: PgPool,
    read_pool: PgPool,
}

impl PostgresSubscriptionRepo {
    pub fn new(write_pool: PgPool, read_pool: Option<PgPool>) -> Self {
        let read_pool = read_pool.unwrap_or_else(|| write_pool.clone());
        Self {
            write_pool,
            read_pool,
        }
    }

    fn parse_subscription(row: &sqlx::postgres::PgRow) -> DbResult<Subscription> {
        Ok(Subscription {
            org_id: row.get("org_id"),
            plan: parse_enum(row.get::<&str, _>("plan"))?,
            status: parse_enum(row.get::<&str, _>("status"))?,
            current_period_end: row.get("current_period_end"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        })
    }
}

#[async_trait]
impl SubscriptionRepo for PostgresSubscriptionRepo {
    async fn get_by_org(&self, org_id: Uuid) -> DbResult<Option<Subscription>> {
        let row = sqlx::query(
            r#"
            SELECT org_id, plan, status, current_period_end, created_at, updated_at
            FROM subscriptions
            WHERE org_id = $1
            "#,
        )
        .bind(org_id)
        .fetch_optional(&self.read_pool)
        .await?;

        row.as_ref().map(Self::parse_subscription).transpose()
    }

    async fn upsert(&self, input: UpsertSubscription) -> DbResult<Subscription> {
        let now = chrono::Utc::now();

        // RETURNING reads from the primary, so a lagging replica can't hide the write
        let row = sqlx::query(
            r#"
            INSERT INTO subscriptions (org_id, plan, status, current_period_end, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            ON CONFLICT (org_id) DO UPDATE SET
                plan = EXCLUDED.plan,
                status = EXCLUDED.status,
                current_period_end = EXCLUDED.current_period_end,
                updated_at = EXCLUDED.updated_at
            RETURNING org_id, plan, status, current_period_end, created_at, updated_at
            "#,
        )
        .bind(input.org_id)
        .bind(input.plan.as_str())
        .bind(input.status.as_str())
        .bind(input.current_period_end)
        .bind(now)
        .fetch_one(&self.write_pool)
        .await?;

        Self::parse_subscription(&row)
    }
}
