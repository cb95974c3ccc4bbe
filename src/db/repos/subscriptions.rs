use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    db::error::DbResult,
    models::{Subscription, UpsertSubscription},
};

#[async_trait]
pub trait SubscriptionRepo: Send + Sync {
    /// Get an organization's subscription, if it has one.
    async fn get_by_org(&self, org_id: Uuid) -> DbResult<Option<Subscription>>;

    /// Create or replace an organization's subscription.
    /// `created_at` is kept when the row already exists.
    async fn upsert(&self, input: UpsertSubscription) -> DbResult<Subscription>;
}
