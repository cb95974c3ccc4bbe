//! Usage governor: admission checks before an AI call, accounting after it,
//! and read-only usage reporting.
//!
//! Enforcement state (rate windows, monthly quota counters) lives in the
//! [`Cache`]. Reporting state (daily ledger, request log) lives in the
//! database. The two are written separately and may briefly diverge.

mod accounting;
mod admission;
mod error;
mod summary;

use std::sync::Arc;

pub use accounting::{CallOutcome, RecordedUsage};
pub use admission::{Admission, QuotaUsage};
pub use error::{ErrorInfo, ErrorResponse, GovernorError};

use crate::{
    cache::{Cache, CacheKeys},
    config::GovernorSettings,
    db::{DbPool, SubscriptionRepo, UsageRepo},
};

pub struct UsageGovernor {
    cache: Arc<dyn Cache>,
    keys: CacheKeys,
    subscriptions: Arc<dyn SubscriptionRepo>,
    usage: Arc<dyn UsageRepo>,
    window_secs: u64,
}

impl UsageGovernor {
    pub fn new(cache: Arc<dyn Cache>, db: &DbPool, settings: &GovernorSettings) -> Self {
        Self::from_repos(cache, db.subscriptions(), db.usage(), settings)
    }

    pub fn from_repos(
        cache: Arc<dyn Cache>,
        subscriptions: Arc<dyn SubscriptionRepo>,
        usage: Arc<dyn UsageRepo>,
        settings: &GovernorSettings,
    ) -> Self {
        let keys = CacheKeys::new(settings).with_hash_tags(cache.hash_tags());
        Self {
            cache,
            keys,
            subscriptions,
            usage,
            window_secs: settings.rate_window_secs,
        }
    }

    /// Counter store backend name.
    pub fn cache_backend(&self) -> &'static str {
        self.cache.backend()
    }
}
