//! Tollgate: a usage governor for metered AI calls.
//!
//! Before a call, [`UsageGovernor::check_admission`] decides whether an
//! organization's plan admits it. After the call,
//! [`UsageGovernor::record_usage`] charges the monthly counters and writes the
//! reporting ledger. The governor can be embedded as a library or run as an
//! HTTP sidecar (`tollgate serve`).

use std::sync::Arc;

pub mod cache;
pub mod config;
pub mod db;
pub mod governor;
pub mod models;
pub mod observability;
pub mod plans;
pub mod pricing;
pub mod retention;
pub mod routes;

pub use governor::{GovernorError, UsageGovernor};

/// Shared state of the HTTP sidecar.
#[derive(Clone)]
pub struct AppState {
    pub governor: Arc<UsageGovernor>,
    pub db: Arc<db::DbPool>,
    pub cache: Arc<dyn cache::Cache>,
}

impl AppState {
    pub fn new(
        db: Arc<db::DbPool>,
        cache: Arc<dyn cache::Cache>,
        settings: &config::GovernorSettings,
    ) -> Self {
        let governor = Arc::new(UsageGovernor::new(cache.clone(), &db, settings));
        Self {
            governor,
            db,
            cache,
        }
    }
}
