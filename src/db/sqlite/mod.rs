mod common;
mod subscriptions;
mod usage;

pub use subscriptions::SqliteSubscriptionRepo;
pub use usage::SqliteUsageRepo;
