mod subscriptions;
mod usage;

pub use subscriptions::PostgresSubscriptionRepo;
pub use usage::PostgresUsageRepo;

use crate::db::error::{DbError, DbResult};

/// Parse a stored enum value (plan, status) from its text form
fn parse_enum<T>(s: &str) -> DbResult<T>
where
    T: std::str::FromStr<Err = String>,
{
    T::from_str(s).map_err(DbError::Internal)
}
