use std::time::Duration;

use async_trait::async_trait;

use super::error::CacheResult;

/// Result of an atomic rate limit check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitResult {
    /// Whether the request is allowed
    pub allowed: bool,
    /// Current count after this request
    pub current: i64,
    /// The limit
    pub limit: u32,
    /// Seconds until the window's counter expires
    pub reset_secs: u64,
}

impl RateLimitResult {
    /// Requests left in the current window.
    pub fn remaining(&self) -> u32 {
        (self.limit as i64).saturating_sub(self.current).max(0) as u32
    }
}

/// Counter store backing the governor.
///
/// Every counter is an integer that reads as zero when missing or expired.
/// Expiry is set when a counter is created and is never extended by later
/// increments, which keeps rate windows fixed.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Read a counter. Missing or expired counters read as zero.
    async fn get_counter(&self, key: &str) -> CacheResult<i64>;

    /// Read several counters in one round trip, in input order.
    async fn get_counters(&self, keys: &[String]) -> CacheResult<Vec<i64>>;

    /// Increment a counter by delta, returning the new value.
    ///
    /// `ttl` is applied only when the counter has no expiry yet (new key).
    /// A zero `ttl` leaves the counter without expiry.
    async fn incr_by(&self, key: &str, delta: i64, ttl: Duration) -> CacheResult<i64>;

    /// Atomically check rate limit and increment counter.
    ///
    /// 1. If current_count < limit: increment and return allowed=true
    /// 2. Otherwise: don't increment and return allowed=false
    ///
    /// The counter is created with a `window_secs` expiry on first increment.
    async fn check_and_incr_rate_limit(
        &self,
        key: &str,
        limit: u32,
        window_secs: u64,
    ) -> CacheResult<RateLimitResult>;

    /// Remaining time to live of a counter. `None` when the key is missing
    /// or has no expiry.
    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>>;

    /// Delete a counter.
    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Name of the backend, used in logs and metrics labels.
    fn backend(&self) -> &'static str;

    /// Whether counter keys should wrap the organization id in a Redis
    /// cluster hash tag.
    fn hash_tags(&self) -> bool {
        false
    }
}
