use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use dashmap::{DashMap, mapref::entry::Entry};
use tokio::time::Instant;

use super::{
    error::{CacheError, CacheResult},
    traits::{Cache, RateLimitResult},
};
use crate::config::MemoryCacheConfig;

struct CounterEntry {
    value: i64,
    expires_at: Option<Instant>,
}

impl CounterEntry {
    fn new(now: Instant, ttl: Duration) -> Self {
        Self {
            value: 0,
            expires_at: expiry(now, ttl),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|exp| now >= exp)
    }

    /// Arm the expiry if the counter has none yet.
    fn arm(&mut self, now: Instant, ttl: Duration) {
        if self.expires_at.is_none() {
            self.expires_at = expiry(now, ttl);
        }
    }

    fn remaining(&self, now: Instant) -> Option<Duration> {
        self.expires_at.map(|exp| exp.saturating_duration_since(now))
    }
}

fn expiry(now: Instant, ttl: Duration) -> Option<Instant> {
    if ttl.is_zero() { None } else { Some(now + ttl) }
}

/// In-memory counter store using DashMap for concurrent access.
///
/// Each counter is updated under its shard lock, so check-and-increment is
/// atomic within the process.
///
/// Live counters are never evicted. When `max_entries` is reached the expired
/// counters are purged, and if the store is still full new keys are refused
/// with [`CacheError::Full`]. Existing keys keep counting.
///
/// # Multi-Node Deployments
///
/// **WARNING**: This store is NOT suitable for multi-node deployments.
/// Every process keeps its own counters, so rate limits and quotas are
/// enforced per node. Use the Redis store when running more than one
/// instance.
pub struct MemoryCache {
    counters: Arc<DashMap<String, CounterEntry>>,
    max_entries: usize,
}

impl MemoryCache {
    pub fn new(config: &MemoryCacheConfig) -> Self {
        Self {
            counters: Arc::new(DashMap::new()),
            max_entries: config.max_entries,
        }
    }

    /// Number of live (unexpired) counters.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.counters
            .iter()
            .filter(|entry| !entry.is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make room for a new key by purging expired counters.
    fn ensure_capacity(&self, key: &str) -> CacheResult<()> {
        if self.counters.contains_key(key) || self.counters.len() < self.max_entries {
            return Ok(());
        }

        let now = Instant::now();
        let before = self.counters.len();
        self.counters.retain(|_, entry| !entry.is_expired(now));
        let purged = before.saturating_sub(self.counters.len());
        if purged > 0 {
            tracing::debug!(purged, "Purged expired counters from memory store");
        }

        if self.counters.len() >= self.max_entries {
            tracing::warn!(
                max_entries = self.max_entries,
                "Memory counter store is full"
            );
            return Err(CacheError::Full(self.max_entries));
        }
        Ok(())
    }

    fn read(&self, key: &str, now: Instant) -> i64 {
        match self.counters.get(key) {
            Some(entry) if !entry.is_expired(now) => entry.value,
            _ => 0,
        }
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get_counter(&self, key: &str) -> CacheResult<i64> {
        Ok(self.read(key, Instant::now()))
    }

    async fn get_counters(&self, keys: &[String]) -> CacheResult<Vec<i64>> {
        let now = Instant::now();
        Ok(keys.iter().map(|key| self.read(key, now)).collect())
    }

    async fn incr_by(&self, key: &str, delta: i64, ttl: Duration) -> CacheResult<i64> {
        self.ensure_capacity(key)?;

        let now = Instant::now();
        let value = match self.counters.entry(key.to_string()) {
            Entry::Occupied(mut e) => {
                let entry = e.get_mut();
                if entry.is_expired(now) {
                    *entry = CounterEntry::new(now, ttl);
                } else {
                    entry.arm(now, ttl);
                }
                entry.value += delta;
                entry.value
            }
            Entry::Vacant(e) => {
                let mut entry = CounterEntry::new(now, ttl);
                entry.value = delta;
                e.insert(entry).value
            }
        };

        Ok(value)
    }

    async fn check_and_incr_rate_limit(
        &self,
        key: &str,
        limit: u32,
        window_secs: u64,
    ) -> CacheResult<RateLimitResult> {
        self.ensure_capacity(key)?;

        let now = Instant::now();
        let window = Duration::from_secs(window_secs);

        let mut slot = self
            .counters
            .entry(key.to_string())
            .or_insert_with(|| CounterEntry::new(now, window));
        let entry = slot.value_mut();

        if entry.is_expired(now) {
            *entry = CounterEntry::new(now, window);
        }

        let reset_secs = entry
            .remaining(now)
            .map(|d| d.as_secs().max(1))
            .unwrap_or(window_secs);

        if entry.value >= limit as i64 {
            return Ok(RateLimitResult {
                allowed: false,
                current: entry.value,
                limit,
                reset_secs,
            });
        }

        entry.arm(now, window);
        entry.value += 1;

        Ok(RateLimitResult {
            allowed: true,
            current: entry.value,
            limit,
            reset_secs,
        })
    }

    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>> {
        let now = Instant::now();
        Ok(match self.counters.get(key) {
            Some(entry) if !entry.is_expired(now) => entry.remaining(now),
            _ => None,
        })
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.counters.remove(key);
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::advance;

    use super::*;

    fn test_config(max_entries: usize) -> MemoryCacheConfig {
        MemoryCacheConfig { max_entries }
    }

    #[tokio::test]
    async fn test_missing_counter_reads_zero() {
        let cache = MemoryCache::new(&test_config(100));
        assert_eq!(cache.get_counter("missing").await.unwrap(), 0);
        assert_eq!(cache.ttl("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_incr_by_accumulates() {
        let cache = MemoryCache::new(&test_config(100));
        let ttl = Duration::from_secs(60);

        assert_eq!(cache.incr_by("c", 5, ttl).await.unwrap(), 5);
        assert_eq!(cache.incr_by("c", 7, ttl).await.unwrap(), 12);
        assert_eq!(cache.get_counter("c").await.unwrap(), 12);
    }

    #[tokio::test]
    async fn test_get_counters_preserves_order() {
        let cache = MemoryCache::new(&test_config(100));
        cache.incr_by("a", 1, Duration::ZERO).await.unwrap();
        cache.incr_by("c", 3, Duration::ZERO).await.unwrap();

        let values = cache
            .get_counters(&["a".to_string(), "b".to_string(), "c".to_string()])
            .await
            .unwrap();
        assert_eq!(values, vec![1, 0, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_set_on_first_increment_only() {
        let cache = MemoryCache::new(&test_config(100));

        cache.incr_by("c", 1, Duration::from_secs(60)).await.unwrap();
        advance(Duration::from_secs(40)).await;

        // A later increment with a fresh TTL must not extend the expiry
        cache.incr_by("c", 1, Duration::from_secs(60)).await.unwrap();
        assert_eq!(
            cache.ttl("c").await.unwrap(),
            Some(Duration::from_secs(20))
        );

        advance(Duration::from_secs(21)).await;
        assert_eq!(cache.get_counter("c").await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_counter_restarts_from_delta() {
        let cache = MemoryCache::new(&test_config(100));

        cache.incr_by("c", 10, Duration::from_secs(1)).await.unwrap();
        advance(Duration::from_secs(2)).await;

        assert_eq!(cache.incr_by("c", 3, Duration::from_secs(1)).await.unwrap(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_ttl_means_no_expiration() {
        let cache = MemoryCache::new(&test_config(100));

        cache.incr_by("forever", 1, Duration::ZERO).await.unwrap();
        advance(Duration::from_secs(86_400 * 365)).await;

        assert_eq!(cache.get_counter("forever").await.unwrap(), 1);
        assert_eq!(cache.ttl("forever").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_allows_up_to_limit() {
        let cache = MemoryCache::new(&test_config(100));

        for i in 1..=5 {
            let result = cache.check_and_incr_rate_limit("rl", 5, 60).await.unwrap();
            assert!(result.allowed, "request {} should be allowed", i);
            assert_eq!(result.current, i);
        }

        let result = cache.check_and_incr_rate_limit("rl", 5, 60).await.unwrap();
        assert!(!result.allowed);
        assert_eq!(result.current, 5);
        assert_eq!(result.remaining(), 0);
        assert_eq!(result.reset_secs, 60);

        // Rejections don't increment
        assert_eq!(cache.get_counter("rl").await.unwrap(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_window_expires() {
        let cache = MemoryCache::new(&test_config(100));

        for _ in 0..3 {
            cache.check_and_incr_rate_limit("rl", 3, 60).await.unwrap();
        }
        assert!(!cache.check_and_incr_rate_limit("rl", 3, 60).await.unwrap().allowed);

        advance(Duration::from_secs(60)).await;

        let result = cache.check_and_incr_rate_limit("rl", 3, 60).await.unwrap();
        assert!(result.allowed);
        assert_eq!(result.current, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_window_not_extended() {
        let cache = MemoryCache::new(&test_config(100));

        cache.check_and_incr_rate_limit("rl", 10, 60).await.unwrap();
        advance(Duration::from_secs(45)).await;
        let result = cache.check_and_incr_rate_limit("rl", 10, 60).await.unwrap();

        assert_eq!(result.current, 2);
        assert_eq!(result.reset_secs, 15);
    }

    #[tokio::test]
    async fn test_zero_limit_rejects_everything() {
        let cache = MemoryCache::new(&test_config(100));
        let result = cache.check_and_incr_rate_limit("rl", 0, 60).await.unwrap();
        assert!(!result.allowed);
        assert_eq!(result.current, 0);
    }

    #[tokio::test]
    async fn test_concurrent_rate_limit_is_exact() {
        let cache = Arc::new(MemoryCache::new(&test_config(100)));
        let mut handles = Vec::new();

        for _ in 0..50 {
            let cache = Arc::clone(&cache);
            handles.push(tokio::spawn(async move {
                cache
                    .check_and_incr_rate_limit("shared", 20, 60)
                    .await
                    .unwrap()
                    .allowed
            }));
        }

        let mut allowed = 0;
        for handle in handles {
            if handle.await.unwrap() {
                allowed += 1;
            }
        }

        assert_eq!(allowed, 20);
        assert_eq!(cache.get_counter("shared").await.unwrap(), 20);
    }

    #[tokio::test]
    async fn test_delete() {
        let cache = MemoryCache::new(&test_config(100));
        cache.incr_by("c", 1, Duration::ZERO).await.unwrap();
        cache.delete("c").await.unwrap();
        assert_eq!(cache.get_counter("c").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_full_store_keeps_live_counters() {
        let cache = MemoryCache::new(&test_config(4));

        cache.incr_by("quota", 50, Duration::ZERO).await.unwrap();
        for i in 0..3 {
            cache
                .incr_by(&format!("other{}", i), 1, Duration::ZERO)
                .await
                .unwrap();
        }

        let err = cache.incr_by("new", 1, Duration::ZERO).await.unwrap_err();
        assert!(matches!(err, CacheError::Full(4)));
        assert!(cache.check_and_incr_rate_limit("rl", 5, 60).await.is_err());

        // Existing counters are untouched and still count
        assert_eq!(cache.get_counter("quota").await.unwrap(), 50);
        assert_eq!(cache.incr_by("quota", 1, Duration::ZERO).await.unwrap(), 51);
        assert_eq!(cache.len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_store_purges_expired() {
        let cache = MemoryCache::new(&test_config(4));

        cache.incr_by("short", 1, Duration::from_secs(1)).await.unwrap();
        for i in 0..3 {
            cache
                .incr_by(&format!("long{}", i), 1, Duration::ZERO)
                .await
                .unwrap();
        }
        advance(Duration::from_secs(2)).await;

        assert_eq!(cache.incr_by("new", 1, Duration::ZERO).await.unwrap(), 1);
        for i in 0..3 {
            assert_eq!(cache.get_counter(&format!("long{}", i)).await.unwrap(), 1);
        }
        assert_eq!(cache.len(), 4);
    }
}
