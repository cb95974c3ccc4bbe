use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Counter store configuration.
///
/// Holds the per-minute rate buckets and the monthly quota counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[serde(deny_unknown_fields)]
pub enum CacheConfig {
    /// In-memory store. Good for single-node deployments and local use.
    /// Counters are lost on restart and not shared between processes.
    Memory(MemoryCacheConfig),

    /// Redis store. Required for multi-node deployments.
    #[cfg(feature = "redis")]
    Redis(RedisCacheConfig),
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig::Memory(MemoryCacheConfig::default())
    }
}

impl CacheConfig {
    pub fn is_memory(&self) -> bool {
        matches!(self, CacheConfig::Memory(_))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            CacheConfig::Memory(c) => c.validate(),
            #[cfg(feature = "redis")]
            CacheConfig::Redis(c) => c.validate(),
        }
    }
}

/// In-memory counter store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MemoryCacheConfig {
    /// Maximum number of counters. Expired counters are purged when the
    /// limit is reached; live ones are never evicted, so new keys are
    /// refused while the store is full.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            max_entries: default_max_entries(),
        }
    }
}

impl MemoryCacheConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_entries == 0 {
            return Err(ConfigError::Validation(
                "Memory cache max_entries must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

fn default_max_entries() -> usize {
    100_000
}

/// Redis counter store configuration.
#[cfg(feature = "redis")]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedisCacheConfig {
    /// Redis connection URL.
    /// Format: redis://[user:password@]host:port[/database]
    /// For clusters, a comma-separated node list together with `[cache.cluster]`.
    pub url: String,

    /// Connection timeout in seconds.
    #[serde(default = "default_redis_timeout")]
    pub connect_timeout_secs: u64,

    /// Key prefix for all counter keys. Empty by default, so keys match
    /// other clients using the plain `ai_rate:<org>:<window>` layout.
    #[serde(default)]
    pub key_prefix: String,

    /// Wrap the organization id in a hash tag (`{<org>}`) so that all
    /// counters of one organization share a cluster slot. Keys then no
    /// longer match the plain layout.
    #[serde(default)]
    pub hash_tag_org_ids: bool,

    /// Cluster mode configuration.
    #[serde(default)]
    pub cluster: Option<RedisClusterConfig>,
}

#[cfg(feature = "redis")]
impl RedisCacheConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::Validation("Redis URL cannot be empty".into()));
        }
        Ok(())
    }
}

/// Redis cluster configuration.
#[cfg(feature = "redis")]
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RedisClusterConfig {
    /// Read from replicas for read operations.
    #[serde(default)]
    pub read_from_replicas: bool,

    /// Number of retries for cluster operations.
    #[serde(default = "default_cluster_retries")]
    pub retries: u32,

    /// Connection timeout for cluster nodes in seconds.
    #[serde(default = "default_cluster_connection_timeout")]
    pub connection_timeout_secs: u64,

    /// Response timeout for cluster operations in seconds.
    #[serde(default = "default_cluster_response_timeout")]
    pub response_timeout_secs: u64,
}

#[cfg(feature = "redis")]
fn default_redis_timeout() -> u64 {
    5
}

#[cfg(feature = "redis")]
fn default_cluster_retries() -> u32 {
    3
}

#[cfg(feature = "redis")]
fn default_cluster_connection_timeout() -> u64 {
    5
}

#[cfg(feature = "redis")]
fn default_cluster_response_timeout() -> u64 {
    1
}
