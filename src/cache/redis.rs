use std::time::Duration;

use async_trait::async_trait;
use redis::{
    ConnectionInfo, IntoConnectionInfo, aio::MultiplexedConnection, cluster::ClusterClient,
    cluster_async::ClusterConnection,
};

use super::{
    error::{CacheError, CacheResult},
    traits::{Cache, RateLimitResult},
};
use crate::config::RedisCacheConfig;

/// A wrapper enum for either a standalone or cluster Redis connection.
/// Both connection types implement `ConnectionLike`, so the same command
/// syntax works for both.
enum RedisConn {
    Standalone(MultiplexedConnection),
    Cluster(ClusterConnection),
}

/// Execute a Redis command on either connection type.
macro_rules! redis_cmd {
    ($conn:expr, $cmd:expr) => {
        match $conn {
            RedisConn::Standalone(ref mut c) => $cmd.query_async(c).await,
            RedisConn::Cluster(ref mut c) => $cmd.query_async(c).await,
        }
    };
}

/// Execute a Redis script on either connection type.
macro_rules! redis_script {
    ($conn:expr, $script:expr) => {
        match $conn {
            RedisConn::Standalone(ref mut c) => $script.invoke_async(c).await,
            RedisConn::Cluster(ref mut c) => $script.invoke_async(c).await,
        }
    };
}

/// Execute a Redis pipeline on either connection type.
macro_rules! redis_pipe {
    ($conn:expr, $pipe:expr) => {
        match $conn {
            RedisConn::Standalone(ref mut c) => $pipe.query_async(c).await,
            RedisConn::Cluster(ref mut c) => $pipe.query_async(c).await,
        }
    };
}

/// Lua script for atomic increment that preserves existing TTL.
/// Returns the new value after increment.
///
/// Only sets TTL when the key has no expiry (TTL < 0), so quota counters
/// keep the expiry chosen when they were created.
const INCR_PRESERVE_TTL_SCRIPT: &str = r#"
local key = KEYS[1]
local delta = tonumber(ARGV[1])
local ttl = tonumber(ARGV[2])

local new_value = redis.call('INCRBY', key, delta)
-- TTL returns -1 for a key without expiry; after INCRBY the key always exists
if ttl > 0 and redis.call('TTL', key) < 0 then
    redis.call('EXPIRE', key, ttl)
end
return new_value
"#;

/// Lua script for atomic rate limit check and increment.
/// Returns [allowed (0/1), current_count, ttl_remaining]
///
/// Only sets TTL when the key has no expiry, so fixed time windows are
/// maintained and counters expire at the end of each window.
const RATE_LIMIT_SCRIPT: &str = r#"
local key = KEYS[1]
local limit = tonumber(ARGV[1])
local window_secs = tonumber(ARGV[2])

local current = tonumber(redis.call('GET', key) or '0')
local ttl = redis.call('TTL', key)

-- TTL returns -2 if key doesn't exist, -1 if no expiry set
if ttl < 0 then
    ttl = window_secs
end

if current < limit then
    local new_value = redis.call('INCR', key)
    if redis.call('TTL', key) < 0 then
        redis.call('EXPIRE', key, window_secs)
    end
    return {1, new_value, ttl}
else
    return {0, current, ttl}
end
"#;

/// Internal enum to hold either a standalone or cluster Redis client.
enum RedisConnection {
    Standalone(redis::Client),
    Cluster(ClusterClient),
}

pub struct RedisCache {
    connection: RedisConnection,
    key_prefix: String,
    hash_tags: bool,
    connect_timeout: Duration,
}

impl RedisCache {
    pub async fn from_config(config: &RedisCacheConfig) -> CacheResult<Self> {
        let connection = if let Some(cluster_config) = &config.cluster {
            // Cluster mode: nodes are comma-separated in the URL
            let nodes: Vec<ConnectionInfo> = config
                .url
                .split(',')
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .map(|s| {
                    let node_url = if s.starts_with("redis://") || s.starts_with("rediss://") {
                        s.to_string()
                    } else {
                        format!("redis://{}", s)
                    };
                    node_url.into_connection_info()
                })
                .collect::<Result<Vec<_>, _>>()?;

            if nodes.is_empty() {
                return Err(CacheError::Redis(redis::RedisError::from((
                    redis::ErrorKind::InvalidClientConfig,
                    "No cluster nodes specified in URL",
                ))));
            }

            let mut builder = redis::cluster::ClusterClientBuilder::new(nodes);
            if cluster_config.read_from_replicas {
                builder = builder.read_from_replicas();
            }
            builder = builder
                .retries(cluster_config.retries)
                .connection_timeout(Duration::from_secs(cluster_config.connection_timeout_secs))
                .response_timeout(Duration::from_secs(cluster_config.response_timeout_secs));

            RedisConnection::Cluster(builder.build()?)
        } else {
            RedisConnection::Standalone(redis::Client::open(config.url.as_str())?)
        };

        let cache = Self {
            connection,
            key_prefix: config.key_prefix.clone(),
            hash_tags: config.hash_tag_org_ids,
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
        };

        // Fail fast on an unreachable store
        let mut conn = cache.get_connection().await?;
        let _: String = redis_cmd!(conn, redis::cmd("PING"))?;

        tracing::info!(
            cluster = config.cluster.is_some(),
            key_prefix = %config.key_prefix,
            hash_tags = config.hash_tag_org_ids,
            "Connected to Redis counter store"
        );

        Ok(cache)
    }

    fn prefixed_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }

    /// Get a Redis connection, either standalone or cluster.
    async fn get_connection(&self) -> CacheResult<RedisConn> {
        let connect = async {
            match &self.connection {
                RedisConnection::Standalone(client) => {
                    let conn = client.get_multiplexed_async_connection().await?;
                    Ok::<_, CacheError>(RedisConn::Standalone(conn))
                }
                RedisConnection::Cluster(client) => {
                    let conn = client.get_async_connection().await?;
                    Ok(RedisConn::Cluster(conn))
                }
            }
        };

        tokio::time::timeout(self.connect_timeout, connect)
            .await
            .map_err(|_| CacheError::Timeout(self.connect_timeout.as_secs()))?
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get_counter(&self, key: &str) -> CacheResult<i64> {
        let mut conn = self.get_connection().await?;
        let full_key = self.prefixed_key(key);

        let value: Option<i64> = redis_cmd!(conn, redis::cmd("GET").arg(&full_key))?;
        Ok(value.unwrap_or(0))
    }

    async fn get_counters(&self, keys: &[String]) -> CacheResult<Vec<i64>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.get_connection().await?;

        // Without hash tags the keys may live on different cluster slots
        if matches!(self.connection, RedisConnection::Cluster(_)) && !self.hash_tags {
            let mut values = Vec::with_capacity(keys.len());
            for key in keys {
                let value: Option<i64> =
                    redis_cmd!(conn, redis::cmd("GET").arg(self.prefixed_key(key)))?;
                values.push(value.unwrap_or(0));
            }
            return Ok(values);
        }

        let mut pipe = redis::pipe();
        for key in keys {
            pipe.cmd("GET").arg(self.prefixed_key(key));
        }

        let values: Vec<Option<i64>> = redis_pipe!(conn, pipe)?;
        Ok(values.into_iter().map(|v| v.unwrap_or(0)).collect())
    }

    async fn incr_by(&self, key: &str, delta: i64, ttl: Duration) -> CacheResult<i64> {
        let mut conn = self.get_connection().await?;
        let full_key = self.prefixed_key(key);

        if ttl.as_secs() > 0 {
            let result: i64 = redis_script!(
                conn,
                redis::Script::new(INCR_PRESERVE_TTL_SCRIPT)
                    .key(&full_key)
                    .arg(delta)
                    .arg(ttl.as_secs() as i64)
            )?;
            Ok(result)
        } else {
            let result: i64 = redis_cmd!(conn, redis::cmd("INCRBY").arg(&full_key).arg(delta))?;
            Ok(result)
        }
    }

    async fn check_and_incr_rate_limit(
        &self,
        key: &str,
        limit: u32,
        window_secs: u64,
    ) -> CacheResult<RateLimitResult> {
        let mut conn = self.get_connection().await?;
        let full_key = self.prefixed_key(key);

        let result: Vec<i64> = redis_script!(
            conn,
            redis::Script::new(RATE_LIMIT_SCRIPT)
                .key(&full_key)
                .arg(limit)
                .arg(window_secs as i64)
        )?;

        Ok(RateLimitResult {
            allowed: result.first().copied().unwrap_or(0) == 1,
            current: result.get(1).copied().unwrap_or(0),
            limit,
            reset_secs: result.get(2).copied().unwrap_or(window_secs as i64).max(0) as u64,
        })
    }

    async fn ttl(&self, key: &str) -> CacheResult<Option<Duration>> {
        let mut conn = self.get_connection().await?;
        let full_key = self.prefixed_key(key);

        // PTTL returns -2 for a missing key and -1 for a key without expiry
        let millis: i64 = redis_cmd!(conn, redis::cmd("PTTL").arg(&full_key))?;
        Ok((millis >= 0).then(|| Duration::from_millis(millis as u64)))
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.get_connection().await?;
        let full_key = self.prefixed_key(key);

        let _: () = redis_cmd!(conn, redis::cmd("DEL").arg(&full_key))?;
        Ok(())
    }

    fn backend(&self) -> &'static str {
        "redis"
    }

    fn hash_tags(&self) -> bool {
        self.hash_tags
    }
}
