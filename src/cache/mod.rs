mod error;
mod keys;
mod memory;
#[cfg(feature = "redis")]
mod redis;
mod traits;

use std::sync::Arc;

pub use error::{CacheError, CacheResult};
pub use keys::{CacheKeys, QuotaMetric};
pub use memory::MemoryCache;
#[cfg(feature = "redis")]
pub use redis::RedisCache;
pub use traits::{Cache, RateLimitResult};

use crate::config::CacheConfig;

/// Build the configured counter store.
pub async fn from_config(config: &CacheConfig) -> CacheResult<Arc<dyn Cache>> {
    match config {
        CacheConfig::Memory(cfg) => Ok(Arc::new(MemoryCache::new(cfg))),
        #[cfg(feature = "redis")]
        CacheConfig::Redis(cfg) => Ok(Arc::new(RedisCache::from_config(cfg).await?)),
    }
}
