use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Timed out after {0}s connecting to the counter store")]
    Timeout(u64),

    #[error("Counter store is full ({0} live counters)")]
    Full(usize),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type CacheResult<T> = Result<T, CacheError>;
