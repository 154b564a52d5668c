use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type CacheResult<T> = Result<T, CacheError>;
