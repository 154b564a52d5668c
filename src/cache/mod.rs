pub mod error;
pub mod keys;
#[cfg(any(test, feature = "test-support"))]
pub mod memory;
pub mod redis;

pub use error::{CacheError, CacheResult};
pub use keys::CacheKeys;

use async_trait::async_trait;

use crate::models::KeyConfig;

/// One-hour TTL for a cached key configuration.
pub const KEY_CONFIG_TTL_SECS: u64 = 60 * 60;

/// One-minute sliding expiry for the admission rate-limit counter.
pub const RATE_LIMIT_TTL_SECS: u64 = 60;

/// Short-lived write-through cache of resolved key configurations.
///
/// Failures must never be fatal to the request path — callers catch
/// `CacheError` at the call site and fall back to the durable store,
/// logging at `warn`.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get_key_config(&self, hash: &str) -> CacheResult<Option<KeyConfig>>;
    async fn set_key_config(&self, hash: &str, config: &KeyConfig) -> CacheResult<()>;
    async fn delete_key_config(&self, hash: &str) -> CacheResult<()>;
    /// Atomic counter keyed per hash with a one-minute sliding expiry.
    /// Unused by the core proxy today; kept on the trait for whatever
    /// admission control calls it next.
    async fn increment_rate_limit(&self, hash: &str) -> CacheResult<i64>;
}
