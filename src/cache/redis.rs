//! Redis-backed cache. A single multiplexed, auto-reconnecting
//! connection is shared across the process — no cluster mode, matching
//! Lumina's single-region deployment target.

use async_trait::async_trait;
use redis::{AsyncCommands, Script, aio::ConnectionManager};

use super::{
    Cache, CacheResult, KEY_CONFIG_TTL_SECS, RATE_LIMIT_TTL_SECS, error::CacheError, keys::CacheKeys,
};
use crate::{metrics, models::KeyConfig};

/// Atomic increment that also arms the TTL only on first creation, so a
/// window doesn't get pushed out on every hit.
const INCR_PRESERVE_TTL_SCRIPT: &str = r#"
local key = KEYS[1]
local ttl = tonumber(ARGV[1])
local new_value = redis.call('INCR', key)
if redis.call('TTL', key) < 0 then
    redis.call('EXPIRE', key, ttl)
end
return new_value
"#;

pub struct RedisCache {
    conn: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(url: &str) -> CacheResult<Self> {
        let client = redis::Client::open(url)?;
        let conn = client.get_connection_manager().await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get_key_config(&self, hash: &str) -> CacheResult<Option<KeyConfig>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(CacheKeys::key_config(hash)).await?;
        match raw {
            Some(json) => {
                metrics::record_cache_hit();
                Ok(Some(serde_json::from_str(&json).map_err(CacheError::Json)?))
            }
            None => {
                metrics::record_cache_miss();
                Ok(None)
            }
        }
    }

    async fn set_key_config(&self, hash: &str, config: &KeyConfig) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(config)?;
        conn.set_ex::<_, _, ()>(CacheKeys::key_config(hash), json, KEY_CONFIG_TTL_SECS)
            .await?;
        Ok(())
    }

    async fn delete_key_config(&self, hash: &str) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(CacheKeys::key_config(hash)).await?;
        Ok(())
    }

    async fn increment_rate_limit(&self, hash: &str) -> CacheResult<i64> {
        let mut conn = self.conn.clone();
        let value: i64 = Script::new(INCR_PRESERVE_TTL_SCRIPT)
            .key(CacheKeys::rate_limit(hash))
            .arg(RATE_LIMIT_TTL_SECS)
            .invoke_async(&mut conn)
            .await?;
        Ok(value)
    }
}
