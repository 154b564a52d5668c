//! Cache key naming: `key_config:<hash>`, `rate_limit:<hash>`.

pub struct CacheKeys;

impl CacheKeys {
    pub fn key_config(hash: &str) -> String {
        format!("key_config:{hash}")
    }

    pub fn rate_limit(hash: &str) -> String {
        format!("rate_limit:{hash}")
    }
}
