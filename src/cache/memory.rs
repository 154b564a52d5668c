//! In-memory cache for tests (`test-support` feature).

use std::{
    collections::HashMap,
    sync::Mutex,
    time::{Duration, Instant},
};

use async_trait::async_trait;

use super::{Cache, CacheResult};
use crate::models::KeyConfig;

struct Entry {
    config: KeyConfig,
    expires_at: Instant,
}

#[derive(Default)]
pub struct MemoryCache {
    configs: Mutex<HashMap<String, Entry>>,
    rate_limits: Mutex<HashMap<String, (i64, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get_key_config(&self, hash: &str) -> CacheResult<Option<KeyConfig>> {
        let mut configs = self.configs.lock().unwrap();
        match configs.get(hash) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.config.clone())),
            Some(_) => {
                configs.remove(hash);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_key_config(&self, hash: &str, config: &KeyConfig) -> CacheResult<()> {
        self.configs.lock().unwrap().insert(
            hash.to_string(),
            Entry {
                config: config.clone(),
                expires_at: Instant::now() + Duration::from_secs(super::KEY_CONFIG_TTL_SECS),
            },
        );
        Ok(())
    }

    async fn delete_key_config(&self, hash: &str) -> CacheResult<()> {
        self.configs.lock().unwrap().remove(hash);
        Ok(())
    }

    async fn increment_rate_limit(&self, hash: &str) -> CacheResult<i64> {
        let mut limits = self.rate_limits.lock().unwrap();
        let now = Instant::now();
        let entry = limits.entry(hash.to_string()).or_insert((0, now));
        if entry.1 <= now {
            *entry = (0, now + Duration::from_secs(super::RATE_LIMIT_TTL_SECS));
        }
        entry.0 += 1;
        Ok(entry.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap as Map;
    use uuid::Uuid;

    fn sample_config() -> KeyConfig {
        KeyConfig {
            key_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: "test".into(),
            allowed_models: vec![],
            budget_cap: None,
            current_spend: 0.0,
            secrets: Map::new(),
        }
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let cache = MemoryCache::new();
        let config = sample_config();
        cache.set_key_config("h", &config).await.unwrap();
        let got = cache.get_key_config("h").await.unwrap().unwrap();
        assert_eq!(got.key_id, config.key_id);
    }

    #[tokio::test]
    async fn delete_removes_entry() {
        let cache = MemoryCache::new();
        cache.set_key_config("h", &sample_config()).await.unwrap();
        cache.delete_key_config("h").await.unwrap();
        assert!(cache.get_key_config("h").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rate_limit_increments() {
        let cache = MemoryCache::new();
        assert_eq!(cache.increment_rate_limit("k").await.unwrap(), 1);
        assert_eq!(cache.increment_rate_limit("k").await.unwrap(), 2);
    }
}
