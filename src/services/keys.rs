//! Key Service: token issuance, lookup/validation, policy evaluation,
//! cache/DB coordination, spend updates. A thin coordination layer over the
//! repo traits rather than a store of its own.

use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    cache::Cache,
    crypto::{self, CryptoError, MasterKey},
    db::{DbError, DbPool, NewVirtualKey, UsageRepo, UserProviderRepo, VirtualKeyPatch, VirtualKeyRepo},
    models::{KeyConfig, ProviderKind},
    services::patterns::is_model_allowed,
};

#[derive(Debug, Error)]
pub enum KeyServiceError {
    #[error("token invalid")]
    Invalid,
    #[error("token revoked")]
    Revoked,
    #[error("provider not configured")]
    ProviderNotConfigured,
    #[error("budget exceeded")]
    BudgetExceeded,
    #[error("unauthorized")]
    Unauthorized,
    #[error(transparent)]
    Db(#[from] DbError),
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

pub struct CreateKeyRequest {
    pub name: String,
    pub allowed_models: Vec<String>,
    pub budget_cap: Option<f64>,
}

pub struct CreatedKey {
    pub id: Uuid,
    pub name: String,
    pub allowed_models: Vec<String>,
    pub token: String,
    pub created_at: DateTime<Utc>,
}

pub struct UpdateKeyPatch {
    pub name: Option<String>,
    pub allowed_models: Option<Vec<String>>,
    pub budget_cap: Option<Option<f64>>,
}

/// Holds only the collaborators it actually needs, injected explicitly from
/// a composition root rather than reaching into a shared `DbPool` — the
/// REDESIGN FLAGS note on process-wide state.
pub struct KeyService {
    virtual_keys: Arc<dyn VirtualKeyRepo>,
    providers: Arc<dyn UserProviderRepo>,
    usage: Arc<dyn UsageRepo>,
    cache: Arc<dyn Cache>,
    master_key: MasterKey,
}

impl KeyService {
    pub fn new(db: &DbPool, cache: Arc<dyn Cache>, master_key: MasterKey) -> Self {
        Self {
            virtual_keys: db.virtual_keys(),
            providers: db.providers(),
            usage: db.usage(),
            cache,
            master_key,
        }
    }

    #[cfg(any(test, feature = "test-support"))]
    pub fn from_repos(
        virtual_keys: Arc<dyn VirtualKeyRepo>,
        providers: Arc<dyn UserProviderRepo>,
        usage: Arc<dyn UsageRepo>,
        cache: Arc<dyn Cache>,
        master_key: MasterKey,
    ) -> Self {
        Self { virtual_keys, providers, usage, cache, master_key }
    }

    pub async fn create_key(
        &self,
        user_id: Uuid,
        req: CreateKeyRequest,
        ct: CancellationToken,
    ) -> Result<CreatedKey, KeyServiceError> {
        let token = crypto::mint_token();
        let hash = crypto::hash_token(&token);
        let record = self
            .virtual_keys
            .create_virtual_key(
                NewVirtualKey {
                    user_id,
                    name: req.name,
                    token_hash: hash,
                    allowed_models: req.allowed_models,
                    budget_cap: req.budget_cap,
                },
                ct,
            )
            .await?;
        Ok(CreatedKey {
            id: record.id,
            name: record.name,
            allowed_models: record.allowed_models,
            token,
            created_at: record.created_at,
        })
    }

    /// lookup path: cache → DB → decrypt providers → write back.
    pub async fn validate_key(
        &self,
        token: &str,
        ct: CancellationToken,
    ) -> Result<KeyConfig, KeyServiceError> {
        if !token.starts_with(crypto::TOKEN_PREFIX) {
            return Err(KeyServiceError::Invalid);
        }
        let hash = crypto::hash_token(token);

        match self.cache.get_key_config(&hash).await {
            Ok(Some(config)) => return Ok(config),
            Ok(None) => {}
            Err(err) => tracing::warn!(error = %err, "cache get_key_config failed, falling back to db"),
        }

        let record = self
            .virtual_keys
            .get_virtual_key_by_hash_any(&hash, ct.clone())
            .await?
            .ok_or(KeyServiceError::Invalid)?;
        if record.is_revoked() {
            return Err(KeyServiceError::Revoked);
        }

        let providers = self
            .providers
            .get_user_providers(record.user_id, ct)
            .await?;
        let mut secrets = HashMap::with_capacity(providers.len());
        for provider in providers {
            // A decryption failure is a fatal 500 — never substitute or skip.
            let plaintext = crypto::open(&self.master_key, &provider.ciphertext)?;
            let plaintext = String::from_utf8(plaintext)
                .map_err(|_| KeyServiceError::Crypto(CryptoError::InvalidCiphertext))?;
            secrets.insert(provider.provider, plaintext);
        }

        let config = KeyConfig {
            key_id: record.id,
            user_id: record.user_id,
            name: record.name,
            allowed_models: record.allowed_models,
            budget_cap: record.budget_cap,
            current_spend: record.current_spend,
            secrets,
        };

        if let Err(err) = self.cache.set_key_config(&hash, &config).await {
            tracing::warn!(error = %err, "cache set_key_config failed");
        }

        Ok(config)
    }

    pub fn is_model_allowed(&self, config: &KeyConfig, full_model: &str) -> bool {
        is_model_allowed(&config.allowed_models, full_model)
    }

    pub fn get_provider_key(
        &self,
        config: &KeyConfig,
        provider: ProviderKind,
    ) -> Result<String, KeyServiceError> {
        config
            .secrets
            .get(&provider)
            .cloned()
            .ok_or(KeyServiceError::ProviderNotConfigured)
    }

    /// Estimated cost on the admission path is conservatively 0; this
    /// check only rejects keys that are already over budget.
    pub fn check_budget(&self, config: &KeyConfig, estimated_cost: f64) -> Result<(), KeyServiceError> {
        if let Some(cap) = config.budget_cap {
            if config.current_spend + estimated_cost > cap {
                return Err(KeyServiceError::BudgetExceeded);
            }
        }
        Ok(())
    }

    /// `IncrementKeySpend` + `UpsertDailyStat`; both are attempted even if
    /// one fails, since spend is eventually consistent with logs.
    pub async fn update_spend(&self, key_id: Uuid, cost: f64, tokens: i64) {
        if let Err(err) = self
            .virtual_keys
            .increment_key_spend(key_id, cost, CancellationToken::new())
            .await
        {
            tracing::warn!(error = %err, %key_id, "increment_key_spend failed");
        }
        if let Err(err) = self
            .usage
            .upsert_daily_stat(key_id, tokens, cost, CancellationToken::new())
            .await
        {
            tracing::warn!(error = %err, %key_id, "upsert_daily_stat failed");
        }
    }

    pub async fn revoke_key(
        &self,
        id: Uuid,
        user_id: Uuid,
        ct: CancellationToken,
    ) -> Result<(), KeyServiceError> {
        let key = self
            .virtual_keys
            .get_virtual_key_by_id(id, ct.clone())
            .await?
            .ok_or(DbError::NotFound)?;
        if key.user_id != user_id {
            return Err(KeyServiceError::Unauthorized);
        }
        self.virtual_keys.revoke_virtual_key(id, ct).await?;
        if let Err(err) = self.cache.delete_key_config(&key.token_hash).await {
            tracing::warn!(error = %err, %id, "cache delete_key_config failed after revoke");
        }
        Ok(())
    }

    pub async fn update_key(
        &self,
        id: Uuid,
        user_id: Uuid,
        patch: UpdateKeyPatch,
        ct: CancellationToken,
    ) -> Result<(), KeyServiceError> {
        let key = self
            .virtual_keys
            .get_virtual_key_by_id(id, ct.clone())
            .await?
            .ok_or(DbError::NotFound)?;
        if key.user_id != user_id {
            return Err(KeyServiceError::Unauthorized);
        }
        self.virtual_keys
            .update_virtual_key(
                id,
                VirtualKeyPatch {
                    name: patch.name,
                    allowed_models: patch.allowed_models,
                    budget_cap: patch.budget_cap,
                },
                ct,
            )
            .await?;
        if let Err(err) = self.cache.delete_key_config(&key.token_hash).await {
            tracing::warn!(error = %err, %id, "cache delete_key_config failed after update");
        }
        Ok(())
    }

    /// Seals and upserts a provider credential, then invalidates every
    /// cached `KeyConfig` belonging to the user so stale plaintext secrets
    /// are never served after rotation.
    pub async fn set_user_provider(
        &self,
        user_id: Uuid,
        kind: ProviderKind,
        plaintext: &str,
        ct: CancellationToken,
    ) -> Result<(), KeyServiceError> {
        let ciphertext = crypto::seal(&self.master_key, plaintext.as_bytes());
        self.providers
            .set_user_provider(user_id, kind, ciphertext, ct.clone())
            .await?;
        self.invalidate_user_cache(user_id, ct).await?;
        Ok(())
    }

    pub async fn remove_user_provider(
        &self,
        user_id: Uuid,
        kind: ProviderKind,
        ct: CancellationToken,
    ) -> Result<(), KeyServiceError> {
        self.providers
            .remove_user_provider(user_id, kind, ct.clone())
            .await?;
        self.invalidate_user_cache(user_id, ct).await?;
        Ok(())
    }

    async fn invalidate_user_cache(
        &self,
        user_id: Uuid,
        ct: CancellationToken,
    ) -> Result<(), KeyServiceError> {
        let keys = self.virtual_keys.list_virtual_keys_by_user(user_id, ct).await?;
        for key in keys {
            if let Err(err) = self.cache.delete_key_config(&key.token_hash).await {
                tracing::warn!(error = %err, key_id = %key.id, "cache invalidation failed after provider change");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cache::memory::MemoryCache, db::memory::MemoryDb};

    fn service() -> KeyService {
        let db = Arc::new(MemoryDb::new());
        KeyService::from_repos(
            db.clone(),
            db.clone(),
            db,
            Arc::new(MemoryCache::new()),
            MasterKey::from_bytes(&[9u8; 32]).unwrap(),
        )
    }

    #[tokio::test]
    async fn validate_key_rejects_malformed_prefix() {
        let svc = service();
        let err = svc
            .validate_key("not-a-lumina-token", CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, KeyServiceError::Invalid));
    }

    #[tokio::test]
    async fn create_then_validate_round_trips() {
        let svc = service();
        let user_id = Uuid::new_v4();
        let created = svc
            .create_key(
                user_id,
                CreateKeyRequest {
                    name: "test key".into(),
                    allowed_models: vec![],
                    budget_cap: None,
                },
                CancellationToken::new(),
            )
            .await
            .unwrap();
        let config = svc.validate_key(&created.token, CancellationToken::new()).await.unwrap();
        assert_eq!(config.key_id, created.id);
    }

    #[tokio::test]
    async fn revoke_then_validate_returns_revoked_regardless_of_cache() {
        let svc = service();
        let user_id = Uuid::new_v4();
        let created = svc
            .create_key(
                user_id,
                CreateKeyRequest { name: "k".into(), allowed_models: vec![], budget_cap: None },
                CancellationToken::new(),
            )
            .await
            .unwrap();
        // warm the cache
        svc.validate_key(&created.token, CancellationToken::new()).await.unwrap();
        svc.revoke_key(created.id, user_id, CancellationToken::new()).await.unwrap();
        let err = svc
            .validate_key(&created.token, CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, KeyServiceError::Revoked));
    }

    #[tokio::test]
    async fn budget_cap_zero_rejects_nonzero_cost() {
        let svc = service();
        let config = KeyConfig {
            key_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            name: "k".into(),
            allowed_models: vec![],
            budget_cap: Some(0.0),
            current_spend: 0.0,
            secrets: HashMap::new(),
        };
        assert!(svc.check_budget(&config, 0.0001).is_err());
        assert!(svc.check_budget(&config, 0.0).is_ok());
    }

    #[tokio::test]
    async fn set_user_provider_invalidates_all_cached_keys_for_user() {
        let svc = service();
        let user_id = Uuid::new_v4();
        let created = svc
            .create_key(
                user_id,
                CreateKeyRequest { name: "k".into(), allowed_models: vec![], budget_cap: None },
                CancellationToken::new(),
            )
            .await
            .unwrap();
        svc.validate_key(&created.token, CancellationToken::new()).await.unwrap();
        let hash = crypto::hash_token(&created.token);
        assert!(svc.cache.get_key_config(&hash).await.unwrap().is_some());

        svc.set_user_provider(user_id, ProviderKind::Openai, "sk-test", CancellationToken::new())
            .await
            .unwrap();
        assert!(svc.cache.get_key_config(&hash).await.unwrap().is_none());
    }
}
