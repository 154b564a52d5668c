//! In-memory relational store for tests that don't need a live Postgres
//! instance (`test-support` feature).

use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    db::{
        error::{DbError, DbResult},
        repos::{NewVirtualKey, UsageRepo, UserProviderRepo, UserRepo, VirtualKeyPatch, VirtualKeyRepo},
    },
    models::{DailyStat, ProviderKind, User, UserProvider, VirtualKey},
};

#[derive(Default)]
pub struct MemoryDb {
    users: Mutex<HashMap<Uuid, User>>,
    virtual_keys: Mutex<HashMap<Uuid, VirtualKey>>,
    providers: Mutex<HashMap<(Uuid, ProviderKind), UserProvider>>,
    daily_stats: Mutex<HashMap<(Uuid, NaiveDate), DailyStat>>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepo for MemoryDb {
    async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        _ct: CancellationToken,
    ) -> DbResult<User> {
        let mut users = self.users.lock().unwrap();
        if users.values().any(|u| u.email == email) {
            return Err(DbError::Conflict(format!("email already registered: {email}")));
        }
        let user = User {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            created_at: Utc::now(),
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn get_user_by_email(
        &self,
        email: &str,
        _ct: CancellationToken,
    ) -> DbResult<Option<User>> {
        Ok(self.users.lock().unwrap().values().find(|u| u.email == email).cloned())
    }

    async fn get_user_by_id(&self, id: Uuid, _ct: CancellationToken) -> DbResult<Option<User>> {
        Ok(self.users.lock().unwrap().get(&id).cloned())
    }
}

#[async_trait]
impl VirtualKeyRepo for MemoryDb {
    async fn create_virtual_key(
        &self,
        input: NewVirtualKey,
        _ct: CancellationToken,
    ) -> DbResult<VirtualKey> {
        let key = VirtualKey {
            id: Uuid::new_v4(),
            user_id: input.user_id,
            name: input.name,
            token_hash: input.token_hash,
            allowed_models: input.allowed_models,
            budget_cap: input.budget_cap,
            current_spend: 0.0,
            created_at: Utc::now(),
            revoked_at: None,
        };
        self.virtual_keys.lock().unwrap().insert(key.id, key.clone());
        Ok(key)
    }

    async fn get_virtual_key_by_hash(
        &self,
        hash: &str,
        _ct: CancellationToken,
    ) -> DbResult<Option<VirtualKey>> {
        Ok(self
            .virtual_keys
            .lock()
            .unwrap()
            .values()
            .find(|k| k.token_hash == hash && !k.is_revoked())
            .cloned())
    }

    async fn get_virtual_key_by_hash_any(
        &self,
        hash: &str,
        _ct: CancellationToken,
    ) -> DbResult<Option<VirtualKey>> {
        Ok(self
            .virtual_keys
            .lock()
            .unwrap()
            .values()
            .find(|k| k.token_hash == hash)
            .cloned())
    }

    async fn get_virtual_key_by_id(
        &self,
        id: Uuid,
        _ct: CancellationToken,
    ) -> DbResult<Option<VirtualKey>> {
        Ok(self.virtual_keys.lock().unwrap().get(&id).cloned())
    }

    async fn list_virtual_keys_by_user(
        &self,
        user_id: Uuid,
        _ct: CancellationToken,
    ) -> DbResult<Vec<VirtualKey>> {
        Ok(self
            .virtual_keys
            .lock()
            .unwrap()
            .values()
            .filter(|k| k.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn revoke_virtual_key(&self, id: Uuid, _ct: CancellationToken) -> DbResult<()> {
        let mut keys = self.virtual_keys.lock().unwrap();
        let key = keys.get_mut(&id).ok_or(DbError::NotFound)?;
        key.revoked_at = Some(Utc::now());
        Ok(())
    }

    async fn update_virtual_key(
        &self,
        id: Uuid,
        patch: VirtualKeyPatch,
        _ct: CancellationToken,
    ) -> DbResult<()> {
        let mut keys = self.virtual_keys.lock().unwrap();
        let key = keys.get_mut(&id).ok_or(DbError::NotFound)?;
        if let Some(name) = patch.name {
            key.name = name;
        }
        if let Some(patterns) = patch.allowed_models {
            key.allowed_models = patterns;
        }
        if let Some(cap) = patch.budget_cap {
            key.budget_cap = cap;
        }
        Ok(())
    }

    async fn increment_key_spend(
        &self,
        id: Uuid,
        delta: f64,
        _ct: CancellationToken,
    ) -> DbResult<()> {
        let mut keys = self.virtual_keys.lock().unwrap();
        let key = keys.get_mut(&id).ok_or(DbError::NotFound)?;
        key.current_spend += delta;
        Ok(())
    }
}

#[async_trait]
impl UserProviderRepo for MemoryDb {
    async fn set_user_provider(
        &self,
        user_id: Uuid,
        kind: ProviderKind,
        ciphertext: Vec<u8>,
        _ct: CancellationToken,
    ) -> DbResult<()> {
        let now = Utc::now();
        let mut providers = self.providers.lock().unwrap();
        providers
            .entry((user_id, kind))
            .and_modify(|p| {
                p.ciphertext = ciphertext.clone();
                p.updated_at = now;
            })
            .or_insert(UserProvider {
                user_id,
                provider: kind,
                ciphertext,
                created_at: now,
                updated_at: now,
            });
        Ok(())
    }

    async fn get_user_providers(
        &self,
        user_id: Uuid,
        _ct: CancellationToken,
    ) -> DbResult<Vec<UserProvider>> {
        Ok(self
            .providers
            .lock()
            .unwrap()
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn remove_user_provider(
        &self,
        user_id: Uuid,
        kind: ProviderKind,
        _ct: CancellationToken,
    ) -> DbResult<()> {
        self.providers.lock().unwrap().remove(&(user_id, kind));
        Ok(())
    }
}

#[async_trait]
impl UsageRepo for MemoryDb {
    async fn upsert_daily_stat(
        &self,
        key_id: Uuid,
        tokens: i64,
        cost: f64,
        _ct: CancellationToken,
    ) -> DbResult<()> {
        let date = Utc::now().date_naive();
        let mut stats = self.daily_stats.lock().unwrap();
        stats
            .entry((key_id, date))
            .and_modify(|s| {
                s.total_tokens += tokens;
                s.total_cost += cost;
            })
            .or_insert(DailyStat {
                key_id,
                date,
                total_tokens: tokens,
                total_cost: cost,
            });
        Ok(())
    }

    async fn get_daily_stats(
        &self,
        user_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
        ct: CancellationToken,
    ) -> DbResult<Vec<DailyStat>> {
        let key_ids: std::collections::HashSet<Uuid> = self
            .list_virtual_keys_by_user(user_id, ct)
            .await?
            .into_iter()
            .map(|k| k.id)
            .collect();
        Ok(self
            .daily_stats
            .lock()
            .unwrap()
            .values()
            .filter(|s| key_ids.contains(&s.key_id) && s.date >= from && s.date <= to)
            .cloned()
            .collect())
    }

    async fn get_user_spend_total(&self, user_id: Uuid, ct: CancellationToken) -> DbResult<f64> {
        Ok(self
            .list_virtual_keys_by_user(user_id, ct)
            .await?
            .iter()
            .map(|k| k.current_spend)
            .sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_and_lookup_user() {
        let db = MemoryDb::new();
        let user = db
            .create_user("a@example.com", "hash", CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(
            db.get_user_by_email("a@example.com", CancellationToken::new())
                .await
                .unwrap()
                .unwrap()
                .id,
            user.id
        );
    }

    #[tokio::test]
    async fn duplicate_email_conflicts() {
        let db = MemoryDb::new();
        db.create_user("a@example.com", "h", CancellationToken::new())
            .await
            .unwrap();
        let err = db
            .create_user("a@example.com", "h2", CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)));
    }

    #[tokio::test]
    async fn revoked_key_not_returned_by_hash() {
        let db = MemoryDb::new();
        let key = db
            .create_virtual_key(
                NewVirtualKey {
                    user_id: Uuid::new_v4(),
                    name: "k".into(),
                    token_hash: "abc".into(),
                    allowed_models: vec![],
                    budget_cap: None,
                },
                CancellationToken::new(),
            )
            .await
            .unwrap();
        db.revoke_virtual_key(key.id, CancellationToken::new())
            .await
            .unwrap();
        assert!(
            db.get_virtual_key_by_hash("abc", CancellationToken::new())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn daily_stat_accumulates() {
        let db = MemoryDb::new();
        let key_id = Uuid::new_v4();
        db.upsert_daily_stat(key_id, 10, 1.5, CancellationToken::new())
            .await
            .unwrap();
        db.upsert_daily_stat(key_id, 5, 0.5, CancellationToken::new())
            .await
            .unwrap();
        let stats = db.daily_stats.lock().unwrap();
        let stat = stats.values().find(|s| s.key_id == key_id).unwrap();
        assert_eq!(stat.total_tokens, 15);
        assert_eq!(stat.total_cost, 2.0);
    }
}
