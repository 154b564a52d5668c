//! Relational store adapter contract.
//!
//! Every operation takes a `CancellationToken` so server shutdown propagates
//! into in-flight DB calls. Writes are single-statement upserts; the
//! adapter makes no multi-step transactional guarantees beyond that.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    db::error::DbResult,
    models::{DailyStat, ProviderKind, User, UserProvider, VirtualKey},
};

/// Fields supplied when minting a new virtual key; the token itself is
/// generated by the caller (Key Service) and passed in already hashed.
pub struct NewVirtualKey {
    pub user_id: Uuid,
    pub name: String,
    pub token_hash: String,
    pub allowed_models: Vec<String>,
    pub budget_cap: Option<f64>,
}

/// Partial update; `None` fields are left untouched (`UpdateVirtualKey`).
#[derive(Default)]
pub struct VirtualKeyPatch {
    pub name: Option<String>,
    pub allowed_models: Option<Vec<String>>,
    pub budget_cap: Option<Option<f64>>,
}

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        ct: CancellationToken,
    ) -> DbResult<User>;
    async fn get_user_by_email(&self, email: &str, ct: CancellationToken)
    -> DbResult<Option<User>>;
    async fn get_user_by_id(&self, id: Uuid, ct: CancellationToken) -> DbResult<Option<User>>;
}

#[async_trait]
pub trait VirtualKeyRepo: Send + Sync {
    async fn create_virtual_key(
        &self,
        input: NewVirtualKey,
        ct: CancellationToken,
    ) -> DbResult<VirtualKey>;
    /// Must return `None` if `revoked_at` is set.
    async fn get_virtual_key_by_hash(
        &self,
        hash: &str,
        ct: CancellationToken,
    ) -> DbResult<Option<VirtualKey>>;
    /// Same lookup, but returns the record regardless of revocation. The Key
    /// Service needs this to distinguish `invalid` (no such hash) from
    /// `revoked` (hash exists, `revoked_at` is set) on the `ValidateKey`
    /// miss path — a detail `GetVirtualKeyByHash` contract
    /// alone can't express once it filters revoked rows out.
    async fn get_virtual_key_by_hash_any(
        &self,
        hash: &str,
        ct: CancellationToken,
    ) -> DbResult<Option<VirtualKey>>;
    async fn get_virtual_key_by_id(
        &self,
        id: Uuid,
        ct: CancellationToken,
    ) -> DbResult<Option<VirtualKey>>;
    async fn list_virtual_keys_by_user(
        &self,
        user_id: Uuid,
        ct: CancellationToken,
    ) -> DbResult<Vec<VirtualKey>>;
    async fn revoke_virtual_key(&self, id: Uuid, ct: CancellationToken) -> DbResult<()>;
    async fn update_virtual_key(
        &self,
        id: Uuid,
        patch: VirtualKeyPatch,
        ct: CancellationToken,
    ) -> DbResult<()>;
    async fn increment_key_spend(
        &self,
        id: Uuid,
        delta: f64,
        ct: CancellationToken,
    ) -> DbResult<()>;
}

#[async_trait]
pub trait UserProviderRepo: Send + Sync {
    async fn set_user_provider(
        &self,
        user_id: Uuid,
        kind: ProviderKind,
        ciphertext: Vec<u8>,
        ct: CancellationToken,
    ) -> DbResult<()>;
    async fn get_user_providers(
        &self,
        user_id: Uuid,
        ct: CancellationToken,
    ) -> DbResult<Vec<UserProvider>>;
    async fn remove_user_provider(
        &self,
        user_id: Uuid,
        kind: ProviderKind,
        ct: CancellationToken,
    ) -> DbResult<()>;
}

#[async_trait]
pub trait UsageRepo: Send + Sync {
    async fn upsert_daily_stat(
        &self,
        key_id: Uuid,
        tokens: i64,
        cost: f64,
        ct: CancellationToken,
    ) -> DbResult<()>;
    async fn get_daily_stats(
        &self,
        user_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
        ct: CancellationToken,
    ) -> DbResult<Vec<DailyStat>>;
    async fn get_user_spend_total(
        &self,
        user_id: Uuid,
        ct: CancellationToken,
    ) -> DbResult<f64>;
}

/// Helper used by repos to stamp the current instant; kept in one place so
/// tests can reason about ordering without reaching for real wall-clock time.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}
