//! Postgres-backed implementations of the repo traits.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::{
    db::{
        error::{DbError, DbResult},
        repos::{NewVirtualKey, UsageRepo, UserProviderRepo, UserRepo, VirtualKeyPatch, VirtualKeyRepo},
    },
    models::{DailyStat, ProviderKind, User, UserProvider, VirtualKey},
};

fn parse_user(row: &PgRow) -> User {
    User {
        id: row.get("id"),
        email: row.get("email"),
        password_hash: row.get("password_hash"),
        created_at: row.get("created_at"),
    }
}

fn parse_virtual_key(row: &PgRow) -> VirtualKey {
    VirtualKey {
        id: row.get("id"),
        user_id: row.get("user_id"),
        name: row.get("name"),
        token_hash: row.get("token_hash"),
        allowed_models: row.get("allowed_models"),
        budget_cap: row.get("budget_cap"),
        current_spend: row.get("current_spend"),
        created_at: row.get("created_at"),
        revoked_at: row.get("revoked_at"),
    }
}

fn parse_provider(row: &PgRow) -> DbResult<UserProvider> {
    let kind_str: String = row.get("provider");
    let provider = ProviderKind::parse(&kind_str)
        .ok_or_else(|| DbError::Internal(format!("unknown provider kind in row: {kind_str}")))?;
    Ok(UserProvider {
        user_id: row.get("user_id"),
        provider,
        ciphertext: row.get("ciphertext"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

pub struct PgUserRepo {
    pool: PgPool,
}

impl PgUserRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepo for PgUserRepo {
    async fn create_user(
        &self,
        email: &str,
        password_hash: &str,
        _ct: CancellationToken,
    ) -> DbResult<User> {
        let row = sqlx::query(
            "INSERT INTO users (id, email, password_hash, created_at) \
             VALUES ($1, $2, $3, $4) RETURNING id, email, password_hash, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(password_hash)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                DbError::Conflict(format!("email already registered: {email}"))
            }
            other => DbError::Sqlx(other),
        })?;
        Ok(parse_user(&row))
    }

    async fn get_user_by_email(
        &self,
        email: &str,
        _ct: CancellationToken,
    ) -> DbResult<Option<User>> {
        let row = sqlx::query("SELECT id, email, password_hash, created_at FROM users WHERE email = $1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| parse_user(&r)))
    }

    async fn get_user_by_id(&self, id: Uuid, _ct: CancellationToken) -> DbResult<Option<User>> {
        let row = sqlx::query("SELECT id, email, password_hash, created_at FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| parse_user(&r)))
    }
}

pub struct PgVirtualKeyRepo {
    pool: PgPool,
}

impl PgVirtualKeyRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const VIRTUAL_KEY_COLUMNS: &str =
    "id, user_id, name, token_hash, allowed_models, budget_cap, current_spend, created_at, revoked_at";

#[async_trait]
impl VirtualKeyRepo for PgVirtualKeyRepo {
    async fn create_virtual_key(
        &self,
        input: NewVirtualKey,
        _ct: CancellationToken,
    ) -> DbResult<VirtualKey> {
        let row = sqlx::query(&format!(
            "INSERT INTO virtual_keys (id, user_id, name, token_hash, allowed_models, \
             budget_cap, current_spend, created_at, revoked_at) \
             VALUES ($1, $2, $3, $4, $5, $6, 0, $7, NULL) RETURNING {VIRTUAL_KEY_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(input.user_id)
        .bind(&input.name)
        .bind(&input.token_hash)
        .bind(&input.allowed_models)
        .bind(input.budget_cap)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(parse_virtual_key(&row))
    }

    async fn get_virtual_key_by_hash(
        &self,
        hash: &str,
        _ct: CancellationToken,
    ) -> DbResult<Option<VirtualKey>> {
        let row = sqlx::query(&format!(
            "SELECT {VIRTUAL_KEY_COLUMNS} FROM virtual_keys \
             WHERE token_hash = $1 AND revoked_at IS NULL"
        ))
        .bind(hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| parse_virtual_key(&r)))
    }

    async fn get_virtual_key_by_hash_any(
        &self,
        hash: &str,
        _ct: CancellationToken,
    ) -> DbResult<Option<VirtualKey>> {
        let row = sqlx::query(&format!("SELECT {VIRTUAL_KEY_COLUMNS} FROM virtual_keys WHERE token_hash = $1"))
            .bind(hash)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| parse_virtual_key(&r)))
    }

    async fn get_virtual_key_by_id(
        &self,
        id: Uuid,
        _ct: CancellationToken,
    ) -> DbResult<Option<VirtualKey>> {
        let row = sqlx::query(&format!("SELECT {VIRTUAL_KEY_COLUMNS} FROM virtual_keys WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| parse_virtual_key(&r)))
    }

    async fn list_virtual_keys_by_user(
        &self,
        user_id: Uuid,
        _ct: CancellationToken,
    ) -> DbResult<Vec<VirtualKey>> {
        let rows = sqlx::query(&format!(
            "SELECT {VIRTUAL_KEY_COLUMNS} FROM virtual_keys WHERE user_id = $1 ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(parse_virtual_key).collect())
    }

    async fn revoke_virtual_key(&self, id: Uuid, _ct: CancellationToken) -> DbResult<()> {
        sqlx::query("UPDATE virtual_keys SET revoked_at = $2 WHERE id = $1")
            .bind(id)
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn update_virtual_key(
        &self,
        id: Uuid,
        patch: VirtualKeyPatch,
        _ct: CancellationToken,
    ) -> DbResult<()> {
        if let Some(name) = patch.name {
            sqlx::query("UPDATE virtual_keys SET name = $2 WHERE id = $1")
                .bind(id)
                .bind(name)
                .execute(&self.pool)
                .await?;
        }
        if let Some(patterns) = patch.allowed_models {
            sqlx::query("UPDATE virtual_keys SET allowed_models = $2 WHERE id = $1")
                .bind(id)
                .bind(patterns)
                .execute(&self.pool)
                .await?;
        }
        if let Some(cap) = patch.budget_cap {
            sqlx::query("UPDATE virtual_keys SET budget_cap = $2 WHERE id = $1")
                .bind(id)
                .bind(cap)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    async fn increment_key_spend(
        &self,
        id: Uuid,
        delta: f64,
        _ct: CancellationToken,
    ) -> DbResult<()> {
        sqlx::query("UPDATE virtual_keys SET current_spend = current_spend + $2 WHERE id = $1")
            .bind(id)
            .bind(delta)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

pub struct PgUserProviderRepo {
    pool: PgPool,
}

impl PgUserProviderRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserProviderRepo for PgUserProviderRepo {
    async fn set_user_provider(
        &self,
        user_id: Uuid,
        kind: ProviderKind,
        ciphertext: Vec<u8>,
        _ct: CancellationToken,
    ) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO user_providers (user_id, provider, ciphertext, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $4) \
             ON CONFLICT (user_id, provider) DO UPDATE \
             SET ciphertext = EXCLUDED.ciphertext, updated_at = EXCLUDED.updated_at",
        )
        .bind(user_id)
        .bind(kind.as_str())
        .bind(ciphertext)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_user_providers(
        &self,
        user_id: Uuid,
        _ct: CancellationToken,
    ) -> DbResult<Vec<UserProvider>> {
        let rows = sqlx::query(
            "SELECT user_id, provider, ciphertext, created_at, updated_at \
             FROM user_providers WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(parse_provider).collect()
    }

    async fn remove_user_provider(
        &self,
        user_id: Uuid,
        kind: ProviderKind,
        _ct: CancellationToken,
    ) -> DbResult<()> {
        sqlx::query("DELETE FROM user_providers WHERE user_id = $1 AND provider = $2")
            .bind(user_id)
            .bind(kind.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

pub struct PgUsageRepo {
    pool: PgPool,
}

impl PgUsageRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UsageRepo for PgUsageRepo {
    async fn upsert_daily_stat(
        &self,
        key_id: Uuid,
        tokens: i64,
        cost: f64,
        _ct: CancellationToken,
    ) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO daily_stats (key_id, date, total_tokens, total_cost) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (key_id, date) DO UPDATE \
             SET total_tokens = daily_stats.total_tokens + EXCLUDED.total_tokens, \
                 total_cost = daily_stats.total_cost + EXCLUDED.total_cost",
        )
        .bind(key_id)
        .bind(Utc::now().date_naive())
        .bind(tokens)
        .bind(cost)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_daily_stats(
        &self,
        user_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
        _ct: CancellationToken,
    ) -> DbResult<Vec<DailyStat>> {
        let rows = sqlx::query(
            "SELECT ds.key_id, ds.date, ds.total_tokens, ds.total_cost \
             FROM daily_stats ds \
             JOIN virtual_keys vk ON vk.id = ds.key_id \
             WHERE vk.user_id = $1 AND ds.date BETWEEN $2 AND $3 \
             ORDER BY ds.date ASC",
        )
        .bind(user_id)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .iter()
            .map(|r| DailyStat {
                key_id: r.get("key_id"),
                date: r.get("date"),
                total_tokens: r.get("total_tokens"),
                total_cost: r.get("total_cost"),
            })
            .collect())
    }

    async fn get_user_spend_total(&self, user_id: Uuid, _ct: CancellationToken) -> DbResult<f64> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(current_spend), 0.0) AS total FROM virtual_keys WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.get("total"))
    }
}
