pub mod error;
pub mod postgres;
pub mod repos;
#[cfg(any(test, feature = "test-support"))]
pub mod memory;

use std::sync::Arc;

pub use error::{DbError, DbResult};
pub use repos::*;

use crate::config::DatabaseConfig;

/// Cached repository trait objects, built once at startup (teacher's
/// `CachedRepos` pattern — avoids reconstructing a repo on every access).
struct CachedRepos {
    users: Arc<dyn UserRepo>,
    virtual_keys: Arc<dyn VirtualKeyRepo>,
    providers: Arc<dyn UserProviderRepo>,
    usage: Arc<dyn UsageRepo>,
}

/// Durable relational store, backed by Postgres. Bounded connection
/// pool: 25 open / 5 idle / 5-minute max lifetime, matching sizing.
pub struct DbPool {
    pg: sqlx::PgPool,
    repos: CachedRepos,
}

impl DbPool {
    pub async fn from_config(config: &DatabaseConfig) -> DbResult<Self> {
        let pg = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .max_lifetime(std::time::Duration::from_secs(5 * 60))
            .connect(&config.url)
            .await?;
        Ok(Self::from_postgres(pg))
    }

    pub fn from_postgres(pg: sqlx::PgPool) -> Self {
        let repos = CachedRepos {
            users: Arc::new(postgres::PgUserRepo::new(pg.clone())),
            virtual_keys: Arc::new(postgres::PgVirtualKeyRepo::new(pg.clone())),
            providers: Arc::new(postgres::PgUserProviderRepo::new(pg.clone())),
            usage: Arc::new(postgres::PgUsageRepo::new(pg.clone())),
        };
        Self { pg, repos }
    }

    pub async fn run_migrations(&self) -> DbResult<()> {
        sqlx::migrate!("./migrations").run(&self.pg).await?;
        Ok(())
    }

    pub async fn ping(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pg).await.is_ok()
    }

    pub fn users(&self) -> Arc<dyn UserRepo> {
        self.repos.users.clone()
    }

    pub fn virtual_keys(&self) -> Arc<dyn VirtualKeyRepo> {
        self.repos.virtual_keys.clone()
    }

    pub fn providers(&self) -> Arc<dyn UserProviderRepo> {
        self.repos.providers.clone()
    }

    pub fn usage(&self) -> Arc<dyn UsageRepo> {
        self.repos.usage.clone()
    }
}
