//! # lovejournal-db
//!
//! PostgreSQL document store for the Love Journal backend.
//!
//! This crate provides:
//! - Connection pool management
//! - Repository implementations for every collection, addressed through the
//!   environment-prefixed table names in [`Collections`]
//! - An in-memory store implementing the same traits
//!
//! ## Example
//!
//! ```rust,ignore
//! use lovejournal_db::{Database, Environment};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::connect("postgres://localhost/lovejournal", Environment::Development).await?;
//!     db.migrate().await?;
//!
//!     let store = db.document_store();
//!     let counts = store.users.count_by_status().await?;
//!     println!("{} active users", counts.active);
//!     Ok(())
//! }
//! ```
pub mod audit;
pub mod events;
pub mod memories;
pub mod memory;
pub mod pool;
pub mod stats;
pub mod users;

use std::sync::Arc;

// Re-export core types
pub use lovejournal_core::*;

pub use audit::PgAuditRepository;
pub use events::{PgEffectRepository, PgEventRepository};
pub use memories::PgMemoryRepository;
pub use memory::InMemoryStore;
pub use pool::{create_pool, create_pool_with_config, PoolConfig, APPLICATION_NAME};
pub use stats::PgStatsRepository;
pub use users::PgUserRepository;

/// Combined database context with all repositories for one environment.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Table names the repositories were built against.
    pub collections: Collections,
    pub users: PgUserRepository,
    pub memories: PgMemoryRepository,
    pub events: PgEventRepository,
    pub effects: PgEffectRepository,
    /// Per-user and application-wide counts.
    pub stats: PgStatsRepository,
    /// Job run audit (latest run per job plus history).
    pub audit: PgAuditRepository,
}

impl Database {
    /// Create a new Database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>, env: Environment) -> Self {
        let collections = Collections::for_env(env);
        Self {
            users: PgUserRepository::new(pool.clone(), &collections.users),
            memories: PgMemoryRepository::new(pool.clone(), &collections.memories),
            events: PgEventRepository::new(pool.clone(), &collections.events),
            effects: PgEffectRepository::new(pool.clone(), &collections.effects),
            stats: PgStatsRepository::new(
                pool.clone(),
                &collections.user_stats,
                &collections.app_stats,
            ),
            audit: PgAuditRepository::new(
                pool.clone(),
                &collections.job_stats,
                &collections.job_history,
            ),
            collections,
            pool,
        }
    }

    /// Create a new Database instance by connecting to the given URL.
    pub async fn connect(url: &str, env: Environment) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool, env))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(
        url: &str,
        env: Environment,
        config: PoolConfig,
    ) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool, env))
    }

    /// Run pending migrations.
    ///
    /// Creates the tables for both environment prefixes.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }

    /// Bundle the repositories as trait objects.
    pub fn document_store(&self) -> DocumentStore {
        DocumentStore {
            users: Arc::new(self.users.clone()),
            memories: Arc::new(self.memories.clone()),
            events: Arc::new(self.events.clone()),
            effects: Arc::new(self.effects.clone()),
            stats: Arc::new(self.stats.clone()),
            audit: Arc::new(self.audit.clone()),
        }
    }
}
