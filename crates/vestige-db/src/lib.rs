//! # vestige-db
//!
//! Storage layer for vestige.
//!
//! Provides PostgreSQL implementations of the store traits from
//! `vestige-core`, in-memory implementations with the same semantics, a
//! retrying store decorator, and pool management.

pub mod images;
pub mod jobs;
pub mod memory;
pub mod pool;
pub mod relationships;
pub mod retry;

/// Shared by this crate's `tests/` and by downstream integration tests.
pub mod test_fixtures;

pub use vestige_core::*;

pub use images::PgImageDirectory;
pub use jobs::PgJobStore;
pub use memory::{MemoryImageDirectory, MemoryJobStore, MemoryRelationshipStore};
pub use pool::{connect_pool, PoolConfig};
pub use relationships::PgRelationshipStore;
pub use retry::{RetryPolicy, Retrying};

/// PostgreSQL-backed stores sharing one pool.
#[derive(Clone)]
pub struct Database {
    pub pool: sqlx::Pool<sqlx::Postgres>,
    pub jobs: PgJobStore,
    pub relationships: PgRelationshipStore,
    /// Read and flag access to the upload service's `image` table.
    pub images: PgImageDirectory,
}

impl Database {
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            jobs: PgJobStore::new(pool.clone()),
            relationships: PgRelationshipStore::new(pool.clone()),
            images: PgImageDirectory::new(pool.clone()),
            pool,
        }
    }

    /// Connect with [`PoolConfig::default`].
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_config(url, PoolConfig::default()).await
    }

    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = connect_pool(url, &config).await?;
        Ok(Self::new(pool))
    }

    /// Apply the embedded `migrations/` directory.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }
}
