//! # consilium-db
//!
//! PostgreSQL persistence layer for the Consilium document registry.
//!
//! Provides the connection pool, embedded migrations, and the `PgJobStore` /
//! `PgDocumentStore` implementations of the consilium-core storage traits.

pub mod documents;
pub mod jobs;
pub mod pool;

pub use documents::PgDocumentStore;
pub use jobs::PgJobStore;
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, PoolConfig};

use consilium_core::Result;
use sqlx::PgPool;

/// Embedded schema migrations.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Run all pending migrations.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    MIGRATOR
        .run(pool)
        .await
        .map_err(|e| consilium_core::Error::Database(e.into()))?;
    Ok(())
}
