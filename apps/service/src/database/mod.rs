/// Database abstraction layer
///
/// This module provides a unified interface for persisting endpoints,
/// check history, incidents and notification channels on libSQL.

pub mod migrations;
pub mod models;
pub mod repository;

pub use repository::{Database, DatabaseImpl};

use std::path::Path;

use anyhow::{Result, anyhow};

use crate::pool::open_pool;

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> Result<()> {
    migrations::run_migrations(conn).await
}

/// Open the database file, bring the schema up to date and return the repository.
pub async fn open_database(path: impl AsRef<Path>, pool_size: usize) -> Result<DatabaseImpl> {
    let pool = open_pool(path, pool_size).await?;
    {
        let conn = pool.get().await.map_err(|e| anyhow!("database pool unavailable: {e}"))?;
        initialize_database(&conn).await?;
    }
    Ok(DatabaseImpl::new_from_pool(pool))
}
