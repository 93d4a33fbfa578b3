use std::path::Path;

use anyhow::{Context, Result};
use deadpool::managed::{self, Pool, RecycleResult};
use libsql::{Connection, Database, Error as LibsqlError};

use crate::config::DatabaseConfig;

/// Hands out libSQL connections to the pool, each tuned for concurrent use.
pub struct LibsqlManager {
    database: Database,
}

impl LibsqlManager {
    pub fn new(database: Database) -> Self {
        Self { database }
    }
}

impl managed::Manager for LibsqlManager {
    type Type = Connection;
    type Error = LibsqlError;

    async fn create(&self) -> Result<Self::Type, Self::Error> {
        let conn = self.database.connect()?;
        // Probe workers write concurrently; wait on the lock instead of failing fast.
        for pragma in ["PRAGMA busy_timeout = 5000", "PRAGMA journal_mode = WAL"] {
            conn.query(pragma, ()).await?.next().await?;
        }
        Ok(conn)
    }

    async fn recycle(
        &self,
        conn: &mut Self::Type,
        _: &managed::Metrics,
    ) -> RecycleResult<Self::Error> {
        let mut rows = conn.query("SELECT 1", ()).await?;
        rows.next().await?.ok_or(LibsqlError::QueryReturnedNoRows)?;
        Ok(())
    }
}

pub type LibsqlPool = Pool<LibsqlManager>;

/// Open (or create) the local database file and wrap it in a pool.
pub async fn open_pool(path: impl AsRef<Path>, max_size: usize) -> Result<LibsqlPool> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating database directory {}", parent.display()))?;
    }

    let database = libsql::Builder::new_local(path)
        .build()
        .await
        .with_context(|| format!("opening database {}", path.display()))?;

    let pool = Pool::builder(LibsqlManager::new(database)).max_size(max_size.max(1)).build()?;
    Ok(pool)
}

/// Pool built from the `[database]` config section.
pub async fn open_configured_pool(config: &DatabaseConfig) -> Result<LibsqlPool> {
    open_pool(&config.path, config.pool_size).await
}
