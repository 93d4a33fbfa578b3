//! Redis/Valkey cache backend

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};

use super::{BackendKind, CacheBackend};

/// Remote backend shared by every Beacon instance pointing at the same server.
///
/// All keys are namespaced with `key_prefix`, so `clear` only removes this
/// service's entries rather than flushing the whole database.
#[derive(Clone)]
pub struct RedisBackend {
    conn: ConnectionManager,
    key_prefix: String,
}

impl RedisBackend {
    /// Connect and verify the server answers `PING` within `timeout`.
    pub async fn connect(url: &str, key_prefix: &str, timeout: Duration) -> Result<Self> {
        let client = Client::open(url).with_context(|| format!("invalid redis url {url}"))?;

        let conn = tokio::time::timeout(timeout, ConnectionManager::new(client))
            .await
            .context("timed out connecting to redis")?
            .context("failed to connect to redis")?;

        let backend = Self { conn, key_prefix: key_prefix.to_string() };
        let mut conn = backend.conn.clone();
        let _: String = tokio::time::timeout(timeout, redis::cmd("PING").query_async(&mut conn))
            .await
            .context("timed out waiting for redis PING")??;

        Ok(backend)
    }

    fn prefixed_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Redis
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(self.prefixed_key(key)).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        // EX has one second resolution; anything shorter still lives one second.
        let seconds = ttl.as_secs().max(1);
        let _: () = conn.set_ex(self.prefixed_key(key), value, seconds).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: i64 = conn.del(self.prefixed_key(key)).await?;
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<u64> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn.keys(self.prefixed_key(pattern)).await?;
        if keys.is_empty() {
            return Ok(0);
        }
        let removed: i64 = conn.del(keys).await?;
        Ok(removed.max(0) as u64)
    }

    async fn clear(&self) -> Result<()> {
        self.delete_pattern("*").await.map(|_| ())
    }

    async fn ping(&self) -> bool {
        let mut conn = self.conn.clone();
        let pong: redis::RedisResult<String> = redis::cmd("PING").query_async(&mut conn).await;
        pong.is_ok()
    }
}
