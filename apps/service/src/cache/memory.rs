use std::sync::{Arc, Weak};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use super::{BackendKind, CacheBackend};
use crate::expiry::ExpiringMap;

/// In-process fallback backend. Values live until their TTL passes; reads
/// evict lazily and [`MemoryBackend::spawn_sweeper`] clears the rest.
#[derive(Debug)]
pub struct MemoryBackend {
    entries: ExpiringMap<String>,
}

impl MemoryBackend {
    pub fn new(capacity: usize) -> Self {
        Self { entries: ExpiringMap::new(capacity) }
    }

    /// Periodically drop expired entries. The task ends once the backend is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> tokio::task::JoinHandle<()> {
        let backend: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(backend) = backend.upgrade() else { break };
                let swept = backend.entries.sweep().await;
                if swept > 0 {
                    debug!(swept, "Swept expired cache entries");
                }
            }
        })
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).await)
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        self.entries.insert(key, value, ttl).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.remove(key).await;
        Ok(())
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<u64> {
        let pattern = glob::Pattern::new(pattern)?;
        let removed = self.entries.remove_where(|key| pattern.matches(key)).await;
        Ok(removed as u64)
    }

    async fn clear(&self) -> Result<()> {
        self.entries.clear().await;
        Ok(())
    }

    async fn ping(&self) -> bool {
        true
    }
}
