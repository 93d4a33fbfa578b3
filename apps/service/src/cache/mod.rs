/// Cache layer - memoizes derived data (statistics) with a TTL
///
/// The backend is picked once at startup: Redis when a URL is configured and
/// the server answers, otherwise an in-process map. Every operation is
/// best-effort; failures are logged and read as a miss, so callers must
/// always be able to recompute the value.
pub mod memory;
pub mod remote;

pub use memory::MemoryBackend;
pub use remote::RedisBackend;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::config::CacheConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Redis,
    Memory,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Redis => f.write_str("redis"),
            BackendKind::Memory => f.write_str("memory"),
        }
    }
}

/// Storage strategy behind [`Cache`]. Values are already-encoded JSON text.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Delete every key matching a `*` glob, returning how many went away.
    async fn delete_pattern(&self, pattern: &str) -> Result<u64>;

    async fn clear(&self) -> Result<()>;

    /// Whether the backend currently answers.
    async fn ping(&self) -> bool;
}

/// Reported by [`Cache::status`]
#[derive(Debug, Clone, Serialize)]
pub struct CacheStatus {
    pub backend: BackendKind,
    pub connected: bool,
}

#[derive(Clone)]
pub struct Cache {
    backend: Arc<dyn CacheBackend>,
    default_ttl: Duration,
}

impl Cache {
    pub fn new(backend: Arc<dyn CacheBackend>, default_ttl: Duration) -> Self {
        Self { backend, default_ttl }
    }

    /// In-process cache with a background sweeper.
    pub fn in_memory(default_ttl: Duration, capacity: usize, sweep_every: Duration) -> Self {
        let backend = Arc::new(MemoryBackend::new(capacity));
        backend.spawn_sweeper(sweep_every.max(Duration::from_secs(1)));
        Self::new(backend, default_ttl)
    }

    /// Pick the backend for this process: Redis if reachable, memory otherwise.
    pub async fn connect(config: &CacheConfig) -> Self {
        let default_ttl = Duration::from_secs(config.default_ttl_seconds);

        if let Some(url) = config.redis_url.as_deref().filter(|url| !url.trim().is_empty()) {
            let timeout = Duration::from_millis(config.connect_timeout_ms);
            match RedisBackend::connect(url, &config.key_prefix, timeout).await {
                Ok(backend) => {
                    info!("Cache backend: redis");
                    return Self::new(Arc::new(backend), default_ttl);
                }
                Err(e) => {
                    warn!("Redis unavailable, falling back to in-memory cache: {e:#}");
                }
            }
        }

        info!("Cache backend: memory");
        Self::in_memory(
            default_ttl,
            config.capacity,
            Duration::from_secs(config.sweep_interval_seconds),
        )
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = match self.backend.get(key).await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!(key, "Cache get failed: {e:#}");
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, "Discarding undecodable cache entry: {e}");
                None
            }
        }
    }

    /// Store `value` for `ttl`, or the default TTL when `None`.
    pub async fn set<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Option<Duration>) {
        let raw = match serde_json::to_string(value) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key, "Failed to encode cache entry: {e}");
                return;
            }
        };

        if let Err(e) = self.backend.set(key, raw, ttl.unwrap_or(self.default_ttl)).await {
            warn!(key, "Cache set failed: {e:#}");
        }
    }

    pub async fn delete(&self, key: &str) {
        if let Err(e) = self.backend.delete(key).await {
            warn!(key, "Cache delete failed: {e:#}");
        }
    }

    pub async fn delete_pattern(&self, pattern: &str) -> u64 {
        match self.backend.delete_pattern(pattern).await {
            Ok(removed) => {
                debug!(pattern, removed, "Invalidated cache entries");
                removed
            }
            Err(e) => {
                warn!(pattern, "Cache pattern delete failed: {e:#}");
                0
            }
        }
    }

    pub async fn clear_all(&self) {
        if let Err(e) = self.backend.clear().await {
            warn!("Cache clear failed: {e:#}");
        }
    }

    pub async fn status(&self) -> CacheStatus {
        CacheStatus { backend: self.backend.kind(), connected: self.backend.ping().await }
    }

    /// Return the cached value for `key`, or compute, store and return it.
    ///
    /// Errors from `compute` are returned as-is and nothing is stored.
    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        compute: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if let Some(hit) = self.get::<T>(key).await {
            return Ok(hit);
        }
        let value = compute().await?;
        self.set(key, &value, ttl).await;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache() -> Cache {
        Cache::new(Arc::new(MemoryBackend::new(128)), Duration::from_secs(60))
    }

    /// Backend that fails every call, standing in for a dead remote.
    struct BrokenBackend;

    #[async_trait]
    impl CacheBackend for BrokenBackend {
        fn kind(&self) -> BackendKind {
            BackendKind::Redis
        }
        async fn get(&self, _: &str) -> Result<Option<String>> {
            anyhow::bail!("connection reset")
        }
        async fn set(&self, _: &str, _: String, _: Duration) -> Result<()> {
            anyhow::bail!("connection reset")
        }
        async fn delete(&self, _: &str) -> Result<()> {
            anyhow::bail!("connection reset")
        }
        async fn delete_pattern(&self, _: &str) -> Result<u64> {
            anyhow::bail!("connection reset")
        }
        async fn clear(&self) -> Result<()> {
            anyhow::bail!("connection reset")
        }
        async fn ping(&self) -> bool {
            false
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_then_get_until_ttl() {
        let cache = cache();
        cache.set("stats:uptime:a", &95.5f64, Some(Duration::from_secs(30))).await;
        assert_eq!(cache.get::<f64>("stats:uptime:a").await, Some(95.5));

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(cache.get::<f64>("stats:uptime:a").await, None);
    }

    #[tokio::test]
    async fn test_delete_pattern_only_hits_matching_keys() {
        let cache = cache();
        cache.set("stats:uptime:a:24h", &1, None).await;
        cache.set("stats:latency:a:24h", &2, None).await;
        cache.set("session:a", &3, None).await;

        assert_eq!(cache.delete_pattern("stats:*").await, 2);
        assert_eq!(cache.get::<i32>("stats:uptime:a:24h").await, None);
        assert_eq!(cache.get::<i32>("session:a").await, Some(3));
    }

    #[tokio::test]
    async fn test_clear_all_and_delete() {
        let cache = cache();
        cache.set("a", &"x", None).await;
        cache.set("b", &"y", None).await;
        cache.delete("a").await;
        assert_eq!(cache.get::<String>("a").await, None);

        cache.clear_all().await;
        assert_eq!(cache.get::<String>("b").await, None);
    }

    #[tokio::test]
    async fn test_type_mismatch_reads_as_miss() {
        let cache = cache();
        cache.set("k", &"not a number", None).await;
        assert_eq!(cache.get::<u64>("k").await, None);
    }

    #[tokio::test]
    async fn test_broken_backend_degrades_to_miss() {
        let cache = Cache::new(Arc::new(BrokenBackend), Duration::from_secs(60));
        cache.set("k", &1, None).await;
        assert_eq!(cache.get::<i32>("k").await, None);
        assert_eq!(cache.delete_pattern("*").await, 0);
        cache.clear_all().await;

        let status = cache.status().await;
        assert_eq!(status.backend, BackendKind::Redis);
        assert!(!status.connected);

        let computed: Result<i32, std::convert::Infallible> =
            cache.get_or_compute("k", None, || async { Ok(7) }).await;
        assert_eq!(computed.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_get_or_compute_memoizes() {
        let cache = cache();
        let first: Result<u32, std::convert::Infallible> =
            cache.get_or_compute("memo", None, || async { Ok(1) }).await;
        let second: Result<u32, std::convert::Infallible> =
            cache.get_or_compute("memo", None, || async { Ok(2) }).await;
        assert_eq!(first.unwrap(), 1);
        assert_eq!(second.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_connect_without_redis_uses_memory() {
        let config = CacheConfig { redis_url: None, ..CacheConfig::default() };
        let cache = Cache::connect(&config).await;
        assert_eq!(cache.backend_kind(), BackendKind::Memory);
        assert!(cache.status().await.connected);
    }
}
