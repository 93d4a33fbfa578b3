//! Bounded key/value map with per-entry expiry.
//!
//! Shared by the in-process cache backend and the alert suppressor. Expired
//! entries are dropped lazily on read and in bulk by [`ExpiringMap::sweep`].

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

pub const DEFAULT_CAPACITY: usize = 10_000;

#[derive(Debug)]
struct Entry<V> {
    value: V,
    /// `None` when the ttl is too large to represent; such entries never expire.
    expires_at: Option<Instant>,
}

impl<V> Entry<V> {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

#[derive(Debug)]
pub struct ExpiringMap<V> {
    entries: RwLock<HashMap<String, Entry<V>>>,
    capacity: usize,
}

impl<V: Clone + Send + Sync> ExpiringMap<V> {
    pub fn new(capacity: usize) -> Self {
        Self { entries: RwLock::new(HashMap::new()), capacity: capacity.max(1) }
    }

    pub async fn get(&self, key: &str) -> Option<V> {
        let now = Instant::now();
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if !entry.is_expired(now) => return Some(entry.value.clone()),
                Some(_) => {}
                None => return None,
            }
        }

        // Expired: evict under the write lock, re-checking in case it was refreshed.
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(|entry| entry.is_expired(now)) {
            entries.remove(key);
        }
        None
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.get(key).await.is_some()
    }

    pub async fn insert(&self, key: impl Into<String>, value: V, ttl: Duration) {
        let key = key.into();
        let now = Instant::now();
        let mut entries = self.entries.write().await;

        if !entries.contains_key(&key) && entries.len() >= self.capacity {
            entries.retain(|_, entry| !entry.is_expired(now));
            if entries.len() >= self.capacity {
                let soonest = entries
                    .iter()
                    .min_by_key(|(_, entry)| (entry.expires_at.is_none(), entry.expires_at))
                    .map(|(key, _)| key.clone());
                if let Some(soonest) = soonest {
                    entries.remove(&soonest);
                }
            }
        }

        entries.insert(key, Entry { value, expires_at: now.checked_add(ttl) });
    }

    pub async fn remove(&self, key: &str) -> bool {
        self.entries.write().await.remove(key).is_some()
    }

    /// Remove every key matching `predicate`, returning how many were removed.
    pub async fn remove_where(&self, predicate: impl Fn(&str) -> bool) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, _| !predicate(key));
        before - entries.len()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Drop all expired entries, returning how many were dropped.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    /// Number of stored entries, expired ones included until swept.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_lazily() {
        let map = ExpiringMap::new(16);
        map.insert("a", 1u32, Duration::from_secs(10)).await;
        assert_eq!(map.get("a").await, Some(1));

        tokio::time::advance(Duration::from_secs(10)).await;
        assert_eq!(map.get("a").await, None);
        assert_eq!(map.len().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_drops_only_expired() {
        let map = ExpiringMap::new(16);
        map.insert("short", (), Duration::from_secs(1)).await;
        map.insert("long", (), Duration::from_secs(60)).await;

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(map.sweep().await, 1);
        assert!(map.contains("long").await);
        assert!(!map.contains("short").await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_evicts_soonest_expiry() {
        let map = ExpiringMap::new(2);
        map.insert("first", 1, Duration::from_secs(5)).await;
        map.insert("second", 2, Duration::from_secs(50)).await;
        map.insert("third", 3, Duration::from_secs(50)).await;

        assert_eq!(map.len().await, 2);
        assert_eq!(map.get("first").await, None);
        assert_eq!(map.get("third").await, Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_ttl_never_expires() {
        let map = ExpiringMap::new(2);
        map.insert("forever", 1, Duration::MAX).await;
        map.insert("brief", 2, Duration::from_secs(1)).await;
        assert_eq!(map.get("forever").await, Some(1));

        tokio::time::advance(Duration::from_secs(3600)).await;
        assert_eq!(map.sweep().await, 1);
        assert_eq!(map.get("forever").await, Some(1));

        // At capacity the finite entry goes first
        map.insert("a", 3, Duration::from_secs(60)).await;
        map.insert("b", 4, Duration::from_secs(60)).await;
        assert_eq!(map.get("forever").await, Some(1));
    }

    #[tokio::test]
    async fn test_remove_where() {
        let map = ExpiringMap::new(16);
        for key in ["stats:a", "stats:b", "other"] {
            map.insert(key, 0, Duration::from_secs(60)).await;
        }
        assert_eq!(map.remove_where(|key| key.starts_with("stats:")).await, 2);
        assert!(map.contains("other").await);
    }
}
