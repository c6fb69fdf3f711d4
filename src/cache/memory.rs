//! In-process key-value store.
//!
//! LRU-bounded map with per-entry expiry. Expired entries are dropped lazily
//! when read. Time comes from `tokio::time`, so a paused test clock drives
//! expiry.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use tokio::time::Instant;

use super::config::CacheConfig;
use super::lock::mutex_lock;
use super::store::{CacheError, KvStore};

const SOURCE: &str = "cache::memory";

struct MemoryEntry {
    value: Bytes,
    expires_at: Instant,
}

pub struct MemoryKvStore {
    entries: Mutex<LruCache<String, MemoryEntry>>,
}

impl MemoryKvStore {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(config.memory_capacity_non_zero())),
        }
    }

    /// Number of stored entries, including expired ones not yet reaped.
    pub fn len(&self) -> usize {
        mutex_lock(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(entries: &mut LruCache<String, MemoryEntry>, key: &str, now: Instant) -> Option<Bytes> {
        match entries.get(key) {
            Some(entry) if entry.expires_at > now => return Some(entry.value.clone()),
            Some(_) => {}
            None => return None,
        }
        entries.pop(key);
        None
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        let now = Instant::now();
        let mut entries = mutex_lock(&self.entries, SOURCE, "get");
        Ok(Self::read(&mut entries, key, now))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError> {
        let expires_at = Instant::now() + ttl;
        mutex_lock(&self.entries, SOURCE, "set").put(key.to_string(), MemoryEntry { value, expires_at });
        Ok(())
    }

    async fn multi_get(&self, keys: &[String]) -> Result<Vec<Option<Bytes>>, CacheError> {
        let now = Instant::now();
        let mut entries = mutex_lock(&self.entries, SOURCE, "multi_get");
        Ok(keys
            .iter()
            .map(|key| Self::read(&mut entries, key, now))
            .collect())
    }

    async fn del(&self, keys: &[String]) -> Result<(), CacheError> {
        let mut entries = mutex_lock(&self.entries, SOURCE, "del");
        for key in keys {
            entries.pop(key.as_str());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(capacity: usize) -> MemoryKvStore {
        MemoryKvStore::new(&CacheConfig {
            memory_capacity: capacity,
            ..Default::default()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn entries_expire_after_ttl() {
        let store = store(16);
        store
            .set("k", Bytes::from_static(b"v"), Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(store.get("k").await.unwrap(), Some(Bytes::from_static(b"v")));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(store.is_empty(), "expired entry is reaped on read");
    }

    #[tokio::test]
    async fn multi_get_preserves_request_order() {
        let store = store(16);
        store
            .set("a", Bytes::from_static(b"1"), Duration::from_secs(60))
            .await
            .unwrap();
        store
            .set("c", Bytes::from_static(b"3"), Duration::from_secs(60))
            .await
            .unwrap();

        let keys = vec!["c".to_string(), "b".to_string(), "a".to_string()];
        let values = store.multi_get(&keys).await.unwrap();
        assert_eq!(
            values,
            vec![
                Some(Bytes::from_static(b"3")),
                None,
                Some(Bytes::from_static(b"1"))
            ]
        );
    }

    #[tokio::test]
    async fn capacity_evicts_least_recently_used() {
        let store = store(2);
        let ttl = Duration::from_secs(60);
        store.set("a", Bytes::from_static(b"1"), ttl).await.unwrap();
        store.set("b", Bytes::from_static(b"2"), ttl).await.unwrap();
        store.set("c", Bytes::from_static(b"3"), ttl).await.unwrap();

        assert_eq!(store.get("a").await.unwrap(), None);
        assert!(store.get("b").await.unwrap().is_some());
        assert!(store.get("c").await.unwrap().is_some());
    }
}
