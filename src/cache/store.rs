//! Cache store adapter and negative-cache policy.
//!
//! `KvStore` is the narrow contract of the remote key-value store: raw bytes,
//! per-call TTL and a distinguishable "no such key". `EntityCache` layers a
//! typed payload on top and turns the reserved sentinel into an explicit
//! "confirmed absent" signal.

use std::collections::HashMap;
use std::fmt::Display;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use metrics::counter;
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::{debug, warn};

use super::config::CacheConfig;
use super::keys::CacheKey;

const SOURCE: &str = "cache::store";

/// Value stored for keys whose entity is known not to exist.
pub const NOT_FOUND_SENTINEL: &[u8] = b"*";

pub(crate) const METRIC_CACHE_HIT: &str = "userline_cache_hit_total";
pub(crate) const METRIC_CACHE_MISS: &str = "userline_cache_miss_total";
pub(crate) const METRIC_CACHE_NEGATIVE_HIT: &str = "userline_cache_negative_hit_total";

#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error("cache connection failed: {0}")]
    Connection(String),
    #[error("cache command `{command}` failed: {message}")]
    Command {
        command: &'static str,
        message: String,
    },
    #[error("failed to encode cache payload: {0}")]
    Encode(String),
}

impl CacheError {
    pub fn command(command: &'static str, err: impl Display) -> Self {
        Self::Command {
            command,
            message: err.to_string(),
        }
    }
}

/// Raw key-value store consumed by the cache layer.
///
/// `get` returns `Ok(None)` when the key does not exist; errors are reserved
/// for infrastructure failures. `multi_get` returns one slot per requested key,
/// in request order.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError>;

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError>;

    async fn multi_get(&self, keys: &[String]) -> Result<Vec<Option<Bytes>>, CacheError>;

    async fn del(&self, keys: &[String]) -> Result<(), CacheError>;
}

/// Logical state of one cache entry.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEntry<T> {
    Hit(T),
    ConfirmedAbsent,
    Miss,
}

/// Typed view over a `KvStore` for one payload type.
pub struct EntityCache<T> {
    store: Arc<dyn KvStore>,
    namespace: Arc<str>,
    ttl: Duration,
    negative_ttl: Duration,
    _payload: PhantomData<fn() -> T>,
}

impl<T> Clone for EntityCache<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            namespace: Arc::clone(&self.namespace),
            ttl: self.ttl,
            negative_ttl: self.negative_ttl,
            _payload: PhantomData,
        }
    }
}

impl<T> EntityCache<T>
where
    T: Serialize + DeserializeOwned,
{
    pub fn new(store: Arc<dyn KvStore>, config: &CacheConfig) -> Self {
        Self {
            store,
            namespace: Arc::from(config.namespace.as_str()),
            ttl: config.ttl,
            negative_ttl: config.negative_ttl,
            _payload: PhantomData,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn negative_ttl(&self) -> Duration {
        self.negative_ttl
    }

    pub async fn get(&self, key: &CacheKey) -> Result<CacheEntry<T>, CacheError> {
        let entity = key.entity.as_str();
        let raw = self.store.get(&key.render(&self.namespace)).await?;

        let entry = match raw {
            None => CacheEntry::Miss,
            Some(bytes) => self.decode_entry(key, &bytes),
        };

        match &entry {
            CacheEntry::Hit(_) => counter!(METRIC_CACHE_HIT, "entity" => entity).increment(1),
            CacheEntry::ConfirmedAbsent => {
                counter!(METRIC_CACHE_NEGATIVE_HIT, "entity" => entity).increment(1)
            }
            CacheEntry::Miss => counter!(METRIC_CACHE_MISS, "entity" => entity).increment(1),
        }

        Ok(entry)
    }

    /// Write `value` under `key`; `None` uses the standard TTL.
    pub async fn set(
        &self,
        key: &CacheKey,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), CacheError> {
        let payload = serde_json::to_vec(value).map_err(|err| CacheError::Encode(err.to_string()))?;
        self.store
            .set(
                &key.render(&self.namespace),
                Bytes::from(payload),
                ttl.unwrap_or(self.ttl),
            )
            .await
    }

    /// Record that the entity behind `key` does not exist, for the short
    /// negative TTL.
    pub async fn set_absent(&self, key: &CacheKey) -> Result<(), CacheError> {
        self.store
            .set(
                &key.render(&self.namespace),
                Bytes::from_static(NOT_FOUND_SENTINEL),
                self.negative_ttl,
            )
            .await
    }

    /// Batched `get`. Only hits are present in the returned map; misses,
    /// sentinels and undecodable payloads are left out.
    pub async fn multi_get(&self, keys: &[CacheKey]) -> Result<HashMap<CacheKey, T>, CacheError> {
        if keys.is_empty() {
            return Ok(HashMap::new());
        }

        let rendered: Vec<String> = keys.iter().map(|key| key.render(&self.namespace)).collect();
        let values = self.store.multi_get(&rendered).await?;

        let mut found = HashMap::with_capacity(keys.len());
        for (key, value) in keys.iter().zip(values) {
            let entity = key.entity.as_str();
            match value.map(|bytes| self.decode_entry(key, &bytes)) {
                Some(CacheEntry::Hit(payload)) => {
                    counter!(METRIC_CACHE_HIT, "entity" => entity).increment(1);
                    found.insert(*key, payload);
                }
                Some(CacheEntry::ConfirmedAbsent) => {
                    counter!(METRIC_CACHE_NEGATIVE_HIT, "entity" => entity).increment(1);
                }
                Some(CacheEntry::Miss) | None => {
                    counter!(METRIC_CACHE_MISS, "entity" => entity).increment(1);
                }
            }
        }

        Ok(found)
    }

    /// Best-effort invalidation. Failures are logged; a stale entry is bounded
    /// by its TTL.
    pub async fn del(&self, keys: &[CacheKey]) {
        if keys.is_empty() {
            return;
        }

        let rendered: Vec<String> = keys.iter().map(|key| key.render(&self.namespace)).collect();
        match self.store.del(&rendered).await {
            Ok(()) => debug!(target = SOURCE, keys = ?rendered, "invalidated cache entries"),
            Err(err) => warn!(
                target = SOURCE,
                keys = ?rendered,
                error = %err,
                "cache invalidation failed; entries expire with their TTL"
            ),
        }
    }

    fn decode_entry(&self, key: &CacheKey, bytes: &[u8]) -> CacheEntry<T> {
        if bytes.is_empty() {
            return CacheEntry::Miss;
        }
        if bytes == NOT_FOUND_SENTINEL {
            return CacheEntry::ConfirmedAbsent;
        }

        match serde_json::from_slice(bytes) {
            Ok(payload) => CacheEntry::Hit(payload),
            Err(err) => {
                warn!(
                    target = SOURCE,
                    key = %key,
                    error = %err,
                    "undecodable cache payload, treating as miss"
                );
                CacheEntry::Miss
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::super::keys::EntityKind;
    use super::super::memory::MemoryKvStore;
    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Payload {
        name: String,
    }

    fn cache() -> (Arc<MemoryKvStore>, EntityCache<Payload>) {
        let config = CacheConfig::default();
        let store = Arc::new(MemoryKvStore::new(&config));
        let cache = EntityCache::new(store.clone(), &config);
        (store, cache)
    }

    fn key(id: u64) -> CacheKey {
        CacheKey::new(EntityKind::UserBase, id)
    }

    #[tokio::test]
    async fn get_distinguishes_hit_absent_and_miss() {
        let (_store, cache) = cache();
        let payload = Payload {
            name: "ada".to_string(),
        };

        assert_eq!(cache.get(&key(1)).await.unwrap(), CacheEntry::Miss);

        cache.set(&key(1), &payload, None).await.unwrap();
        assert_eq!(cache.get(&key(1)).await.unwrap(), CacheEntry::Hit(payload));

        cache.set_absent(&key(2)).await.unwrap();
        assert_eq!(
            cache.get(&key(2)).await.unwrap(),
            CacheEntry::ConfirmedAbsent
        );
    }

    #[tokio::test]
    async fn multi_get_omits_sentinels_and_misses() {
        let (_store, cache) = cache();
        cache
            .set(
                &key(1),
                &Payload {
                    name: "one".to_string(),
                },
                None,
            )
            .await
            .unwrap();
        cache.set_absent(&key(2)).await.unwrap();

        let found = cache.multi_get(&[key(1), key(2), key(3)]).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[&key(1)].name, "one");
    }

    #[tokio::test]
    async fn undecodable_payload_reads_as_miss() {
        let (store, cache) = cache();
        store
            .set(
                &key(9).render("userline"),
                Bytes::from_static(b"{not json"),
                Duration::from_secs(60),
            )
            .await
            .unwrap();

        assert_eq!(cache.get(&key(9)).await.unwrap(), CacheEntry::Miss);
    }

    #[tokio::test]
    async fn del_removes_entries() {
        let (_store, cache) = cache();
        cache.set_absent(&key(4)).await.unwrap();
        cache.del(&[key(4)]).await;
        assert_eq!(cache.get(&key(4)).await.unwrap(), CacheEntry::Miss);
    }
}
