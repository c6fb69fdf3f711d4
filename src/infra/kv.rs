//! Construction of the configured key-value store.

use std::sync::Arc;

use tracing::info;

use crate::cache::{CacheBackend, CacheConfig, KvStore, MemoryKvStore, RedisKvStore};

use super::error::InfraError;

pub async fn connect(config: &CacheConfig) -> Result<Arc<dyn KvStore>, InfraError> {
    match &config.backend {
        CacheBackend::Memory => {
            info!(
                target = "userline::infra::kv",
                backend = "memory",
                capacity = config.memory_capacity,
                "using in-process cache store"
            );
            Ok(Arc::new(MemoryKvStore::new(config)))
        }
        CacheBackend::Redis { url } => {
            let store = RedisKvStore::connect(url).await?;
            Ok(Arc::new(store))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_backend_needs_no_connection() {
        let store = connect(&CacheConfig::default()).await.unwrap();
        assert_eq!(store.get("absent").await.unwrap(), None);
    }
}
