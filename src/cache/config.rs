//! Cache configuration.
//!
//! Controls the key-value backend, key namespace and entry lifetimes via
//! `userline.toml`.

use std::num::NonZeroUsize;
use std::time::Duration;

const DEFAULT_NAMESPACE: &str = "userline";
const DEFAULT_TTL_SECS: u64 = 24 * 60 * 60;
const DEFAULT_NEGATIVE_TTL_SECS: u64 = 60;
const DEFAULT_MEMORY_CAPACITY: usize = 10_000;

/// Which key-value store backs the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheBackend {
    /// In-process LRU store; entries are lost on restart.
    Memory,
    /// Shared Redis instance.
    Redis { url: String },
}

/// Cache configuration from `userline.toml`.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub backend: CacheBackend,
    /// Prefix of every rendered key.
    pub namespace: String,
    /// Lifetime of positive entries.
    pub ttl: Duration,
    /// Lifetime of "confirmed absent" sentinel entries.
    pub negative_ttl: Duration,
    /// Entry limit of the in-process backend.
    pub memory_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            namespace: DEFAULT_NAMESPACE.to_string(),
            ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            negative_ttl: Duration::from_secs(DEFAULT_NEGATIVE_TTL_SECS),
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            backend: settings.backend.clone(),
            namespace: settings.namespace.clone(),
            ttl: settings.ttl,
            negative_ttl: settings.negative_ttl,
            memory_capacity: settings.memory_capacity,
        }
    }
}

impl CacheConfig {
    /// Returns the memory capacity as NonZeroUsize, clamping to 1 if zero.
    pub fn memory_capacity_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.memory_capacity).unwrap_or(NonZeroUsize::MIN)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values() {
        let config = CacheConfig::default();
        assert_eq!(config.backend, CacheBackend::Memory);
        assert_eq!(config.namespace, "userline");
        assert_eq!(config.ttl, Duration::from_secs(86_400));
        assert_eq!(config.negative_ttl, Duration::from_secs(60));
        assert_eq!(config.memory_capacity, 10_000);
    }

    #[test]
    fn negative_ttl_is_shorter_than_positive() {
        let config = CacheConfig::default();
        assert!(config.negative_ttl < config.ttl);
    }

    #[test]
    fn non_zero_clamps_to_min() {
        let config = CacheConfig {
            memory_capacity: 0,
            ..Default::default()
        };
        assert_eq!(config.memory_capacity_non_zero().get(), 1);
    }
}
