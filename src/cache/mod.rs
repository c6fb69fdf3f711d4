//! Userline cache layer
//!
//! Cache-aside storage for user records and the side datasets of profile
//! aggregation:
//!
//! - **Store**: raw key-value backend (in-process LRU or Redis)
//! - **Entity cache**: typed payloads with negative caching
//! - **Coalescer**: at most one in-flight origin load per key
//!
//! ## Configuration
//!
//! Cache behavior is controlled via `userline.toml`:
//!
//! ```toml
//! [cache]
//! backend = "memory"
//! ttl_seconds = 86400
//! negative_ttl_seconds = 60
//! # ... see config.rs for all options
//! ```

mod coalesce;
mod config;
mod keys;
pub(crate) mod lock;
mod memory;
mod redis_store;
mod store;

pub use coalesce::{LoadAborted, RequestCoalescer};
pub(crate) use coalesce::{METRIC_COALESCED_WAIT, METRIC_ORIGIN_LOAD};
pub use config::{CacheBackend, CacheConfig};
pub use keys::{CacheKey, EntityKind, LoadToken};
pub use memory::MemoryKvStore;
pub use redis_store::RedisKvStore;
pub use store::{CacheEntry, CacheError, EntityCache, KvStore, NOT_FOUND_SENTINEL};
pub(crate) use store::{METRIC_CACHE_HIT, METRIC_CACHE_MISS, METRIC_CACHE_NEGATIVE_HIT};
