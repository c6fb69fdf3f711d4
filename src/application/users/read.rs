//! Cache-aside reads of user records.
//!
//! `get_user` walks one id through cache lookup, a coalesced origin load and
//! cache population. `get_users` resolves a batch with one multi-get and sends
//! only the misses down the single-id path.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

use crate::application::repos::UsersRepo;
use crate::application::users::ReadError;
use crate::cache::{CacheEntry, CacheKey, EntityCache, EntityKind, LoadToken, RequestCoalescer};
use crate::domain::entities::UserRecord;

const SOURCE: &str = "application::users::read";

/// Operation name of the coalesced single-user load.
pub const LOAD_USER: &str = "get_user";

const EPOCH_STRIPES: u64 = 64;

/// Invalidation counters, striped by user id.
///
/// A load remembers the stripe's epoch before it queries the origin. If the
/// epoch moved by the time the result is cached, an invalidation overlapped
/// the load and the written entry may predate the write that caused it, so
/// the entry is dropped again.
struct InvalidationEpochs {
    stripes: Vec<AtomicU64>,
}

impl InvalidationEpochs {
    fn new() -> Self {
        Self {
            stripes: (0..EPOCH_STRIPES).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    fn stripe(&self, id: u64) -> &AtomicU64 {
        &self.stripes[(id % EPOCH_STRIPES) as usize]
    }

    fn current(&self, id: u64) -> u64 {
        self.stripe(id).load(Ordering::Acquire)
    }

    fn bump(&self, id: u64) {
        self.stripe(id).fetch_add(1, Ordering::AcqRel);
    }
}

#[derive(Clone)]
pub struct UserReader {
    users: Arc<dyn UsersRepo>,
    cache: EntityCache<UserRecord>,
    coalescer: Arc<RequestCoalescer<UserRecord, ReadError>>,
    epochs: Arc<InvalidationEpochs>,
    max_concurrency: usize,
}

impl UserReader {
    pub fn new(
        users: Arc<dyn UsersRepo>,
        cache: EntityCache<UserRecord>,
        max_concurrency: usize,
    ) -> Self {
        Self {
            users,
            cache,
            coalescer: Arc::new(RequestCoalescer::new()),
            epochs: Arc::new(InvalidationEpochs::new()),
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub fn key(id: u64) -> CacheKey {
        CacheKey::new(EntityKind::UserBase, id)
    }

    /// Read one user.
    ///
    /// A cache failure is returned as is and never falls through to the
    /// origin. Cache writes after an origin load are best-effort.
    pub async fn get_user(&self, id: u64) -> Result<UserRecord, ReadError> {
        let key = Self::key(id);

        match self
            .cache
            .get(&key)
            .await
            .map_err(|source| ReadError::cache("lookup", &key, source))?
        {
            CacheEntry::Hit(user) => {
                debug!(target = SOURCE, op = LOAD_USER, user_id = id, outcome = "cache_hit");
                return Ok(user);
            }
            CacheEntry::ConfirmedAbsent => {
                debug!(target = SOURCE, op = LOAD_USER, user_id = id, outcome = "cache_negative_hit");
                return Err(ReadError::user_not_found(id));
            }
            CacheEntry::Miss => {}
        }

        let users = Arc::clone(&self.users);
        let cache = self.cache.clone();
        let epochs = Arc::clone(&self.epochs);
        self.coalescer
            .run(LoadToken::new(LOAD_USER, key), move || {
                load_from_origin(users, cache, epochs, key, id)
            })
            .await
    }

    /// Read many users. The result holds every id that could be resolved;
    /// ids that are absent or whose load failed are left out.
    ///
    /// Fails only when the initial multi-get fails.
    pub async fn get_users(&self, ids: &[u64]) -> Result<HashMap<u64, UserRecord>, ReadError> {
        let mut seen = HashSet::with_capacity(ids.len());
        let unique: Vec<u64> = ids.iter().copied().filter(|id| seen.insert(*id)).collect();
        if unique.is_empty() {
            return Ok(HashMap::new());
        }

        let keys: Vec<CacheKey> = unique.iter().map(|id| Self::key(*id)).collect();
        let mut found: HashMap<u64, UserRecord> = self
            .cache
            .multi_get(&keys)
            .await
            .map_err(|source| ReadError::cache_batch("multi_get", &keys, source))?
            .into_iter()
            .map(|(key, user)| (key.id, user))
            .collect();

        let misses: Vec<u64> = unique
            .into_iter()
            .filter(|id| !found.contains_key(id))
            .collect();
        if misses.is_empty() {
            return Ok(found);
        }

        let loaded: Vec<(u64, Result<UserRecord, ReadError>)> = stream::iter(misses)
            .map(|id| async move { (id, self.get_user(id).await) })
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;

        for (id, result) in loaded {
            match result {
                Ok(user) => {
                    found.insert(id, user);
                }
                Err(err) if err.is_not_found() => {
                    debug!(target = SOURCE, op = "get_users", user_id = id, "user does not exist");
                }
                Err(err) => {
                    warn!(
                        target = SOURCE,
                        op = "get_users",
                        user_id = id,
                        error = %err,
                        "dropping user from batch"
                    );
                }
            }
        }

        Ok(found)
    }

    /// Drop the cached record (or negative entry) of `id`.
    ///
    /// A load of `id` already in flight will not leave its result cached.
    /// Loads running in other processes are not tracked; their entries
    /// live until the TTL.
    pub async fn invalidate(&self, id: u64) {
        self.epochs.bump(id);
        self.cache.del(&[Self::key(id)]).await;
    }
}

async fn load_from_origin(
    users: Arc<dyn UsersRepo>,
    cache: EntityCache<UserRecord>,
    epochs: Arc<InvalidationEpochs>,
    key: CacheKey,
    id: u64,
) -> Result<UserRecord, ReadError> {
    let epoch = epochs.current(id);
    let user = match users.find_user_by_id(id).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            if epochs.current(id) == epoch {
                if let Err(err) = cache.set_absent(&key).await {
                    warn!(target = SOURCE, key = %key, error = %err, "failed to record absent user");
                }
                drop_if_invalidated(&cache, &epochs, key, id, epoch).await;
            }
            debug!(target = SOURCE, op = LOAD_USER, user_id = id, outcome = "origin_miss");
            return Err(ReadError::user_not_found(id));
        }
        Err(source) => {
            warn!(target = SOURCE, op = LOAD_USER, user_id = id, error = %source, outcome = "failed");
            return Err(ReadError::origin("find_user_by_id", format!("user {id}"), source));
        }
    };

    if epochs.current(id) == epoch {
        if let Err(err) = cache.set(&key, &user, None).await {
            warn!(target = SOURCE, key = %key, error = %err, "failed to populate user cache");
        }
        drop_if_invalidated(&cache, &epochs, key, id, epoch).await;
    }
    debug!(target = SOURCE, op = LOAD_USER, user_id = id, outcome = "origin_hit");
    Ok(user)
}

/// Covers an invalidation that ran between the epoch check and the write.
async fn drop_if_invalidated(
    cache: &EntityCache<UserRecord>,
    epochs: &InvalidationEpochs,
    key: CacheKey,
    id: u64,
    epoch: u64,
) {
    if epochs.current(id) != epoch {
        debug!(target = SOURCE, key = %key, "invalidated during load, dropping written entry");
        cache.del(&[key]).await;
    }
}
