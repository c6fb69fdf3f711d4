//! Side datasets of profile aggregation: follow counters and the viewer's
//! relationship flags.
//!
//! Each dataset is served cache-aside: one multi-get, then a single batched
//! origin call for whatever the cache did not hold. Loaded values (including
//! zero counters and `false` flags) are written back best-effort.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use crate::application::repos::{RelationsRepo, RepoError, UserStatsRepo};
use crate::application::users::ReadError;
use crate::cache::{CacheKey, EntityCache, EntityKind};
use crate::domain::entities::UserStatRecord;

const SOURCE: &str = "application::users::side";

#[derive(Clone)]
pub struct SideFetcher {
    stats: Arc<dyn UserStatsRepo>,
    relations: Arc<dyn RelationsRepo>,
    stat_cache: EntityCache<UserStatRecord>,
    flag_cache: EntityCache<bool>,
}

impl SideFetcher {
    pub fn new(
        stats: Arc<dyn UserStatsRepo>,
        relations: Arc<dyn RelationsRepo>,
        stat_cache: EntityCache<UserStatRecord>,
        flag_cache: EntityCache<bool>,
    ) -> Self {
        Self {
            stats,
            relations,
            stat_cache,
            flag_cache,
        }
    }

    /// Counters for every id in `ids`; users without a stats row get zeros.
    pub async fn stats(&self, ids: &[u64]) -> Result<HashMap<u64, UserStatRecord>, ReadError> {
        let stats = Arc::clone(&self.stats);
        cached_batch(
            &self.stat_cache,
            "stats_by_user_ids",
            ids,
            |id| CacheKey::new(EntityKind::UserStat, id),
            UserStatRecord::zero,
            |missing| async move { stats.stats_by_user_ids(&missing).await },
        )
        .await
    }

    /// Whether `viewer` follows each of `ids`.
    pub async fn following(&self, viewer: u64, ids: &[u64]) -> Result<HashMap<u64, bool>, ReadError> {
        let relations = Arc::clone(&self.relations);
        cached_batch(
            &self.flag_cache,
            "following_among",
            ids,
            |id| CacheKey::scoped(EntityKind::Following, viewer, id),
            |_| false,
            |missing| async move {
                let set = relations.following_among(viewer, &missing).await?;
                Ok(flags_from_set(set))
            },
        )
        .await
    }

    /// Whether each of `ids` follows `viewer`.
    pub async fn followers(&self, viewer: u64, ids: &[u64]) -> Result<HashMap<u64, bool>, ReadError> {
        let relations = Arc::clone(&self.relations);
        cached_batch(
            &self.flag_cache,
            "followers_among",
            ids,
            |id| CacheKey::scoped(EntityKind::Follower, viewer, id),
            |_| false,
            |missing| async move {
                let set = relations.followers_among(viewer, &missing).await?;
                Ok(flags_from_set(set))
            },
        )
        .await
    }

    /// Drop every side entry an edge change between `user` and `target` can
    /// affect: both users' counters and the flags seen from either side.
    pub async fn invalidate_edge(&self, user: u64, target: u64) {
        self.stat_cache
            .del(&[
                CacheKey::new(EntityKind::UserStat, user),
                CacheKey::new(EntityKind::UserStat, target),
            ])
            .await;
        self.flag_cache
            .del(&[
                CacheKey::scoped(EntityKind::Following, user, target),
                CacheKey::scoped(EntityKind::Follower, target, user),
            ])
            .await;
    }
}

fn flags_from_set(set: HashSet<u64>) -> HashMap<u64, bool> {
    set.into_iter().map(|id| (id, true)).collect()
}

async fn cached_batch<T, K, D, L, Fut>(
    cache: &EntityCache<T>,
    stage: &'static str,
    ids: &[u64],
    key_for: K,
    default_for: D,
    load: L,
) -> Result<HashMap<u64, T>, ReadError>
where
    T: Serialize + DeserializeOwned,
    K: Fn(u64) -> CacheKey,
    D: Fn(u64) -> T,
    L: FnOnce(Vec<u64>) -> Fut,
    Fut: Future<Output = Result<HashMap<u64, T>, RepoError>>,
{
    let mut seen = HashSet::with_capacity(ids.len());
    let keys: Vec<CacheKey> = ids
        .iter()
        .copied()
        .filter(|id| seen.insert(*id))
        .map(&key_for)
        .collect();
    if keys.is_empty() {
        return Ok(HashMap::new());
    }

    let mut resolved: HashMap<u64, T> = cache
        .multi_get(&keys)
        .await
        .map_err(|source| ReadError::cache_batch(stage, &keys, source))?
        .into_iter()
        .map(|(key, value)| (key.id, value))
        .collect();

    let missing: Vec<u64> = keys
        .iter()
        .map(|key| key.id)
        .filter(|id| !resolved.contains_key(id))
        .collect();
    if missing.is_empty() {
        return Ok(resolved);
    }

    let subject = format!("{} ids", missing.len());
    let mut loaded = load(missing.clone())
        .await
        .map_err(|source| ReadError::origin(stage, subject, source))?;
    debug!(target = SOURCE, op = stage, misses = missing.len(), "loaded side dataset");

    let mut fresh = Vec::with_capacity(missing.len());
    for id in missing {
        let value = loaded.remove(&id).unwrap_or_else(|| default_for(id));
        fresh.push((key_for(id), id, value));
    }

    let writes = fresh
        .iter()
        .map(|(key, _, value)| async move { (key, cache.set(key, value, None).await) });
    for (key, result) in join_all(writes).await {
        if let Err(err) = result {
            warn!(target = SOURCE, key = %key, error = %err, "failed to populate side cache");
        }
    }

    resolved.extend(fresh.into_iter().map(|(_, id, value)| (id, value)));
    Ok(resolved)
}
