//! In-memory origin and store doubles shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use time::macros::datetime;
use userline::application::repos::{
    CreateUserParams, EdgeChange, RelationsRepo, RepoError, UpdateUserParams, UserStatsRepo,
    UsersRepo,
};
use userline::application::users::{ProfileConfig, UserServices};
use userline::cache::{CacheConfig, CacheError, KvStore, MemoryKvStore};
use userline::domain::entities::{UserRecord, UserStatRecord};

pub fn user(id: u64, username: &str) -> UserRecord {
    UserRecord {
        id,
        username: username.to_string(),
        phone: 13_000_000_000 + i64::try_from(id).expect("small id"),
        email: format!("{username}@example.com"),
        avatar: format!("https://img.example.com/{id}.png"),
        sex: 1,
        created_at: datetime!(2024-03-01 08:00 UTC),
        updated_at: datetime!(2024-03-01 08:00 UTC),
    }
}

/// Origin double backing all three repository traits with call counters and
/// injectable delays and failures.
#[derive(Default)]
pub struct FakeOrigin {
    users: Mutex<HashMap<u64, UserRecord>>,
    stats: Mutex<HashMap<u64, UserStatRecord>>,
    /// `(follower, followed)` pairs.
    edges: Mutex<HashSet<(u64, u64)>>,
    user_delays: Mutex<HashMap<u64, Duration>>,
    failing_users: Mutex<HashSet<u64>>,
    fail_stats: AtomicBool,
    next_id: AtomicU64,
    pub user_calls: AtomicUsize,
    pub stats_calls: AtomicUsize,
    pub following_calls: AtomicUsize,
    pub followers_calls: AtomicUsize,
}

impl FakeOrigin {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next_id: AtomicU64::new(100),
            ..Default::default()
        })
    }

    pub fn insert_user(&self, record: UserRecord) {
        self.users.lock().unwrap().insert(record.id, record);
    }

    pub fn set_stat(&self, user_id: u64, follow_count: i64, follower_count: i64) {
        self.stats.lock().unwrap().insert(
            user_id,
            UserStatRecord {
                user_id,
                follow_count,
                follower_count,
            },
        );
    }

    pub fn add_edge(&self, follower: u64, followed: u64) {
        self.edges.lock().unwrap().insert((follower, followed));
    }

    pub fn delay_user(&self, id: u64, delay: Duration) {
        self.user_delays.lock().unwrap().insert(id, delay);
    }

    pub fn fail_user(&self, id: u64) {
        self.failing_users.lock().unwrap().insert(id);
    }

    pub fn fail_stats(&self) {
        self.fail_stats.store(true, Ordering::SeqCst);
    }

    pub fn user_calls(&self) -> usize {
        self.user_calls.load(Ordering::SeqCst)
    }

    /// Origin calls of every kind.
    pub fn total_calls(&self) -> usize {
        self.user_calls.load(Ordering::SeqCst)
            + self.stats_calls.load(Ordering::SeqCst)
            + self.following_calls.load(Ordering::SeqCst)
            + self.followers_calls.load(Ordering::SeqCst)
    }

    fn bump_counters(&self, user: u64, target: u64, delta: i64) {
        let mut stats = self.stats.lock().unwrap();
        let entry = stats
            .entry(user)
            .or_insert_with(|| UserStatRecord::zero(user));
        entry.follow_count = (entry.follow_count + delta).max(0);
        let entry = stats
            .entry(target)
            .or_insert_with(|| UserStatRecord::zero(target));
        entry.follower_count = (entry.follower_count + delta).max(0);
    }
}

#[async_trait]
impl UsersRepo for FakeOrigin {
    async fn find_user_by_id(&self, id: u64) -> Result<Option<UserRecord>, RepoError> {
        self.user_calls.fetch_add(1, Ordering::SeqCst);
        // The row is read before the delay, like a slow response.
        let row = self.users.lock().unwrap().get(&id).cloned();
        let delay = self.user_delays.lock().unwrap().get(&id).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_users.lock().unwrap().contains(&id) {
            return Err(RepoError::Persistence(format!("user {id} unavailable")));
        }
        Ok(row)
    }

    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError> {
        let mut users = self.users.lock().unwrap();
        if users.values().any(|u| u.username == params.username) {
            return Err(RepoError::Duplicate {
                constraint: "user_base_username_key".to_string(),
            });
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let record = UserRecord {
            id,
            username: params.username,
            phone: params.phone,
            email: params.email,
            avatar: params.avatar,
            sex: params.sex,
            created_at: datetime!(2024-03-02 08:00 UTC),
            updated_at: datetime!(2024-03-02 08:00 UTC),
        };
        users.insert(id, record.clone());
        Ok(record)
    }

    async fn update_user(&self, params: UpdateUserParams) -> Result<UserRecord, RepoError> {
        let mut users = self.users.lock().unwrap();
        let record = users.get_mut(&params.id).ok_or(RepoError::NotFound)?;
        if let Some(avatar) = params.avatar {
            record.avatar = avatar;
        }
        if let Some(sex) = params.sex {
            record.sex = sex;
        }
        Ok(record.clone())
    }
}

#[async_trait]
impl UserStatsRepo for FakeOrigin {
    async fn stats_by_user_ids(
        &self,
        ids: &[u64],
    ) -> Result<HashMap<u64, UserStatRecord>, RepoError> {
        self.stats_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_stats.load(Ordering::SeqCst) {
            return Err(RepoError::Timeout);
        }
        let stats = self.stats.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| stats.get(id).map(|stat| (*id, *stat)))
            .collect())
    }
}

#[async_trait]
impl RelationsRepo for FakeOrigin {
    async fn following_among(&self, viewer: u64, ids: &[u64]) -> Result<HashSet<u64>, RepoError> {
        self.following_calls.fetch_add(1, Ordering::SeqCst);
        let edges = self.edges.lock().unwrap();
        Ok(ids
            .iter()
            .copied()
            .filter(|id| edges.contains(&(viewer, *id)))
            .collect())
    }

    async fn followers_among(&self, viewer: u64, ids: &[u64]) -> Result<HashSet<u64>, RepoError> {
        self.followers_calls.fetch_add(1, Ordering::SeqCst);
        let edges = self.edges.lock().unwrap();
        Ok(ids
            .iter()
            .copied()
            .filter(|id| edges.contains(&(*id, viewer)))
            .collect())
    }

    async fn follow(&self, user: u64, target: u64) -> Result<EdgeChange, RepoError> {
        if !self.edges.lock().unwrap().insert((user, target)) {
            return Ok(EdgeChange::Unchanged);
        }
        self.bump_counters(user, target, 1);
        Ok(EdgeChange::Applied)
    }

    async fn unfollow(&self, user: u64, target: u64) -> Result<EdgeChange, RepoError> {
        if !self.edges.lock().unwrap().remove(&(user, target)) {
            return Ok(EdgeChange::Unchanged);
        }
        self.bump_counters(user, target, -1);
        Ok(EdgeChange::Applied)
    }
}

/// Wraps a memory store and fails reads or writes on demand.
pub struct FlakyKvStore {
    inner: MemoryKvStore,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl FlakyKvStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryKvStore::new(&CacheConfig::default()),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
        })
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check(&self, flag: &AtomicBool, command: &'static str) -> Result<(), CacheError> {
        if flag.load(Ordering::SeqCst) {
            return Err(CacheError::command(command, "connection reset by peer"));
        }
        Ok(())
    }
}

#[async_trait]
impl KvStore for FlakyKvStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        self.check(&self.fail_reads, "GET")?;
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError> {
        self.check(&self.fail_writes, "SET")?;
        self.inner.set(key, value, ttl).await
    }

    async fn multi_get(&self, keys: &[String]) -> Result<Vec<Option<Bytes>>, CacheError> {
        self.check(&self.fail_reads, "MGET")?;
        self.inner.multi_get(keys).await
    }

    async fn del(&self, keys: &[String]) -> Result<(), CacheError> {
        self.check(&self.fail_writes, "DEL")?;
        self.inner.del(keys).await
    }
}

pub fn services_with(
    origin: &Arc<FakeOrigin>,
    store: Arc<dyn KvStore>,
    profile: ProfileConfig,
) -> UserServices {
    UserServices::new(
        origin.clone(),
        origin.clone(),
        origin.clone(),
        store,
        &CacheConfig::default(),
        profile,
    )
}

/// Services over a fresh in-process store with default settings.
pub fn services(origin: &Arc<FakeOrigin>) -> UserServices {
    let store = Arc::new(MemoryKvStore::new(&CacheConfig::default()));
    services_with(origin, store, ProfileConfig::default())
}
