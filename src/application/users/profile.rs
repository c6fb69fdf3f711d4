//! Profile aggregation.
//!
//! A batch of profiles is built from the viewer, the target users and three
//! side datasets fetched concurrently. One enrichment unit per resolved
//! target then assembles its profile into a slot fixed by the target's input
//! position, so output order never depends on completion order. The whole
//! call runs under one deadline and fails as a unit.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use metrics::{counter, histogram};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, warn};

use crate::application::users::{ReadError, SideFetcher, UserReader};
use crate::cache::lock::mutex_lock;
use crate::domain::entities::{RelationFlags, UserProfile, UserRecord, UserStatRecord};

const SOURCE: &str = "application::users::profile";
const OPERATION: &str = "batch_profiles";

pub(crate) const METRIC_AGGREGATION_MS: &str = "userline_aggregation_ms";
pub(crate) const METRIC_AGGREGATION_TIMEOUT: &str = "userline_aggregation_timeout_total";

const DEFAULT_DEADLINE_MS: u64 = 3_000;
const DEFAULT_MAX_CONCURRENCY: usize = 16;

#[derive(Debug, Clone, Copy)]
pub struct ProfileConfig {
    /// Budget of one whole aggregation call, side fetches included.
    pub deadline: Duration,
    /// Upper bound on enrichment units and batch origin loads in flight.
    pub max_concurrency: usize,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            deadline: Duration::from_millis(DEFAULT_DEADLINE_MS),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}

impl From<&crate::config::AggregationSettings> for ProfileConfig {
    fn from(settings: &crate::config::AggregationSettings) -> Self {
        Self {
            deadline: settings.deadline,
            max_concurrency: settings.max_concurrency,
        }
    }
}

/// Everything the enrichment units read. Built once per call; units never
/// perform I/O.
struct SideData {
    users: HashMap<u64, UserRecord>,
    following: HashMap<u64, bool>,
    followers: HashMap<u64, bool>,
    stats: HashMap<u64, UserStatRecord>,
}

impl SideData {
    fn profile_for(&self, id: u64) -> Result<UserProfile, ReadError> {
        let user = self
            .users
            .get(&id)
            .ok_or_else(|| ReadError::Invariant(format!("user {id} missing from batch")))?;
        let stat = self
            .stats
            .get(&id)
            .copied()
            .unwrap_or_else(|| UserStatRecord::zero(id));
        let flags = RelationFlags {
            is_following: self.following.get(&id).copied().unwrap_or(false),
            is_follower: self.followers.get(&id).copied().unwrap_or(false),
        };

        UserProfile::assemble(user, &stat, flags).map_err(|err| ReadError::Invariant(err.to_string()))
    }
}

type Slots = Arc<Mutex<Vec<Option<UserProfile>>>>;

#[derive(Clone)]
pub struct ProfileAssembler {
    reader: UserReader,
    side: SideFetcher,
    config: ProfileConfig,
}

impl ProfileAssembler {
    pub fn new(reader: UserReader, side: SideFetcher, config: ProfileConfig) -> Self {
        Self {
            reader,
            side,
            config: ProfileConfig {
                max_concurrency: config.max_concurrency.max(1),
                ..config
            },
        }
    }

    pub fn config(&self) -> ProfileConfig {
        self.config
    }

    /// Profiles of `ids` as seen by `viewer`, in input order with duplicates
    /// kept. Ids that do not resolve to a user are left out.
    ///
    /// Fails as a whole if the viewer does not exist, a side fetch or unit
    /// fails, or the deadline passes.
    pub async fn batch_profiles(&self, viewer: u64, ids: &[u64]) -> Result<Vec<UserProfile>, ReadError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let started = Instant::now();
        let mut units = JoinSet::new();
        let outcome = timeout_at(
            started + self.config.deadline,
            self.aggregate(viewer, ids, &mut units),
        )
        .await;
        histogram!(METRIC_AGGREGATION_MS).record(started.elapsed().as_secs_f64() * 1_000.0);

        match outcome {
            Ok(Ok(profiles)) => {
                debug!(
                    target = SOURCE,
                    op = OPERATION,
                    viewer_id = viewer,
                    requested = ids.len(),
                    returned = profiles.len(),
                    outcome = "ok"
                );
                Ok(profiles)
            }
            Ok(Err(err)) => {
                units.detach_all();
                warn!(target = SOURCE, op = OPERATION, viewer_id = viewer, error = %err, outcome = "failed");
                Err(err)
            }
            Err(_) => {
                units.detach_all();
                counter!(METRIC_AGGREGATION_TIMEOUT).increment(1);
                let deadline_ms = u64::try_from(self.config.deadline.as_millis()).unwrap_or(u64::MAX);
                warn!(
                    target = SOURCE,
                    op = OPERATION,
                    viewer_id = viewer,
                    deadline_ms,
                    outcome = "timeout"
                );
                Err(ReadError::Timeout {
                    operation: OPERATION,
                    deadline_ms,
                })
            }
        }
    }

    /// Profile of one user as seen by `viewer`.
    pub async fn profile(&self, viewer: u64, id: u64) -> Result<UserProfile, ReadError> {
        self.batch_profiles(viewer, &[id])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ReadError::user_not_found(id))
    }

    async fn aggregate(
        &self,
        viewer: u64,
        ids: &[u64],
        units: &mut JoinSet<Result<(), ReadError>>,
    ) -> Result<Vec<UserProfile>, ReadError> {
        let mut seen = HashSet::with_capacity(ids.len());
        let unique: Vec<u64> = ids.iter().copied().filter(|id| seen.insert(*id)).collect();

        let (_viewer, users, following, followers, stats) = tokio::try_join!(
            self.reader.get_user(viewer),
            self.reader.get_users(&unique),
            self.side.following(viewer, &unique),
            self.side.followers(viewer, &unique),
            self.side.stats(&unique),
        )?;

        let data = Arc::new(SideData {
            users,
            following,
            followers,
            stats,
        });
        let slots: Slots = Arc::new(Mutex::new(vec![None; ids.len()]));
        let permits = Arc::new(Semaphore::new(self.config.max_concurrency));

        for (position, &id) in ids.iter().enumerate() {
            if !data.users.contains_key(&id) {
                continue;
            }
            let permit = Arc::clone(&permits)
                .acquire_owned()
                .await
                .map_err(|err| ReadError::Invariant(err.to_string()))?;
            let data = Arc::clone(&data);
            let slots = Arc::clone(&slots);
            units.spawn(async move {
                let _permit = permit;
                let profile = data.profile_for(id)?;
                mutex_lock(&slots, SOURCE, "store_profile")[position] = Some(profile);
                Ok(())
            });
        }

        while let Some(joined) = units.join_next().await {
            joined.map_err(|err| ReadError::Invariant(format!("enrichment unit aborted: {err}")))??;
        }

        let filled = std::mem::take(&mut *mutex_lock(&slots, SOURCE, "collect_profiles"));
        Ok(filled.into_iter().flatten().collect())
    }
}
