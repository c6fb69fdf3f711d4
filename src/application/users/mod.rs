//! User read paths, profile aggregation and cache-invalidating writes.

pub mod commands;
pub mod profile;
pub mod read;
pub mod side;

use std::sync::Arc;

use thiserror::Error;

use crate::application::repos::{RelationsRepo, RepoError, UserStatsRepo, UsersRepo};
use crate::cache::{CacheConfig, CacheError, CacheKey, EntityCache, KvStore, LoadAborted};

pub use commands::{CommandError, RegisterUser, UpdateUser, UserCommands};
pub use profile::{ProfileAssembler, ProfileConfig};
pub use read::UserReader;
pub use side::SideFetcher;

/// Failure of a read path.
///
/// `Clone` because a coalesced load hands the same error to every waiter.
#[derive(Debug, Clone, Error)]
pub enum ReadError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: u64 },
    #[error("cache {stage} failed for `{key}`")]
    Cache {
        stage: &'static str,
        key: String,
        #[source]
        source: CacheError,
    },
    #[error("origin {stage} failed for {subject}")]
    Origin {
        stage: &'static str,
        subject: String,
        #[source]
        source: RepoError,
    },
    #[error("{operation} exceeded its {deadline_ms}ms deadline")]
    Timeout {
        operation: &'static str,
        deadline_ms: u64,
    },
    #[error(transparent)]
    Aborted(#[from] LoadAborted),
    #[error("read invariant violated: {0}")]
    Invariant(String),
}

impl ReadError {
    pub fn user_not_found(id: u64) -> Self {
        Self::NotFound { entity: "user", id }
    }

    pub(crate) fn cache(stage: &'static str, key: &CacheKey, source: CacheError) -> Self {
        Self::Cache {
            stage,
            key: key.to_string(),
            source,
        }
    }

    pub(crate) fn cache_batch(stage: &'static str, keys: &[CacheKey], source: CacheError) -> Self {
        let key = match keys {
            [single] => single.to_string(),
            [first, ..] => format!("{first} (+{} more)", keys.len() - 1),
            [] => String::new(),
        };
        Self::Cache { stage, key, source }
    }

    pub(crate) fn origin(stage: &'static str, subject: impl Into<String>, source: RepoError) -> Self {
        Self::Origin {
            stage,
            subject: subject.into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ReadError::NotFound { .. })
    }
}

/// Every user-facing service, wired over one cache store and one set of
/// origin repositories.
#[derive(Clone)]
pub struct UserServices {
    pub reader: UserReader,
    pub profiles: ProfileAssembler,
    pub commands: UserCommands,
}

impl UserServices {
    pub fn new(
        users: Arc<dyn UsersRepo>,
        stats: Arc<dyn UserStatsRepo>,
        relations: Arc<dyn RelationsRepo>,
        store: Arc<dyn KvStore>,
        cache: &CacheConfig,
        profile: ProfileConfig,
    ) -> Self {
        let reader = UserReader::new(
            Arc::clone(&users),
            EntityCache::new(Arc::clone(&store), cache),
            profile.max_concurrency,
        );
        let side = SideFetcher::new(
            stats,
            Arc::clone(&relations),
            EntityCache::new(Arc::clone(&store), cache),
            EntityCache::new(store, cache),
        );
        let profiles = ProfileAssembler::new(reader.clone(), side.clone(), profile);
        let commands = UserCommands::new(users, relations, reader.clone(), side);

        Self {
            reader,
            profiles,
            commands,
        }
    }
}
