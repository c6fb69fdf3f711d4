//! Repository traits describing persistence adapters.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::entities::{UserRecord, UserStatRecord};

/// Origin store failure.
///
/// `Clone` so one failed coalesced load can be handed to every waiter.
#[derive(Debug, Clone, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct CreateUserParams {
    pub username: String,
    pub phone: i64,
    pub email: String,
    pub avatar: String,
    pub sex: i32,
}

#[derive(Debug, Clone)]
pub struct UpdateUserParams {
    pub id: u64,
    pub avatar: Option<String>,
    pub sex: Option<i32>,
}

/// Outcome of an edge mutation; `Unchanged` when the edge was already in the
/// requested state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeChange {
    Applied,
    Unchanged,
}

#[async_trait]
pub trait UsersRepo: Send + Sync {
    async fn find_user_by_id(&self, id: u64) -> Result<Option<UserRecord>, RepoError>;

    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError>;

    /// Fails with `RepoError::NotFound` when the row does not exist.
    async fn update_user(&self, params: UpdateUserParams) -> Result<UserRecord, RepoError>;
}

#[async_trait]
pub trait UserStatsRepo: Send + Sync {
    /// Users without a stats row are absent from the result.
    async fn stats_by_user_ids(
        &self,
        ids: &[u64],
    ) -> Result<HashMap<u64, UserStatRecord>, RepoError>;
}

#[async_trait]
pub trait RelationsRepo: Send + Sync {
    /// Subset of `ids` that `viewer` follows.
    async fn following_among(&self, viewer: u64, ids: &[u64]) -> Result<HashSet<u64>, RepoError>;

    /// Subset of `ids` that follow `viewer`.
    async fn followers_among(&self, viewer: u64, ids: &[u64]) -> Result<HashSet<u64>, RepoError>;

    /// Record that `user` follows `target` and bump both counters atomically.
    async fn follow(&self, user: u64, target: u64) -> Result<EdgeChange, RepoError>;

    async fn unfollow(&self, user: u64, target: u64) -> Result<EdgeChange, RepoError>;
}
