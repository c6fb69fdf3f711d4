//! Write paths. Every write goes to the origin first and then invalidates the
//! cache entries it affects; cached values are never updated in place.

use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use crate::application::repos::{
    CreateUserParams, EdgeChange, RelationsRepo, RepoError, UpdateUserParams, UsersRepo,
};
use crate::application::users::{ReadError, SideFetcher, UserReader};
use crate::domain::entities::UserRecord;
use crate::domain::error::DomainError;
use crate::domain::users::{validate_avatar, validate_email, validate_sex, validate_username};

const SOURCE: &str = "application::users::commands";

#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Read(#[from] ReadError),
    #[error("origin {stage} failed")]
    Repo {
        stage: &'static str,
        #[source]
        source: RepoError,
    },
}

impl CommandError {
    fn repo(stage: &'static str) -> impl FnOnce(RepoError) -> Self {
        move |source| Self::Repo { stage, source }
    }
}

#[derive(Debug, Clone)]
pub struct RegisterUser {
    pub username: String,
    pub phone: i64,
    pub email: String,
    pub avatar: String,
    pub sex: i32,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateUser {
    pub avatar: Option<String>,
    pub sex: Option<i32>,
}

#[derive(Clone)]
pub struct UserCommands {
    users: Arc<dyn UsersRepo>,
    relations: Arc<dyn RelationsRepo>,
    reader: UserReader,
    side: SideFetcher,
}

impl UserCommands {
    pub fn new(
        users: Arc<dyn UsersRepo>,
        relations: Arc<dyn RelationsRepo>,
        reader: UserReader,
        side: SideFetcher,
    ) -> Self {
        Self {
            users,
            relations,
            reader,
            side,
        }
    }

    /// Create a user. The new id's cache key is dropped afterwards so a
    /// negative entry from an earlier lookup cannot hide the new user.
    pub async fn register_user(&self, input: RegisterUser) -> Result<UserRecord, CommandError> {
        validate_username(&input.username)?;
        validate_email(&input.email)?;
        validate_avatar(&input.avatar)?;
        validate_sex(input.sex)?;

        let user = self
            .users
            .create_user(CreateUserParams {
                username: input.username.trim().to_string(),
                phone: input.phone,
                email: input.email,
                avatar: input.avatar,
                sex: input.sex,
            })
            .await
            .map_err(CommandError::repo("create_user"))?;

        self.reader.invalidate(user.id).await;
        info!(target = SOURCE, op = "register_user", user_id = user.id, "user registered");
        Ok(user)
    }

    /// Update a user and drop its cache entry.
    ///
    /// A load of the same user that read the row before this write cannot
    /// re-cache the old record within this process. Another process sharing
    /// the store can, until the entry's TTL.
    pub async fn update_user(&self, id: u64, input: UpdateUser) -> Result<UserRecord, CommandError> {
        if let Some(avatar) = input.avatar.as_deref() {
            validate_avatar(avatar)?;
        }
        if let Some(sex) = input.sex {
            validate_sex(sex)?;
        }

        self.reader.get_user(id).await?;

        let user = match self
            .users
            .update_user(UpdateUserParams {
                id,
                avatar: input.avatar,
                sex: input.sex,
            })
            .await
        {
            Ok(user) => user,
            Err(RepoError::NotFound) => return Err(ReadError::user_not_found(id).into()),
            Err(err) => return Err(CommandError::repo("update_user")(err)),
        };

        self.reader.invalidate(id).await;
        info!(target = SOURCE, op = "update_user", user_id = id, "user updated");
        Ok(user)
    }

    /// `user` starts following `target`. Following twice is a no-op.
    pub async fn follow(&self, user: u64, target: u64) -> Result<EdgeChange, CommandError> {
        self.check_edge(user, target).await?;

        let change = self
            .relations
            .follow(user, target)
            .await
            .map_err(CommandError::repo("follow"))?;
        self.after_edge_change("follow", user, target, change).await;
        Ok(change)
    }

    /// `user` stops following `target`. Unfollowing a user that is not
    /// followed is a no-op.
    pub async fn unfollow(&self, user: u64, target: u64) -> Result<EdgeChange, CommandError> {
        self.check_edge(user, target).await?;

        let change = self
            .relations
            .unfollow(user, target)
            .await
            .map_err(CommandError::repo("unfollow"))?;
        self.after_edge_change("unfollow", user, target, change).await;
        Ok(change)
    }

    async fn check_edge(&self, user: u64, target: u64) -> Result<(), CommandError> {
        if user == target {
            return Err(DomainError::CannotFollowSelf.into());
        }
        self.reader.get_user(target).await?;
        Ok(())
    }

    async fn after_edge_change(&self, op: &'static str, user: u64, target: u64, change: EdgeChange) {
        if change == EdgeChange::Unchanged {
            info!(target = SOURCE, op, user_id = user, target_id = target, "edge already in requested state");
            return;
        }
        self.side.invalidate_edge(user, target).await;
        info!(target = SOURCE, op, user_id = user, target_id = target, "edge updated");
    }
}
