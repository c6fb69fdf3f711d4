//! Domain entities mirrored from persistent storage.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::error::DomainError;

/// Canonical user row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: u64,
    pub username: String,
    pub phone: i64,
    pub email: String,
    pub avatar: String,
    pub sex: i32,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Follow counters of one user. Users without a stats row have zero counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStatRecord {
    pub user_id: u64,
    pub follow_count: i64,
    pub follower_count: i64,
}

impl UserStatRecord {
    pub fn zero(user_id: u64) -> Self {
        Self {
            user_id,
            follow_count: 0,
            follower_count: 0,
        }
    }
}

/// Relationship between a viewer and one target user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelationFlags {
    /// The viewer follows the target.
    pub is_following: bool,
    /// The target follows the viewer.
    pub is_follower: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserFollow {
    pub follow_num: i64,
    pub fans_num: i64,
    pub is_follow: u8,
    pub is_fans: u8,
}

/// A user enriched with counters and the viewer's relationship flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: u64,
    pub username: String,
    pub avatar: String,
    pub sex: i32,
    pub user_follow: UserFollow,
}

impl UserProfile {
    pub fn assemble(
        user: &UserRecord,
        stat: &UserStatRecord,
        flags: RelationFlags,
    ) -> Result<Self, DomainError> {
        if stat.user_id != user.id {
            return Err(DomainError::invariant(format!(
                "counters for user {} attached to user {}",
                stat.user_id, user.id
            )));
        }
        if stat.follow_count < 0 || stat.follower_count < 0 {
            return Err(DomainError::invariant(format!(
                "negative counters for user {}",
                user.id
            )));
        }

        Ok(Self {
            id: user.id,
            username: user.username.clone(),
            avatar: user.avatar.clone(),
            sex: user.sex,
            user_follow: UserFollow {
                follow_num: stat.follow_count,
                fans_num: stat.follower_count,
                is_follow: u8::from(flags.is_following),
                is_fans: u8::from(flags.is_follower),
            },
        })
    }
}
