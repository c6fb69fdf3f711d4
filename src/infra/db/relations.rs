use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::{Postgres, Transaction};

use crate::application::repos::{EdgeChange, RelationsRepo, RepoError};

use super::PostgresRepositories;
use super::util::{from_db_id, map_sqlx_error, to_db_id, to_db_ids};

const STATUS_ACTIVE: i16 = 1;
const STATUS_REMOVED: i16 = 0;

#[async_trait]
impl RelationsRepo for PostgresRepositories {
    async fn following_among(&self, viewer: u64, ids: &[u64]) -> Result<HashSet<u64>, RepoError> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }

        let rows: Vec<i64> = sqlx::query_scalar(
            "SELECT followed_uid FROM user_follow \
             WHERE user_id = $1 AND followed_uid = ANY($2) AND status = $3",
        )
        .bind(to_db_id(viewer)?)
        .bind(to_db_ids(ids)?)
        .bind(STATUS_ACTIVE)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(from_db_id).collect()
    }

    async fn followers_among(&self, viewer: u64, ids: &[u64]) -> Result<HashSet<u64>, RepoError> {
        if ids.is_empty() {
            return Ok(HashSet::new());
        }

        let rows: Vec<i64> = sqlx::query_scalar(
            "SELECT follower_uid FROM user_fans \
             WHERE user_id = $1 AND follower_uid = ANY($2) AND status = $3",
        )
        .bind(to_db_id(viewer)?)
        .bind(to_db_ids(ids)?)
        .bind(STATUS_ACTIVE)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter().map(from_db_id).collect()
    }

    async fn follow(&self, user: u64, target: u64) -> Result<EdgeChange, RepoError> {
        let (user, target) = (to_db_id(user)?, to_db_id(target)?);
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let inserted = sqlx::query(
            "INSERT INTO user_follow (user_id, followed_uid, status) VALUES ($1, $2, $3) \
             ON CONFLICT (user_id, followed_uid) DO UPDATE \
             SET status = EXCLUDED.status, updated_at = now() \
             WHERE user_follow.status <> EXCLUDED.status",
        )
        .bind(user)
        .bind(target)
        .bind(STATUS_ACTIVE)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?
        .rows_affected();

        if inserted == 0 {
            tx.rollback().await.map_err(map_sqlx_error)?;
            return Ok(EdgeChange::Unchanged);
        }

        sqlx::query(
            "INSERT INTO user_fans (user_id, follower_uid, status) VALUES ($1, $2, $3) \
             ON CONFLICT (user_id, follower_uid) DO UPDATE \
             SET status = EXCLUDED.status, updated_at = now()",
        )
        .bind(target)
        .bind(user)
        .bind(STATUS_ACTIVE)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        adjust_counters(&mut tx, user, target, 1).await?;
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(EdgeChange::Applied)
    }

    async fn unfollow(&self, user: u64, target: u64) -> Result<EdgeChange, RepoError> {
        let (user, target) = (to_db_id(user)?, to_db_id(target)?);
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let removed = sqlx::query(
            "UPDATE user_follow SET status = $3, updated_at = now() \
             WHERE user_id = $1 AND followed_uid = $2 AND status <> $3",
        )
        .bind(user)
        .bind(target)
        .bind(STATUS_REMOVED)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?
        .rows_affected();

        if removed == 0 {
            tx.rollback().await.map_err(map_sqlx_error)?;
            return Ok(EdgeChange::Unchanged);
        }

        sqlx::query(
            "UPDATE user_fans SET status = $3, updated_at = now() \
             WHERE user_id = $1 AND follower_uid = $2",
        )
        .bind(target)
        .bind(user)
        .bind(STATUS_REMOVED)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        adjust_counters(&mut tx, user, target, -1).await?;
        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(EdgeChange::Applied)
    }
}

/// Apply `delta` to `user`'s follow count and `target`'s follower count,
/// creating missing stats rows. Counters never drop below zero.
async fn adjust_counters(
    tx: &mut Transaction<'_, Postgres>,
    user: i64,
    target: i64,
    delta: i64,
) -> Result<(), RepoError> {
    sqlx::query(
        "INSERT INTO user_stat (user_id, follow_count) VALUES ($1, GREATEST($2, 0)) \
         ON CONFLICT (user_id) DO UPDATE \
         SET follow_count = GREATEST(user_stat.follow_count + $2, 0), updated_at = now()",
    )
    .bind(user)
    .bind(delta)
    .execute(&mut **tx)
    .await
    .map_err(map_sqlx_error)?;

    sqlx::query(
        "INSERT INTO user_stat (user_id, follower_count) VALUES ($1, GREATEST($2, 0)) \
         ON CONFLICT (user_id) DO UPDATE \
         SET follower_count = GREATEST(user_stat.follower_count + $2, 0), updated_at = now()",
    )
    .bind(target)
    .bind(delta)
    .execute(&mut **tx)
    .await
    .map_err(map_sqlx_error)?;

    Ok(())
}
