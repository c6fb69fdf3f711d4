use std::collections::HashMap;

use async_trait::async_trait;

use crate::{
    application::repos::{RepoError, UserStatsRepo},
    domain::entities::UserStatRecord,
};

use super::PostgresRepositories;
use super::util::{from_db_id, map_sqlx_error, to_db_ids};

#[derive(sqlx::FromRow)]
struct UserStatRow {
    user_id: i64,
    follow_count: i64,
    follower_count: i64,
}

#[async_trait]
impl UserStatsRepo for PostgresRepositories {
    async fn stats_by_user_ids(
        &self,
        ids: &[u64],
    ) -> Result<HashMap<u64, UserStatRecord>, RepoError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let rows = sqlx::query_as::<_, UserStatRow>(
            "SELECT user_id, follow_count, follower_count \
             FROM user_stat \
             WHERE user_id = ANY($1)",
        )
        .bind(to_db_ids(ids)?)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        rows.into_iter()
            .map(|row| {
                let user_id = from_db_id(row.user_id)?;
                Ok((
                    user_id,
                    UserStatRecord {
                        user_id,
                        follow_count: row.follow_count,
                        follower_count: row.follower_count,
                    },
                ))
            })
            .collect()
    }
}
