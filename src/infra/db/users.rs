use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{CreateUserParams, RepoError, UpdateUserParams, UsersRepo},
    domain::entities::UserRecord,
};

use super::PostgresRepositories;
use super::util::{from_db_id, map_sqlx_error, to_db_id};

const USER_COLUMNS: &str = "id, username, phone, email, avatar, sex, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    phone: i64,
    email: String,
    avatar: String,
    sex: i32,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl TryFrom<UserRow> for UserRecord {
    type Error = RepoError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: from_db_id(row.id)?,
            username: row.username,
            phone: row.phone,
            email: row.email,
            avatar: row.avatar,
            sex: row.sex,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl UsersRepo for PostgresRepositories {
    async fn find_user_by_id(&self, id: u64) -> Result<Option<UserRecord>, RepoError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM user_base WHERE id = $1"
        ))
        .bind(to_db_id(id)?)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(UserRecord::try_from).transpose()
    }

    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let row = sqlx::query_as::<_, UserRow>(&format!(
            "INSERT INTO user_base (username, phone, email, avatar, sex) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(&params.username)
        .bind(params.phone)
        .bind(&params.email)
        .bind(&params.avatar)
        .bind(params.sex)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        sqlx::query("INSERT INTO user_stat (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
            .bind(row.id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        UserRecord::try_from(row)
    }

    async fn update_user(&self, params: UpdateUserParams) -> Result<UserRecord, RepoError> {
        let row = sqlx::query_as::<_, UserRow>(&format!(
            "UPDATE user_base \
             SET avatar = COALESCE($2, avatar), sex = COALESCE($3, sex), updated_at = now() \
             WHERE id = $1 \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(to_db_id(params.id)?)
        .bind(params.avatar)
        .bind(params.sex)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        UserRecord::try_from(row)
    }
}
