use crate::application::repos::RepoError;

pub fn map_sqlx_error(err: sqlx::Error) -> RepoError {
    match err {
        sqlx::Error::RowNotFound => RepoError::NotFound,
        sqlx::Error::PoolTimedOut => RepoError::Timeout,
        sqlx::Error::Database(db) if db.message().contains("duplicate key") => {
            RepoError::Duplicate {
                constraint: db.constraint().unwrap_or("unknown").to_string(),
            }
        }
        sqlx::Error::Database(db)
            if db
                .message()
                .contains("canceling statement due to user request") =>
        {
            RepoError::Timeout
        }
        other => RepoError::from_persistence(other),
    }
}

/// Postgres has no unsigned integers; ids are stored as `BIGINT`.
pub fn to_db_id(id: u64) -> Result<i64, RepoError> {
    i64::try_from(id).map_err(|_| RepoError::from_persistence(format!("id {id} exceeds BIGINT")))
}

pub fn to_db_ids(ids: &[u64]) -> Result<Vec<i64>, RepoError> {
    ids.iter().copied().map(to_db_id).collect()
}

pub fn from_db_id(id: i64) -> Result<u64, RepoError> {
    u64::try_from(id).map_err(|_| RepoError::from_persistence(format!("negative id {id} in storage")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip_within_bigint_range() {
        assert_eq!(to_db_id(42).unwrap(), 42);
        assert_eq!(from_db_id(42).unwrap(), 42);
        assert!(to_db_id(u64::MAX).is_err());
        assert!(from_db_id(-1).is_err());
    }

    #[test]
    fn pool_timeout_maps_to_timeout() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::PoolTimedOut),
            RepoError::Timeout
        ));
    }
}
