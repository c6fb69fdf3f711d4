//! Redis-backed key-value store.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use ::redis::{AsyncCommands, Client, aio::MultiplexedConnection};
use tracing::info;

use super::store::{CacheError, KvStore};

/// Key-value store over one multiplexed Redis connection.
///
/// The connection is cheap to clone and pipelines concurrent commands, so
/// each call clones it instead of checking one out of a pool.
#[derive(Clone)]
pub struct RedisKvStore {
    conn: MultiplexedConnection,
}

impl RedisKvStore {
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client = Client::open(url).map_err(|err| CacheError::Connection(err.to_string()))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|err| CacheError::Connection(err.to_string()))?;

        info!(target = "userline::cache::redis", "connected to redis");
        Ok(Self { conn })
    }
}

#[async_trait]
impl KvStore for RedisKvStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, CacheError> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = conn
            .get(key)
            .await
            .map_err(|err| CacheError::command("GET", err))?;
        Ok(value.map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn.clone();
        // SET EX rejects a zero expiry.
        let seconds = ttl.as_secs().max(1);
        let _: () = conn
            .set_ex(key, value.as_ref(), seconds)
            .await
            .map_err(|err| CacheError::command("SETEX", err))?;
        Ok(())
    }

    async fn multi_get(&self, keys: &[String]) -> Result<Vec<Option<Bytes>>, CacheError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.conn.clone();
        let values: Vec<Option<Vec<u8>>> = ::redis::cmd("MGET")
            .arg(keys)
            .query_async(&mut conn)
            .await
            .map_err(|err| CacheError::command("MGET", err))?;
        Ok(values.into_iter().map(|value| value.map(Bytes::from)).collect())
    }

    async fn del(&self, keys: &[String]) -> Result<(), CacheError> {
        if keys.is_empty() {
            return Ok(());
        }

        let mut conn = self.conn.clone();
        let _: i64 = conn
            .del(keys)
            .await
            .map_err(|err| CacheError::command("DEL", err))?;
        Ok(())
    }
}
