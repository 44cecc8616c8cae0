//! RedisHashStore - Redis の hash を使う本番用ストア
//!
//! | 操作 | Redis コマンド |
//! |------|----------------|
//! | set_field | `HSET` |
//! | get_field | `HGET` |
//! | get_all | `HGETALL` |
//! | delete_field | `HDEL` |
//! | keys | `HKEYS` |

use std::collections::HashMap;

use ::redis::AsyncCommands;
use ::redis::aio::MultiplexedConnection;
use async_trait::async_trait;

use crate::domain::StoreError;
use crate::ports::HashStore;

/// RedisHashStore は 1 本の MultiplexedConnection を共有する
///
/// MultiplexedConnection は clone しても同じ TCP 接続を使うので、
/// 各メソッドで clone して並行に呼び出せます。
#[derive(Clone)]
pub struct RedisHashStore {
    conn: MultiplexedConnection,
}

impl RedisHashStore {
    /// `redis://[:<password>@]<host>:<port>[/<db>]` に接続
    pub async fn new(url: &str) -> Result<Self, StoreError> {
        let client = ::redis::Client::open(url).map_err(|e| StoreError::Backend {
            message: format!("failed to create Redis client: {e}"),
            source: Some(Box::new(e)),
        })?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| StoreError::Backend {
                message: format!("failed to connect to Redis: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(Self { conn })
    }

    pub fn with_connection(conn: MultiplexedConnection) -> Self {
        Self { conn }
    }
}

fn map_redis_error(err: ::redis::RedisError, hash: &str) -> StoreError {
    StoreError::Backend {
        message: format!("Redis error for hash {hash}: {err}"),
        source: Some(Box::new(err)),
    }
}

#[async_trait]
impl HashStore for RedisHashStore {
    async fn set_field(&self, hash: &str, field: &str, value: &str) -> Result<(), StoreError> {
        let _: i64 = self
            .conn
            .clone()
            .hset(hash, field, value)
            .await
            .map_err(|e| map_redis_error(e, hash))?;
        Ok(())
    }

    async fn get_field(&self, hash: &str, field: &str) -> Result<Option<String>, StoreError> {
        self.conn
            .clone()
            .hget(hash, field)
            .await
            .map_err(|e| map_redis_error(e, hash))
    }

    async fn get_all(&self, hash: &str) -> Result<HashMap<String, String>, StoreError> {
        self.conn
            .clone()
            .hgetall(hash)
            .await
            .map_err(|e| map_redis_error(e, hash))
    }

    async fn delete_field(&self, hash: &str, field: &str) -> Result<bool, StoreError> {
        let removed: i64 = self
            .conn
            .clone()
            .hdel(hash, field)
            .await
            .map_err(|e| map_redis_error(e, hash))?;
        Ok(removed > 0)
    }

    async fn keys(&self, hash: &str) -> Result<Vec<String>, StoreError> {
        self.conn
            .clone()
            .hkeys(hash)
            .await
            .map_err(|e| map_redis_error(e, hash))
    }
}
