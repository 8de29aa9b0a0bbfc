//! Redis store client for Ember sessions.
//!
//! [`RedisStore`] implements [`SessionStore`] over a
//! [`ConnectionManager`](redis::aio::ConnectionManager), which reconnects on
//! its own after connection loss. Atomic batches are sent as one
//! `MULTI`/`EXEC` pipeline. Retry policy is left to the connection manager;
//! every other failure surfaces as [`StoreError::Backend`].

use std::collections::HashSet;

use async_trait::async_trait;
use ember_session::{SessionStore, StoreCommand, StoreError, StoreResult};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tracing::{debug, trace};

fn backend(err: redis::RedisError) -> StoreError {
    StoreError::Backend(err.to_string())
}

/// Redis reports "missing" and "no expiry" as negative TTLs.
fn remaining(raw: i64) -> Option<u64> {
    u64::try_from(raw).ok()
}

/// Build the `MULTI`/`EXEC` pipeline for an atomic batch.
fn atomic_pipeline(commands: &[StoreCommand]) -> redis::Pipeline {
    let mut pipe = redis::pipe();
    pipe.atomic();
    for command in commands {
        match command {
            StoreCommand::Set { key, value } => {
                pipe.set(key, value).ignore();
            }
            StoreCommand::Expire { key, seconds } => {
                pipe.expire(key, i64::try_from(*seconds).unwrap_or(i64::MAX))
                    .ignore();
            }
            StoreCommand::Delete { key } => {
                pipe.del(key).ignore();
            }
            StoreCommand::Rename { from, to } => {
                pipe.rename(from, to).ignore();
            }
        }
    }
    pipe
}

/// [`SessionStore`] backed by Redis.
///
/// Cloning is cheap; clones share the underlying multiplexed connection.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connect to the Redis server at `url` (e.g. `redis://localhost:6379/0`).
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client = redis::Client::open(url).map_err(backend)?;
        let conn = ConnectionManager::new(client).await.map_err(backend)?;
        debug!(url = %url, "Connected to Redis");
        Ok(Self { conn })
    }

    /// Wrap an existing connection manager.
    pub fn from_connection(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

#[async_trait]
impl SessionStore for RedisStore {
    async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.conn().exists(key).await.map_err(backend)
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.conn().get(key).await.map_err(backend)
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let _: () = self.conn().set(key, value).await.map_err(backend)?;
        Ok(())
    }

    async fn ttl(&self, key: &str) -> StoreResult<Option<u64>> {
        let raw: i64 = self.conn().ttl(key).await.map_err(backend)?;
        Ok(remaining(raw))
    }

    async fn remaining_millis(&self, key: &str) -> StoreResult<Option<u64>> {
        let raw: i64 = self.conn().pttl(key).await.map_err(backend)?;
        Ok(remaining(raw))
    }

    async fn hash_get(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        self.conn().hget(key, field).await.map_err(backend)
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> StoreResult<()> {
        let _: () = self
            .conn()
            .hset(key, field, value)
            .await
            .map_err(backend)?;
        Ok(())
    }

    async fn hash_delete(&self, key: &str, field: &str) -> StoreResult<()> {
        let _: () = self.conn().hdel(key, field).await.map_err(backend)?;
        Ok(())
    }

    async fn hash_field_names(&self, key: &str) -> StoreResult<HashSet<String>> {
        self.conn().hkeys(key).await.map_err(backend)
    }

    async fn delete_key(&self, key: &str) -> StoreResult<()> {
        let _: () = self.conn().del(key).await.map_err(backend)?;
        Ok(())
    }

    async fn rename_key(&self, from: &str, to: &str) -> StoreResult<()> {
        let _: () = self.conn().rename(from, to).await.map_err(backend)?;
        Ok(())
    }

    async fn keys_matching(&self, pattern: &str) -> StoreResult<HashSet<String>> {
        trace!(pattern = %pattern, "Scanning Redis keyspace");
        self.conn().keys(pattern).await.map_err(backend)
    }

    async fn run_atomic(&self, commands: &[StoreCommand]) -> StoreResult<()> {
        if commands.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn();
        let _: () = atomic_pipeline(commands)
            .query_async(&mut conn)
            .await
            .map_err(backend)?;
        Ok(())
    }
}
