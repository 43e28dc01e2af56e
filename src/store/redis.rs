//! Redis store implementation
//!
//! Production `SharedStore` backed by a Redis connection manager. Every
//! failure is mapped to `StoreUnavailable`, which callers treat as retryable
//! on the next poll tick.

use crate::error::{MatchingError, Result};
use crate::store::SharedStore;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::time::Duration;
use tracing::info;

/// Redis-backed `SharedStore` implementation
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
}

impl RedisStore {
    /// Connect to Redis and build a managed connection
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url).map_err(|e| MatchingError::StoreUnavailable {
            message: format!("Invalid Redis URL: {}", e),
        })?;

        let manager =
            ConnectionManager::new(client)
                .await
                .map_err(|e| MatchingError::StoreUnavailable {
                    message: format!("Failed to connect to Redis: {}", e),
                })?;

        info!("Connected to Redis shared store");
        Ok(Self { manager })
    }

    fn store_err(e: redis::RedisError) -> anyhow::Error {
        MatchingError::StoreUnavailable {
            message: e.to_string(),
        }
        .into()
    }
}

#[async_trait]
impl SharedStore for RedisStore {
    async fn list_push(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: () = conn.rpush(key, value).await.map_err(Self::store_err)?;
        Ok(())
    }

    async fn list_remove(&self, key: &str, value: &str) -> Result<bool> {
        let mut conn = self.manager.clone();
        let removed: i64 = conn.lrem(key, 1, value).await.map_err(Self::store_err)?;
        Ok(removed > 0)
    }

    async fn list_len(&self, key: &str) -> Result<usize> {
        let mut conn = self.manager.clone();
        let len: usize = conn.llen(key).await.map_err(Self::store_err)?;
        Ok(len)
    }

    async fn list_pop(&self, key: &str, count: usize) -> Result<Vec<String>> {
        let Some(count) = NonZeroUsize::new(count) else {
            return Ok(Vec::new());
        };
        let mut conn = self.manager.clone();
        let popped: Vec<String> = conn
            .lpop(key, Some(count))
            .await
            .map_err(Self::store_err)?;
        Ok(popped)
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool> {
        let mut conn = self.manager.clone();
        let added: i64 = conn.sadd(key, member).await.map_err(Self::store_err)?;
        Ok(added > 0)
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool> {
        let mut conn = self.manager.clone();
        let removed: i64 = conn.srem(key, member).await.map_err(Self::store_err)?;
        Ok(removed > 0)
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        let mut conn = self.manager.clone();
        let members: Vec<String> = conn.smembers(key).await.map_err(Self::store_err)?;
        Ok(members)
    }

    async fn set_len(&self, key: &str) -> Result<usize> {
        let mut conn = self.manager.clone();
        let len: usize = conn.scard(key).await.map_err(Self::store_err)?;
        Ok(len)
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: () = conn.hset(key, field, value).await.map_err(Self::store_err)?;
        Ok(())
    }

    async fn hash_set_nx(&self, key: &str, field: &str, value: &str) -> Result<bool> {
        let mut conn = self.manager.clone();
        let set: bool = conn
            .hset_nx(key, field, value)
            .await
            .map_err(Self::store_err)?;
        Ok(set)
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>> {
        let mut conn = self.manager.clone();
        let value: Option<String> = conn.hget(key, field).await.map_err(Self::store_err)?;
        Ok(value)
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>> {
        let mut conn = self.manager.clone();
        let entries: HashMap<String, String> =
            conn.hgetall(key).await.map_err(Self::store_err)?;
        Ok(entries)
    }

    async fn hash_remove(&self, key: &str, field: &str) -> Result<bool> {
        let mut conn = self.manager.clone();
        let removed: i64 = conn.hdel(key, field).await.map_err(Self::store_err)?;
        Ok(removed > 0)
    }

    async fn hash_len(&self, key: &str) -> Result<usize> {
        let mut conn = self.manager.clone();
        let len: usize = conn.hlen(key).await.map_err(Self::store_err)?;
        Ok(len)
    }

    async fn counter_incr(&self, key: &str) -> Result<i64> {
        let mut conn = self.manager.clone();
        let value: i64 = conn.incr(key, 1).await.map_err(Self::store_err)?;
        Ok(value)
    }

    async fn set_expiring(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.manager.clone();
        let secs = ttl.as_secs().max(1);
        let _: () = conn
            .set_ex(key, value, secs)
            .await
            .map_err(Self::store_err)?;
        Ok(())
    }

    async fn ttl_remaining(&self, key: &str) -> Result<Option<Duration>> {
        let mut conn = self.manager.clone();
        let millis: i64 = conn.pttl(key).await.map_err(Self::store_err)?;
        // -2: key missing, -1: no expiry set; both read as "no deadline left"
        if millis <= 0 {
            return Ok(None);
        }
        Ok(Some(Duration::from_millis(millis as u64)))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: () = conn.del(key).await.map_err(Self::store_err)?;
        Ok(())
    }
}

// Integration tests against a live Redis instance live in tests/; the trait
// surface is covered by the MemoryStore tests.
