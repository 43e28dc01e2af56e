//! In-memory store implementation
//!
//! Single-process stand-in for the shared store, used by tests and dry runs.
//! TTLs are evaluated lazily on read, which is enough for the sweep loops.

use crate::error::Result;
use crate::store::SharedStore;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

#[derive(Default)]
struct MemoryInner {
    lists: HashMap<String, VecDeque<String>>,
    sets: HashMap<String, HashSet<String>>,
    hashes: HashMap<String, HashMap<String, String>>,
    counters: HashMap<String, i64>,
    values: HashMap<String, String>,
    deadlines: HashMap<String, Instant>,
}

impl MemoryInner {
    /// Drop a key whose deadline has passed
    fn expire_if_due(&mut self, key: &str) {
        if let Some(deadline) = self.deadlines.get(key) {
            if *deadline <= Instant::now() {
                self.deadlines.remove(key);
                self.values.remove(key);
            }
        }
    }
}

/// In-memory `SharedStore` implementation
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Force a TTL key to expire immediately (test helper)
    pub async fn expire_now(&self, key: &str) {
        let mut inner = self.inner.lock().await;
        if inner.deadlines.contains_key(key) {
            inner.deadlines.insert(key.to_string(), Instant::now());
        }
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn list_push(&self, key: &str, value: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner
            .lists
            .entry(key.to_string())
            .or_default()
            .push_back(value.to_string());
        Ok(())
    }

    async fn list_remove(&self, key: &str, value: &str) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        if let Some(list) = inner.lists.get_mut(key) {
            if let Some(pos) = list.iter().position(|v| v == value) {
                list.remove(pos);
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn list_len(&self, key: &str) -> Result<usize> {
        let inner = self.inner.lock().await;
        Ok(inner.lists.get(key).map(|l| l.len()).unwrap_or(0))
    }

    async fn list_pop(&self, key: &str, count: usize) -> Result<Vec<String>> {
        let mut inner = self.inner.lock().await;
        let mut popped = Vec::new();
        if let Some(list) = inner.lists.get_mut(key) {
            for _ in 0..count {
                match list.pop_front() {
                    Some(value) => popped.push(value),
                    None => break,
                }
            }
        }
        Ok(popped)
    }

    async fn set_add(&self, key: &str, member: &str) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        Ok(inner
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string()))
    }

    async fn set_remove(&self, key: &str, member: &str) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        Ok(inner
            .sets
            .get_mut(key)
            .map(|s| s.remove(member))
            .unwrap_or(false))
    }

    async fn set_members(&self, key: &str) -> Result<Vec<String>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .sets
            .get(key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn set_len(&self, key: &str) -> Result<usize> {
        let inner = self.inner.lock().await;
        Ok(inner.sets.get(key).map(|s| s.len()).unwrap_or(0))
    }

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_string());
        Ok(())
    }

    async fn hash_set_nx(&self, key: &str, field: &str, value: &str) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        let hash = inner.hashes.entry(key.to_string()).or_default();
        if hash.contains_key(field) {
            return Ok(false);
        }
        hash.insert(field.to_string(), value.to_string());
        Ok(true)
    }

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .hashes
            .get(key)
            .and_then(|h| h.get(field))
            .cloned())
    }

    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>> {
        let inner = self.inner.lock().await;
        Ok(inner.hashes.get(key).cloned().unwrap_or_default())
    }

    async fn hash_remove(&self, key: &str, field: &str) -> Result<bool> {
        let mut inner = self.inner.lock().await;
        Ok(inner
            .hashes
            .get_mut(key)
            .map(|h| h.remove(field).is_some())
            .unwrap_or(false))
    }

    async fn hash_len(&self, key: &str) -> Result<usize> {
        let inner = self.inner.lock().await;
        Ok(inner.hashes.get(key).map(|h| h.len()).unwrap_or(0))
    }

    async fn counter_incr(&self, key: &str) -> Result<i64> {
        let mut inner = self.inner.lock().await;
        let counter = inner.counters.entry(key.to_string()).or_insert(0);
        *counter += 1;
        Ok(*counter)
    }

    async fn set_expiring(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.values.insert(key.to_string(), value.to_string());
        inner
            .deadlines
            .insert(key.to_string(), Instant::now() + ttl);
        Ok(())
    }

    async fn ttl_remaining(&self, key: &str) -> Result<Option<Duration>> {
        let mut inner = self.inner.lock().await;
        inner.expire_if_due(key);
        Ok(inner
            .deadlines
            .get(key)
            .map(|d| d.saturating_duration_since(Instant::now())))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut inner = self.inner.lock().await;
        inner.lists.remove(key);
        inner.sets.remove(key);
        inner.hashes.remove(key);
        inner.counters.remove(key);
        inner.values.remove(key);
        inner.deadlines.remove(key);
        Ok(())
    }
}
