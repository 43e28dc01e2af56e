//! Shared ephemeral store integration
//!
//! The store is the only point of coordination between service processes:
//! wait queues, sweep indices, phase deadlines, presence records, and vote
//! tallies all live here. The `SharedStore` trait keeps the rest of the crate
//! independent of the concrete backend; production uses Redis, tests use the
//! in-memory implementation.

pub mod keys;
pub mod memory;
pub mod redis;

// Re-export commonly used types
pub use memory::MemoryStore;
pub use redis::RedisStore;

use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

/// Atomic operations the service needs from the shared store
///
/// Every method maps to a single store command; none of them compose multiple
/// keys atomically. Cross-key consistency is the caller's problem and is
/// handled with idempotent re-checks, not locks.
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Append a value to the tail of a list
    async fn list_push(&self, key: &str, value: &str) -> Result<()>;

    /// Remove one matching entry from a list; false if no entry matched
    async fn list_remove(&self, key: &str, value: &str) -> Result<bool>;

    /// Current length of a list
    async fn list_len(&self, key: &str) -> Result<usize>;

    /// Pop up to `count` entries from the head of a list
    async fn list_pop(&self, key: &str, count: usize) -> Result<Vec<String>>;

    /// Add a member to a set; false if it was already present
    async fn set_add(&self, key: &str, member: &str) -> Result<bool>;

    /// Remove a member from a set; false if it was not present
    async fn set_remove(&self, key: &str, member: &str) -> Result<bool>;

    /// All members of a set
    async fn set_members(&self, key: &str) -> Result<Vec<String>>;

    /// Number of members in a set
    async fn set_len(&self, key: &str) -> Result<usize>;

    /// Set a hash field unconditionally
    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<()>;

    /// Set a hash field only if absent; false if the field already existed
    async fn hash_set_nx(&self, key: &str, field: &str, value: &str) -> Result<bool>;

    /// Read a single hash field
    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>>;

    /// Read a whole hash
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>>;

    /// Remove a hash field; false if it was not present
    async fn hash_remove(&self, key: &str, field: &str) -> Result<bool>;

    /// Number of fields in a hash
    async fn hash_len(&self, key: &str) -> Result<usize>;

    /// Increment a counter and return the new value
    async fn counter_incr(&self, key: &str) -> Result<i64>;

    /// Write a plain value with a TTL
    async fn set_expiring(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Remaining TTL of a key; None when the key is missing or expired
    async fn ttl_remaining(&self, key: &str) -> Result<Option<Duration>>;

    /// Delete a key of any type
    async fn delete(&self, key: &str) -> Result<()>;
}
