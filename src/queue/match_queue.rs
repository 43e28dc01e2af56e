//! Wait-queue operations against the shared store
//!
//! The length check and the multi-bucket pop in `try_drain` are deliberately
//! not one atomic operation; a concurrent dequeue can shrink a bucket between
//! the two. The drain re-validates after popping and pushes entries back when
//! the group came up short, so the worst case is a wasted tick, never a
//! partial match.

use crate::error::{MatchingError, Result};
use crate::store::{keys, SharedStore};
use crate::types::{Gender, WaitingUser};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Matchmaking wait queues keyed by (gender, party size)
pub struct MatchQueue {
    store: Arc<dyn SharedStore>,
}

impl MatchQueue {
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        Self { store }
    }

    /// Append a user to the tail of their queue
    ///
    /// Rejects with a conflict error when the user is already waiting
    /// anywhere in the fleet.
    pub async fn enqueue(&self, user: &WaitingUser) -> Result<()> {
        if !self.store.set_add(keys::WAITING_USERS, &user.user_id).await? {
            return Err(MatchingError::AlreadyQueued {
                user_id: user.user_id.clone(),
            }
            .into());
        }

        let key = keys::queue_key(user.gender, user.party_size);
        let entry = serialize_entry(user)?;
        if let Err(e) = self.store.list_push(&key, &entry).await {
            // Release the waiting-set claim, otherwise every retry sees
            // AlreadyQueued for a user who is in no queue
            if let Err(rollback) = self
                .store
                .set_remove(keys::WAITING_USERS, &user.user_id)
                .await
            {
                warn!(
                    "Failed to release waiting claim after push error - user_id: '{}', error: {}",
                    user.user_id, rollback
                );
            }
            return Err(e);
        }

        info!(
            "User enqueued - user_id: '{}', gender: {}, party_size: {}",
            user.user_id, user.gender, user.party_size
        );
        Ok(())
    }

    /// Remove one matching entry from the queue
    ///
    /// Used on disconnect and timeout. Returns false when the entry was not
    /// found (already matched) - that is a no-op, not an error.
    pub async fn dequeue(&self, user: &WaitingUser) -> Result<bool> {
        let key = keys::queue_key(user.gender, user.party_size);
        let entry = serialize_entry(user)?;
        let removed = self.store.list_remove(&key, &entry).await?;
        self.store
            .set_remove(keys::WAITING_USERS, &user.user_id)
            .await?;

        if removed {
            info!("User dequeued - user_id: '{}'", user.user_id);
        } else {
            debug!(
                "Dequeue found no entry (already matched) - user_id: '{}'",
                user.user_id
            );
        }
        Ok(removed)
    }

    /// Drain one complete group for the given party size, if available
    ///
    /// Party size N requires N users of each gender. Returns None when any
    /// bucket is short, either at the length check or after the pop.
    pub async fn try_drain(&self, party_size: u32) -> Result<Option<Vec<WaitingUser>>> {
        let required = party_size as usize;

        // Length check across every bucket first; cheap and avoids pops that
        // will obviously come up short.
        for gender in Gender::ALL {
            let key = keys::queue_key(gender, party_size);
            if self.store.list_len(&key).await? < required {
                return Ok(None);
            }
        }

        // Pop phase. A concurrent dequeue may have shrunk a bucket since the
        // check, so re-validate counts after popping.
        let mut popped: Vec<(String, Vec<String>)> = Vec::new();
        let mut complete = true;
        for gender in Gender::ALL {
            let key = keys::queue_key(gender, party_size);
            let entries = self.store.list_pop(&key, required).await?;
            if entries.len() < required {
                complete = false;
            }
            popped.push((key, entries));
        }

        if !complete {
            warn!(
                "Drain raced with a dequeue for party_size {}; requeueing partial pops",
                party_size
            );
            self.requeue(&popped).await;
            return Ok(None);
        }

        let mut group = Vec::with_capacity(required * Gender::ALL.len());
        for (_, entries) in &popped {
            for entry in entries {
                match serde_json::from_str::<WaitingUser>(entry) {
                    Ok(user) => group.push(user),
                    Err(e) => {
                        warn!("Dropping malformed queue entry: {}", e);
                        complete = false;
                    }
                }
            }
        }

        if !complete {
            // A corrupt entry makes the group short; give the rest back.
            self.requeue(&popped).await;
            return Ok(None);
        }

        for user in &group {
            self.store
                .set_remove(keys::WAITING_USERS, &user.user_id)
                .await?;
        }

        info!(
            "Drained complete group - party_size: {}, users: {:?}",
            party_size,
            group.iter().map(|u| u.user_id.as_str()).collect::<Vec<_>>()
        );
        Ok(Some(group))
    }

    /// Best-effort push-back of popped entries after a failed drain
    async fn requeue(&self, popped: &[(String, Vec<String>)]) {
        for (key, entries) in popped {
            for entry in entries {
                if let Err(e) = self.store.list_push(key, entry).await {
                    warn!("Failed to requeue entry on {}: {}", key, e);
                }
            }
        }
    }
}

fn serialize_entry(user: &WaitingUser) -> Result<String> {
    serde_json::to_string(user).map_err(|e| {
        MatchingError::InternalError {
            message: format!("Failed to serialize waiting user: {}", e),
        }
        .into()
    })
}
