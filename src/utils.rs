//! Utility functions for the matchmaking and room service

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Generate a new unique match id (also used as the room id)
pub fn generate_match_id() -> Uuid {
    Uuid::new_v4()
}

/// Get the current UTC timestamp
pub fn current_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Seconds remaining until `deadline`, clamped at zero
pub fn seconds_until(deadline: DateTime<Utc>) -> u64 {
    (deadline - Utc::now()).num_seconds().max(0) as u64
}
