//! Matchmaking wait queues
//!
//! Users wait in per-(gender, party-size) lists in the shared store until a
//! complete group can be drained. Draining is poll-driven; the sweeper
//! publishes a `MatchEvent` per completed group.

pub mod match_queue;
pub mod sweeper;

// Re-export commonly used types
pub use match_queue::MatchQueue;
pub use sweeper::QueueSweeper;
