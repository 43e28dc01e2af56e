//! Final-choice aggregation
//!
//! Collects each member's end-of-chat pick, detects quorum, and resolves
//! mutual picks into couple matches.

pub mod aggregator;

pub use aggregator::{mutual_pairs, FinalChoiceAggregator};
