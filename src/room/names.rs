//! Display identity pools for group rooms
//!
//! Group members chat under assigned aliases, not their account identities.
//! Names are handed out round-robin per gender, offset by the room's sequence
//! number so consecutive rooms do not all start with the same alias.

use crate::types::Gender;

const MALE_NAMES: [&str; 8] = [
    "Apollo", "Atlas", "Basil", "Caspian", "Dorian", "Felix", "Jasper", "Orion",
];

const FEMALE_NAMES: [&str; 8] = [
    "Aurora", "Calla", "Daphne", "Freya", "Iris", "Luna", "Selene", "Willow",
];

/// The alias for the `index`-th member of a gender within a room
pub fn display_name(gender: Gender, seq: u64, index: usize) -> String {
    let pool: &[&str] = match gender {
        Gender::Male => &MALE_NAMES,
        Gender::Female => &FEMALE_NAMES,
    };
    pool[(seq as usize + index) % pool.len()].to_string()
}
