//! Profile lookup interface and implementations
//!
//! The matching pipeline needs each connecting user's gender, birth date,
//! address and requested party size. Where that data comes from is a
//! deployment concern, so it sits behind a trait.

use crate::error::{MatchingError, Result};
use crate::types::{UserId, WaitingUser};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

/// Resolves a user id into the matching attributes
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ProfileProvider: Send + Sync {
    /// Look up the matching profile for a user
    async fn waiting_profile(&self, user_id: &UserId) -> Result<WaitingUser>;
}

/// In-memory provider backed by a seeded profile table
///
/// Used by tests, the dry-run mode and the smoke tester. Deployments with a
/// real upstream profile service supply their own implementation.
pub struct StaticProfileProvider {
    profiles: RwLock<HashMap<UserId, WaitingUser>>,
}

impl StaticProfileProvider {
    pub fn new() -> Self {
        Self {
            profiles: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_profiles(profiles: Vec<WaitingUser>) -> Self {
        let provider = Self::new();
        for profile in profiles {
            provider.insert(profile);
        }
        provider
    }

    /// Add or replace a profile
    pub fn insert(&self, profile: WaitingUser) {
        if let Ok(mut profiles) = self.profiles.write() {
            profiles.insert(profile.user_id.clone(), profile);
        }
    }

    /// Number of seeded profiles
    pub fn len(&self) -> usize {
        self.profiles.read().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for StaticProfileProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProfileProvider for StaticProfileProvider {
    async fn waiting_profile(&self, user_id: &UserId) -> Result<WaitingUser> {
        let profiles = self
            .profiles
            .read()
            .map_err(|_| MatchingError::InternalError {
                message: "Failed to acquire profile lock".to_string(),
            })?;
        profiles
            .get(user_id)
            .cloned()
            .ok_or_else(|| {
                MatchingError::ProfileLookupFailed {
                    user_id: user_id.clone(),
                }
                .into()
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Gender;
    use chrono::NaiveDate;

    fn profile(user_id: &str, gender: Gender) -> WaitingUser {
        WaitingUser {
            user_id: user_id.to_string(),
            gender,
            birth_date: NaiveDate::from_ymd_opt(1995, 4, 12).unwrap(),
            address: "Mapo-gu".to_string(),
            party_size: 2,
        }
    }

    #[tokio::test]
    async fn test_static_provider_returns_seeded_profile() {
        let provider =
            StaticProfileProvider::with_profiles(vec![profile("u1", Gender::Female)]);
        let found = provider.waiting_profile(&"u1".to_string()).await.unwrap();
        assert_eq!(found.gender, Gender::Female);
        assert_eq!(found.party_size, 2);
    }

    #[tokio::test]
    async fn test_static_provider_unknown_user_fails() {
        let provider = StaticProfileProvider::new();
        assert!(provider.waiting_profile(&"ghost".to_string()).await.is_err());
    }

    #[tokio::test]
    async fn test_insert_replaces_existing_profile() {
        let provider = StaticProfileProvider::with_profiles(vec![profile("u1", Gender::Male)]);
        let mut updated = profile("u1", Gender::Male);
        updated.party_size = 4;
        provider.insert(updated);

        let found = provider.waiting_profile(&"u1".to_string()).await.unwrap();
        assert_eq!(found.party_size, 4);
        assert_eq!(provider.len(), 1);
    }

    #[tokio::test]
    async fn test_mock_provider_seam() {
        let mut mock = MockProfileProvider::new();
        mock.expect_waiting_profile()
            .returning(|user_id| {
                Ok(WaitingUser {
                    user_id: user_id.clone(),
                    gender: Gender::Male,
                    birth_date: NaiveDate::from_ymd_opt(1990, 1, 1).unwrap(),
                    address: "Gangnam-gu".to_string(),
                    party_size: 3,
                })
            });

        let found = mock.waiting_profile(&"u9".to_string()).await.unwrap();
        assert_eq!(found.party_size, 3);
    }
}
