use std::sync::Arc;

use common_utils::errors::CustomResult;
use error_stack::report;
use tokio::sync::Mutex;

/// Current canonical identity of a user, as held by the user repository.
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct IdentityProfile {
    pub user_id: i64,
    pub organisation_id: i64,
    pub organisation_name: String,
    pub domain_id: i64,
    pub domain_name: String,
    pub user_name: String,
}

#[derive(thiserror::Error, Debug)]
pub enum IdentityLookupError {
    #[error("No user found with id {0}")]
    NotFound(i64),
}

/// Resolves a user id to the identity it is currently assigned to.
#[async_trait::async_trait]
pub trait IdentityLookup: Send + Sync {
    async fn find_identity_by_user_id(
        &self,
        user_id: i64,
    ) -> CustomResult<IdentityProfile, IdentityLookupError>;
}

#[async_trait::async_trait]
impl<T: IdentityLookup + ?Sized> IdentityLookup for Arc<T> {
    async fn find_identity_by_user_id(
        &self,
        user_id: i64,
    ) -> CustomResult<IdentityProfile, IdentityLookupError> {
        (**self).find_identity_by_user_id(user_id).await
    }
}

/// In-memory identity repository that records every lookup it serves.
#[derive(Clone, Debug, Default)]
pub struct MockIdentityStore {
    pub profiles: Arc<Mutex<Vec<IdentityProfile>>>,
    pub lookups: Arc<Mutex<Vec<i64>>>,
}

impl MockIdentityStore {
    pub fn with_profiles(profiles: impl IntoIterator<Item = IdentityProfile>) -> Self {
        Self {
            profiles: Arc::new(Mutex::new(profiles.into_iter().collect())),
            lookups: Arc::default(),
        }
    }

    pub async fn lookup_count(&self) -> usize {
        self.lookups.lock().await.len()
    }
}

#[async_trait::async_trait]
impl IdentityLookup for MockIdentityStore {
    async fn find_identity_by_user_id(
        &self,
        user_id: i64,
    ) -> CustomResult<IdentityProfile, IdentityLookupError> {
        self.lookups.lock().await.push(user_id);
        self.profiles
            .lock()
            .await
            .iter()
            .find(|profile| profile.user_id == user_id)
            .cloned()
            .ok_or_else(|| report!(IdentityLookupError::NotFound(user_id)))
    }
}
