//! Credential storage backend
//!
//! Items are addressed by (service name, account name) and partitioned by an
//! access-group string derived from the domain. Accessibility and the sync
//! flag are passed through to the secure store verbatim.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::environment::StorageEnvironment;
use crate::error::CredentialError;
use crate::secure_store::{Accessibility, SecureItem, SecureStore, SecureStoreError};
use crate::traits::{BackendError, KeyValueDataStorage};

/// Key of one credential item: an account name plus per-item store policy
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CredentialKey {
    name: String,
    accessibility: Option<Accessibility>,
    synchronizable: bool,
}

impl CredentialKey {
    /// Key with no accessibility policy and syncing disabled
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            accessibility: None,
            synchronizable: false,
        }
    }

    /// Attach an availability policy
    #[must_use]
    pub fn with_accessibility(mut self, accessibility: Accessibility) -> Self {
        self.accessibility = Some(accessibility);
        self
    }

    /// Allow the platform to sync the item across devices
    #[must_use]
    pub fn synchronizable(mut self, synchronizable: bool) -> Self {
        self.synchronizable = synchronizable;
        self
    }

    /// The account name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Partition of the credential store: an app group shared across a team.
///
/// The effective identity is the derived access-group string, so two domains
/// with the same `team_id.group_id` compare equal.
#[derive(Clone, Debug)]
pub struct CredentialDomain {
    group_id: String,
    team_id: String,
}

impl CredentialDomain {
    /// Domain for the given group and team identifiers
    #[must_use]
    pub fn new(group_id: impl Into<String>, team_id: impl Into<String>) -> Self {
        Self {
            group_id: group_id.into(),
            team_id: team_id.into(),
        }
    }

    /// Access-group string used to address the secure store
    #[must_use]
    pub fn access_group(&self) -> String {
        format!("{}.{}", self.team_id, self.group_id)
    }
}

impl PartialEq for CredentialDomain {
    fn eq(&self, other: &Self) -> bool {
        self.access_group() == other.access_group()
    }
}

impl Eq for CredentialDomain {}

impl Hash for CredentialDomain {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.access_group().hash(state);
    }
}

/// Storage adapter over the environment's secure credential store
pub struct CredentialStorage {
    domain: Option<CredentialDomain>,
    service: String,
    access_group: Option<String>,
    store: Arc<dyn SecureStore>,
}

impl fmt::Debug for CredentialStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStorage")
            .field("service", &self.service)
            .field("access_group", &self.access_group)
            .finish_non_exhaustive()
    }
}

impl BackendError for CredentialError {
    fn other<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        CredentialError::Other(Box::new(source))
    }
}

impl CredentialStorage {
    fn item<'a>(&'a self, key: &'a CredentialKey) -> SecureItem<'a> {
        SecureItem {
            service: &self.service,
            access_group: self.access_group.as_deref(),
            account: &key.name,
            accessibility: key.accessibility,
            synchronizable: key.synchronizable,
        }
    }

    fn convert(error: SecureStoreError) -> CredentialError {
        match error {
            SecureStoreError::Status(status) => CredentialError::Status(status),
            SecureStoreError::Other(source) => CredentialError::Other(source),
        }
    }
}

#[async_trait]
impl KeyValueDataStorage for CredentialStorage {
    type Key = CredentialKey;
    type Domain = CredentialDomain;
    type Error = CredentialError;

    const BACKEND: &'static str = "credential";

    async fn open(
        domain: Option<CredentialDomain>,
        env: &StorageEnvironment,
    ) -> Result<Self, CredentialError> {
        let access_group = domain.as_ref().map(CredentialDomain::access_group);
        tracing::debug!(backend = Self::BACKEND, ?access_group, "opening storage");

        Ok(Self {
            domain,
            service: env.default_group().to_string(),
            access_group,
            store: env.secure_store().clone(),
        })
    }

    fn domain(&self) -> Option<&CredentialDomain> {
        self.domain.as_ref()
    }

    async fn fetch(&self, key: &CredentialKey) -> Result<Option<Bytes>, CredentialError> {
        match self.store.get(&self.item(key)) {
            Ok(data) => Ok(Some(data)),
            Err(error) if error.is_not_found() => Ok(None),
            Err(error) => Err(Self::convert(error)),
        }
    }

    async fn save(&self, value: Bytes, key: &CredentialKey) -> Result<(), CredentialError> {
        self.store
            .set(value, &self.item(key))
            .map_err(Self::convert)
    }

    async fn delete(&self, key: &CredentialKey) -> Result<(), CredentialError> {
        match self.store.remove(&self.item(key)) {
            Ok(()) => Ok(()),
            Err(error) if error.is_not_found() => Ok(()),
            Err(error) => Err(Self::convert(error)),
        }
    }

    /// Removes only the items under this adapter's service name and access
    /// group; other services and groups are untouched.
    async fn clear(&self) -> Result<(), CredentialError> {
        tracing::debug!(
            backend = Self::BACKEND,
            access_group = ?self.access_group,
            "clearing access group"
        );
        match self
            .store
            .remove_all(&self.service, self.access_group.as_deref())
        {
            Ok(()) => Ok(()),
            Err(error) if error.is_not_found() => Ok(()),
            Err(error) => Err(Self::convert(error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn domain(group: &str) -> CredentialDomain {
        CredentialDomain::new(group, "TEAM01")
    }

    #[tokio::test]
    async fn fetch_missing_is_none_not_an_error() {
        let env = StorageEnvironment::isolated();
        let storage = CredentialStorage::open_default(&env).await.unwrap();
        let stored = storage.fetch(&CredentialKey::new("token")).await.unwrap();
        assert!(stored.is_none());
    }

    #[tokio::test]
    async fn save_and_fetch_round_trip() {
        let env = StorageEnvironment::isolated();
        let storage = CredentialStorage::open_default(&env).await.unwrap();
        let key = CredentialKey::new("token")
            .with_accessibility(Accessibility::AfterFirstUnlock)
            .synchronizable(true);

        storage
            .save(Bytes::from_static(b"secret"), &key)
            .await
            .unwrap();

        assert_eq!(
            storage.fetch(&key).await.unwrap(),
            Some(Bytes::from_static(b"secret"))
        );
    }

    #[tokio::test]
    async fn delete_missing_is_a_no_op() {
        let env = StorageEnvironment::isolated();
        let storage = CredentialStorage::open_default(&env).await.unwrap();
        storage.delete(&CredentialKey::new("token")).await.unwrap();
    }

    #[tokio::test]
    async fn clear_is_scoped_to_the_access_group() {
        let env = StorageEnvironment::isolated();
        let group_a = CredentialStorage::open(Some(domain("group.a")), &env)
            .await
            .unwrap();
        let group_b = CredentialStorage::open(Some(domain("group.b")), &env)
            .await
            .unwrap();
        let key = CredentialKey::new("token");

        group_a.save(Bytes::from_static(b"a"), &key).await.unwrap();
        group_b.save(Bytes::from_static(b"b"), &key).await.unwrap();

        group_a.clear().await.unwrap();

        assert!(group_a.fetch(&key).await.unwrap().is_none());
        assert_eq!(
            group_b.fetch(&key).await.unwrap(),
            Some(Bytes::from_static(b"b"))
        );
    }

    #[test]
    fn domain_identity_is_the_derived_access_group() {
        let a = CredentialDomain::new("group", "TEAM01");
        let b = CredentialDomain::new("group", "TEAM01");
        let c = CredentialDomain::new("group", "TEAM02");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.access_group(), "TEAM01.group");
    }
}
