//! Core storage traits that define the backend capability contract

use std::fmt::Debug;
use std::hash::Hash;

use async_trait::async_trait;
use bytes::Bytes;

use crate::environment::StorageEnvironment;
use crate::error::StorageError;

/// Raw key of one backend adapter
pub trait StorageKey: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

impl<T> StorageKey for T where T: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

/// Storage partition identifier of one backend adapter
pub trait StorageDomain: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

impl<T> StorageDomain for T where T: Clone + Eq + Hash + Debug + Send + Sync + 'static {}

/// Error type of one backend adapter
///
/// Every adapter error converts into [`StorageError`] and can wrap an
/// arbitrary underlying cause, so upstream layers never need
/// backend-specific error knowledge.
pub trait BackendError: std::error::Error + Into<StorageError> + Send + Sync + 'static {
    /// Wrap an underlying platform error
    fn other<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static;
}

/// Capability contract implemented by every backend adapter
///
/// An adapter stores and retrieves raw bytes under a [`StorageKey`], scoped
/// to an optional [`StorageDomain`]. All operations are suspend-capable;
/// adapters confine their shared state so concurrent callers against one
/// adapter are serialized only as much as the backing primitive requires.
#[async_trait]
pub trait KeyValueDataStorage: Sized + Send + Sync + 'static {
    /// Backend-scoped raw key
    type Key: StorageKey;
    /// Storage partition identifier
    type Domain: StorageDomain;
    /// Adapter-specific error type
    type Error: BackendError;

    /// Tag used in logs and aggregated error reports
    const BACKEND: &'static str;

    /// Open an adapter for the given partition.
    ///
    /// Fails if the domain cannot be resolved to a valid partition. Must not
    /// fail for `domain = None`.
    async fn open(
        domain: Option<Self::Domain>,
        env: &StorageEnvironment,
    ) -> std::result::Result<Self, Self::Error>;

    /// Open an adapter for the caller's private default partition
    async fn open_default(env: &StorageEnvironment) -> std::result::Result<Self, Self::Error> {
        Self::open(None, env).await
    }

    /// The resolved partition this adapter operates on
    fn domain(&self) -> Option<&Self::Domain>;

    /// Currently stored bytes for `key`, or `None` if absent. Never mutates.
    async fn fetch(&self, key: &Self::Key)
        -> std::result::Result<Option<Bytes>, Self::Error>;

    /// Store or overwrite bytes under `key`
    async fn save(&self, value: Bytes, key: &Self::Key)
        -> std::result::Result<(), Self::Error>;

    /// Remove the item if present; absence is not an error
    async fn delete(&self, key: &Self::Key) -> std::result::Result<(), Self::Error>;

    /// Save if a value is present, delete otherwise
    async fn set(
        &self,
        value: Option<Bytes>,
        key: &Self::Key,
    ) -> std::result::Result<(), Self::Error> {
        match value {
            Some(value) => self.save(value, key).await,
            None => self.delete(key).await,
        }
    }

    /// Remove every item in this adapter's domain only
    async fn clear(&self) -> std::result::Result<(), Self::Error>;
}
