//! Unified storage facade: one entry point over every backend and domain
//!
//! The facade caches one coding-storage instance per (backend type, domain)
//! pair, so sequential operations against the same partition always go
//! through the same adapter. Resolution is race-free: concurrent first
//! accesses construct exactly one adapter.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::coder::{CodingValue, DataCoder, JsonDataCoder};
use crate::coding::CodingStorage;
use crate::environment::StorageEnvironment;
use crate::error::{ClearFailure, Result, StorageError};
use crate::factory::{DefaultStorageFactory, ObservableStorageFactory, UnifiedStorageFactory};
use crate::identity::StorageIdentity;
use crate::observable::{ObservableCodingStorage, ValueStream, ValueSubscription};
use crate::traits::KeyValueDataStorage;

/// Identifies one stored item: a backend-scoped raw key, an optional
/// domain, and the value type used for decode dispatch.
///
/// Two keys are equal iff raw key, domain, and value type all match; keys
/// for different backends are distinct types.
pub struct UnifiedKey<B: KeyValueDataStorage, V> {
    key: B::Key,
    domain: Option<B::Domain>,
    _value: PhantomData<fn() -> V>,
}

impl<B: KeyValueDataStorage, V> UnifiedKey<B, V> {
    /// Key in the caller's private default partition
    pub fn new(key: impl Into<B::Key>) -> Self {
        Self {
            key: key.into(),
            domain: None,
            _value: PhantomData,
        }
    }

    /// Key in the given partition
    pub fn in_domain(key: impl Into<B::Key>, domain: B::Domain) -> Self {
        Self {
            key: key.into(),
            domain: Some(domain),
            _value: PhantomData,
        }
    }

    /// The backend-scoped raw key
    pub fn key(&self) -> &B::Key {
        &self.key
    }

    /// The partition, if any
    pub fn domain(&self) -> Option<&B::Domain> {
        self.domain.as_ref()
    }
}

impl<B: KeyValueDataStorage, V> Clone for UnifiedKey<B, V> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            domain: self.domain.clone(),
            _value: PhantomData,
        }
    }
}

impl<B: KeyValueDataStorage, V> fmt::Debug for UnifiedKey<B, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnifiedKey")
            .field("backend", &B::BACKEND)
            .field("key", &self.key)
            .field("domain", &self.domain)
            .finish()
    }
}

impl<B: KeyValueDataStorage, V> PartialEq for UnifiedKey<B, V> {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.domain == other.domain
    }
}

impl<B: KeyValueDataStorage, V> Eq for UnifiedKey<B, V> {}

impl<B: KeyValueDataStorage, V> Hash for UnifiedKey<B, V> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
        self.domain.hash(state);
    }
}

/// One cached coding-storage instance, observable or not
pub enum StorageHandle<B: KeyValueDataStorage, C: DataCoder = JsonDataCoder> {
    /// Plain coding storage without change notification
    Plain(Arc<CodingStorage<B, C>>),
    /// Coding storage that publishes change events after every mutation
    Observable(Arc<ObservableCodingStorage<B, C>>),
}

impl<B: KeyValueDataStorage, C: DataCoder> Clone for StorageHandle<B, C> {
    fn clone(&self) -> Self {
        match self {
            StorageHandle::Plain(storage) => StorageHandle::Plain(storage.clone()),
            StorageHandle::Observable(storage) => StorageHandle::Observable(storage.clone()),
        }
    }
}

impl<B: KeyValueDataStorage, C: DataCoder> StorageHandle<B, C> {
    /// The resolved partition this instance operates on
    pub fn domain(&self) -> Option<&B::Domain> {
        match self {
            StorageHandle::Plain(storage) => storage.domain(),
            StorageHandle::Observable(storage) => storage.domain(),
        }
    }

    /// The observable storage, if this factory configuration produced one
    pub fn observable(&self) -> Option<&Arc<ObservableCodingStorage<B, C>>> {
        match self {
            StorageHandle::Plain(_) => None,
            StorageHandle::Observable(storage) => Some(storage),
        }
    }

    /// Decoded value for `key`, or `None` if absent
    pub async fn fetch<V: CodingValue>(&self, key: &B::Key) -> Result<Option<V>> {
        match self {
            StorageHandle::Plain(storage) => storage.fetch(key).await,
            StorageHandle::Observable(storage) => storage.fetch(key).await,
        }
    }

    /// Encode and store a value under `key`
    pub async fn save<V: CodingValue>(&self, value: &V, key: &B::Key) -> Result<()> {
        match self {
            StorageHandle::Plain(storage) => storage.save(value, key).await,
            StorageHandle::Observable(storage) => storage.save(value, key).await,
        }
    }

    /// Save if a value is present, delete otherwise
    pub async fn set<V: CodingValue>(&self, value: Option<&V>, key: &B::Key) -> Result<()> {
        match self {
            StorageHandle::Plain(storage) => storage.set(value, key).await,
            StorageHandle::Observable(storage) => storage.set(value, key).await,
        }
    }

    /// Remove the item if present
    pub async fn delete(&self, key: &B::Key) -> Result<()> {
        match self {
            StorageHandle::Plain(storage) => storage.delete(key).await,
            StorageHandle::Observable(storage) => storage.delete(key).await,
        }
    }

    /// Remove every item in this instance's domain
    pub async fn clear(&self) -> Result<()> {
        match self {
            StorageHandle::Plain(storage) => storage.clear().await,
            StorageHandle::Observable(storage) => storage.clear().await,
        }
    }

    fn describe(&self) -> String {
        match self.domain() {
            Some(domain) => format!("{}({domain:?})", B::BACKEND),
            None => format!("{}(default)", B::BACKEND),
        }
    }
}

/// Narrow object-safe view of a cached instance: enough to clear it during
/// fan-outs and to downcast back to the concrete handle at typed call sites
#[async_trait]
trait ErasedStorage: Send + Sync + 'static {
    async fn clear_erased(&self) -> Result<()>;
    fn describe(&self) -> String;
    fn as_any(&self) -> &dyn Any;
}

#[async_trait]
impl<B: KeyValueDataStorage, C: DataCoder> ErasedStorage for StorageHandle<B, C> {
    async fn clear_erased(&self) -> Result<()> {
        self.clear().await
    }

    fn describe(&self) -> String {
        StorageHandle::describe(self)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Entry point routing typed operations to lazily-created, cached
/// per-(backend, domain) storages
pub struct UnifiedStorage<F: UnifiedStorageFactory = DefaultStorageFactory> {
    storages: Mutex<HashMap<StorageIdentity, Arc<dyn ErasedStorage>>>,
    factory: F,
    env: StorageEnvironment,
}

impl UnifiedStorage<DefaultStorageFactory> {
    /// Facade over the global environment, without change notification
    #[must_use]
    pub fn new() -> Self {
        Self::with_factory(DefaultStorageFactory::new())
    }
}

impl Default for UnifiedStorage<DefaultStorageFactory> {
    fn default() -> Self {
        Self::new()
    }
}

impl UnifiedStorage<ObservableStorageFactory> {
    /// Facade over the global environment with change notification enabled
    #[must_use]
    pub fn observable() -> Self {
        Self::with_factory(ObservableStorageFactory::new())
    }
}

impl<F: UnifiedStorageFactory> UnifiedStorage<F> {
    /// Facade over the global environment with a custom factory
    pub fn with_factory(factory: F) -> Self {
        Self::with_environment(factory, StorageEnvironment::global())
    }

    /// Facade over a specific environment
    pub fn with_environment(factory: F, env: StorageEnvironment) -> Self {
        Self {
            storages: Mutex::new(HashMap::new()),
            factory,
            env,
        }
    }

    /// The environment this facade constructs storages from
    pub fn environment(&self) -> &StorageEnvironment {
        &self.env
    }

    async fn resolve<B: KeyValueDataStorage>(
        &self,
        domain: Option<&B::Domain>,
    ) -> Result<StorageHandle<B, F::Coder>> {
        let identity = StorageIdentity::new::<B>(domain);

        // The lock is held across construction so concurrent first accesses
        // to one (backend, domain) pair construct exactly one adapter.
        let mut storages = self.storages.lock().await;
        if let Some(cached) = storages.get(&identity) {
            return cached
                .as_any()
                .downcast_ref::<StorageHandle<B, F::Coder>>()
                .cloned()
                .ok_or_else(|| {
                    StorageError::Configuration(format!(
                        "cached instance for {} has an unexpected concrete type",
                        B::BACKEND
                    ))
                });
        }

        let backend: B = self
            .factory
            .data_storage(domain.cloned(), &self.env)
            .await?;
        let handle = self.factory.coding_storage(backend, &self.env);
        storages.insert(identity, Arc::new(handle.clone()));
        tracing::debug!(backend = B::BACKEND, ?domain, "constructed storage");
        Ok(handle)
    }

    /// Decoded value for the key, or `None` if absent
    pub async fn fetch<B: KeyValueDataStorage, V: CodingValue>(
        &self,
        key: &UnifiedKey<B, V>,
    ) -> Result<Option<V>> {
        self.resolve::<B>(key.domain()).await?.fetch(key.key()).await
    }

    /// Encode and store a value under the key
    pub async fn save<B: KeyValueDataStorage, V: CodingValue>(
        &self,
        value: &V,
        key: &UnifiedKey<B, V>,
    ) -> Result<()> {
        self.resolve::<B>(key.domain()).await?.save(value, key.key()).await
    }

    /// Save if a value is present, delete otherwise
    pub async fn set<B: KeyValueDataStorage, V: CodingValue>(
        &self,
        value: Option<&V>,
        key: &UnifiedKey<B, V>,
    ) -> Result<()> {
        self.resolve::<B>(key.domain()).await?.set(value, key.key()).await
    }

    /// Remove the item if present
    pub async fn delete<B: KeyValueDataStorage, V: CodingValue>(
        &self,
        key: &UnifiedKey<B, V>,
    ) -> Result<()> {
        self.resolve::<B>(key.domain()).await?.delete(key.key()).await
    }

    /// Clear one backend's partition, constructing its storage if this
    /// facade has not touched it yet
    pub async fn clear_domain<B: KeyValueDataStorage>(
        &self,
        domain: Option<&B::Domain>,
    ) -> Result<()> {
        self.resolve::<B>(domain).await?.clear().await
    }

    /// Clear every cached instance of one backend type, across all domains
    /// resolved during this facade's lifetime
    pub async fn clear_backend<B: KeyValueDataStorage>(&self) -> Result<()> {
        let targets: Vec<Arc<dyn ErasedStorage>> = {
            let storages = self.storages.lock().await;
            storages
                .iter()
                .filter(|(identity, _)| identity.backend() == TypeId::of::<B>())
                .map(|(_, storage)| storage.clone())
                .collect()
        };
        Self::clear_targets(targets).await
    }

    /// Clear every cached instance regardless of backend
    pub async fn clear(&self) -> Result<()> {
        let targets: Vec<Arc<dyn ErasedStorage>> = {
            let storages = self.storages.lock().await;
            storages.values().cloned().collect()
        };
        Self::clear_targets(targets).await
    }

    /// Best-effort fan-out: every instance is attempted, failures aggregate
    async fn clear_targets(targets: Vec<Arc<dyn ErasedStorage>>) -> Result<()> {
        let mut failures = Vec::new();
        for target in targets {
            if let Err(error) = target.clear_erased().await {
                tracing::warn!(instance = %target.describe(), %error, "clear failed, continuing");
                failures.push(ClearFailure {
                    target: target.describe(),
                    error,
                });
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(StorageError::Clear(failures))
        }
    }

    /// Hot subscription to the key's change events, or `None` if this
    /// facade's factory does not produce observable storages
    pub async fn subscribe<B: KeyValueDataStorage, V: CodingValue>(
        &self,
        key: &UnifiedKey<B, V>,
    ) -> Result<Option<ValueSubscription<V, F::Coder>>> {
        let handle = self.resolve::<B>(key.domain()).await?;
        Ok(handle
            .observable()
            .map(|storage| storage.subscribe(key.key())))
    }

    /// The key's change events as a stream, or `None` if this facade's
    /// factory does not produce observable storages
    pub async fn stream<B: KeyValueDataStorage, V: CodingValue>(
        &self,
        key: &UnifiedKey<B, V>,
    ) -> Result<Option<ValueStream<V, F::Coder>>> {
        let handle = self.resolve::<B>(key.domain()).await?;
        Ok(handle.observable().map(|storage| storage.stream(key.key())))
    }
}
