//! Factories deciding how storages are constructed and whether change
//! notification is enabled

use std::sync::Arc;

use async_trait::async_trait;

use crate::coder::{DataCoder, JsonDataCoder};
use crate::coding::CodingStorage;
use crate::environment::StorageEnvironment;
use crate::error::Result;
use crate::observable::ObservableCodingStorage;
use crate::traits::KeyValueDataStorage;
use crate::unified::StorageHandle;

/// Strategy for constructing backend adapters and wrapping them in a coding
/// storage
#[async_trait]
pub trait UnifiedStorageFactory: Send + Sync + 'static {
    /// Coder shared by every storage this factory produces
    type Coder: DataCoder;

    /// Construct a backend adapter for the given partition; construction
    /// failures propagate
    async fn data_storage<B: KeyValueDataStorage>(
        &self,
        domain: Option<B::Domain>,
        env: &StorageEnvironment,
    ) -> Result<B>;

    /// Wrap an adapter in a coding (or observable coding) storage
    fn coding_storage<B: KeyValueDataStorage>(
        &self,
        backend: B,
        env: &StorageEnvironment,
    ) -> StorageHandle<B, Self::Coder>;
}

/// Factory producing plain coding storages, with no observation overhead
pub struct DefaultStorageFactory<C: DataCoder = JsonDataCoder> {
    coder: Arc<C>,
}

impl DefaultStorageFactory {
    /// Factory with the default JSON coder
    #[must_use]
    pub fn new() -> Self {
        Self::with_coder(JsonDataCoder::new())
    }
}

impl Default for DefaultStorageFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: DataCoder> DefaultStorageFactory<C> {
    /// Factory with a custom coder
    pub fn with_coder(coder: C) -> Self {
        Self {
            coder: Arc::new(coder),
        }
    }
}

#[async_trait]
impl<C: DataCoder> UnifiedStorageFactory for DefaultStorageFactory<C> {
    type Coder = C;

    async fn data_storage<B: KeyValueDataStorage>(
        &self,
        domain: Option<B::Domain>,
        env: &StorageEnvironment,
    ) -> Result<B> {
        B::open(domain, env).await.map_err(Into::into)
    }

    fn coding_storage<B: KeyValueDataStorage>(
        &self,
        backend: B,
        _env: &StorageEnvironment,
    ) -> StorageHandle<B, C> {
        StorageHandle::Plain(Arc::new(CodingStorage::with_coder(
            backend,
            self.coder.clone(),
        )))
    }
}

/// Factory producing observable coding storages, so `subscribe`/`stream`
/// are available on every resolved instance
pub struct ObservableStorageFactory<C: DataCoder = JsonDataCoder> {
    coder: Arc<C>,
}

impl ObservableStorageFactory {
    /// Factory with the default JSON coder
    #[must_use]
    pub fn new() -> Self {
        Self::with_coder(JsonDataCoder::new())
    }
}

impl Default for ObservableStorageFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: DataCoder> ObservableStorageFactory<C> {
    /// Factory with a custom coder
    pub fn with_coder(coder: C) -> Self {
        Self {
            coder: Arc::new(coder),
        }
    }
}

#[async_trait]
impl<C: DataCoder> UnifiedStorageFactory for ObservableStorageFactory<C> {
    type Coder = C;

    async fn data_storage<B: KeyValueDataStorage>(
        &self,
        domain: Option<B::Domain>,
        env: &StorageEnvironment,
    ) -> Result<B> {
        B::open(domain, env).await.map_err(Into::into)
    }

    fn coding_storage<B: KeyValueDataStorage>(
        &self,
        backend: B,
        env: &StorageEnvironment,
    ) -> StorageHandle<B, C> {
        StorageHandle::Observable(Arc::new(ObservableCodingStorage::with_coder(
            backend,
            self.coder.clone(),
            env.observations().clone(),
        )))
    }
}
