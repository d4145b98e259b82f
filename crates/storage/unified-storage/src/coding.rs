//! Typed storage layer: one backend adapter plus one coder

use std::sync::Arc;

use crate::coder::{CodingValue, DataCoder, JsonDataCoder};
use crate::error::Result;
use crate::traits::KeyValueDataStorage;

/// Typed fetch/save/set/delete/clear over a backend adapter, encoding and
/// decoding values through a shared [`DataCoder`].
///
/// Absence is `Ok(None)`; a decode failure propagates as an error, since it
/// means the stored bytes do not match the requested type.
pub struct CodingStorage<B: KeyValueDataStorage, C: DataCoder = JsonDataCoder> {
    backend: B,
    coder: Arc<C>,
}

impl<B: KeyValueDataStorage> CodingStorage<B> {
    /// Wrap a backend with the default JSON coder
    pub fn new(backend: B) -> Self {
        Self::with_coder(backend, Arc::new(JsonDataCoder::new()))
    }
}

impl<B: KeyValueDataStorage, C: DataCoder> CodingStorage<B, C> {
    /// Wrap a backend with the given coder
    pub fn with_coder(backend: B, coder: Arc<C>) -> Self {
        Self { backend, coder }
    }

    /// The resolved partition this storage operates on
    pub fn domain(&self) -> Option<&B::Domain> {
        self.backend.domain()
    }

    /// The wrapped adapter
    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub(crate) fn coder(&self) -> &Arc<C> {
        &self.coder
    }

    /// Decoded value for `key`, or `None` if absent
    pub async fn fetch<V: CodingValue>(&self, key: &B::Key) -> Result<Option<V>> {
        match self.backend.fetch(key).await.map_err(Into::into)? {
            Some(data) => Ok(Some(self.coder.decode(&data)?)),
            None => Ok(None),
        }
    }

    /// Encode and store a value under `key`
    pub async fn save<V: CodingValue>(&self, value: &V, key: &B::Key) -> Result<()> {
        let encoded = self.coder.encode(value)?;
        self.save_encoded(encoded, key).await
    }

    pub(crate) async fn save_encoded(&self, encoded: bytes::Bytes, key: &B::Key) -> Result<()> {
        self.backend.save(encoded, key).await.map_err(Into::into)
    }

    /// Save if a value is present, delete otherwise
    pub async fn set<V: CodingValue>(&self, value: Option<&V>, key: &B::Key) -> Result<()> {
        match value {
            Some(value) => self.save(value, key).await,
            None => self.delete(key).await,
        }
    }

    /// Remove the item if present
    pub async fn delete(&self, key: &B::Key) -> Result<()> {
        self.backend.delete(key).await.map_err(Into::into)
    }

    /// Remove every item in this storage's domain
    pub async fn clear(&self) -> Result<()> {
        self.backend.clear().await.map_err(Into::into)
    }
}
