//! In-memory storage backend

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;

use crate::environment::StorageEnvironment;
use crate::error::MemoryError;
use crate::traits::{BackendError, KeyValueDataStorage};

/// Shared per-domain table backing every in-memory adapter opened from one
/// [`StorageEnvironment`].
///
/// Values are encoded bytes, not live objects, so the in-memory backend has
/// the same value-copy semantics as the persistent ones.
#[derive(Clone, Default)]
pub struct MemoryTable {
    inner: Arc<RwLock<HashMap<Option<String>, HashMap<String, Bytes>>>>,
}

impl MemoryTable {
    fn get(&self, domain: &Option<String>, key: &str) -> Option<Bytes> {
        self.inner
            .read()
            .get(domain)
            .and_then(|items| items.get(key))
            .cloned()
    }

    fn insert(&self, domain: Option<String>, key: String, value: Bytes) {
        self.inner.write().entry(domain).or_default().insert(key, value);
    }

    fn remove(&self, domain: &Option<String>, key: &str) {
        if let Some(items) = self.inner.write().get_mut(domain) {
            items.remove(key);
        }
    }

    fn clear_domain(&self, domain: &Option<String>) {
        if let Some(items) = self.inner.write().get_mut(domain) {
            items.clear();
        }
    }
}

/// Storage adapter over the environment's shared in-memory table.
///
/// All instances opened against the same environment and domain observe each
/// other's writes. Nothing survives the process.
pub struct InMemoryStorage {
    domain: Option<String>,
    table: MemoryTable,
}

impl BackendError for MemoryError {
    fn other<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        MemoryError::Other(Box::new(source))
    }
}

#[async_trait]
impl KeyValueDataStorage for InMemoryStorage {
    type Key = String;
    type Domain = String;
    type Error = MemoryError;

    const BACKEND: &'static str = "memory";

    async fn open(
        domain: Option<String>,
        env: &StorageEnvironment,
    ) -> Result<Self, MemoryError> {
        tracing::debug!(backend = Self::BACKEND, ?domain, "opening storage");
        Ok(Self {
            domain,
            table: env.memory().clone(),
        })
    }

    fn domain(&self) -> Option<&String> {
        self.domain.as_ref()
    }

    async fn fetch(&self, key: &String) -> Result<Option<Bytes>, MemoryError> {
        Ok(self.table.get(&self.domain, key))
    }

    async fn save(&self, value: Bytes, key: &String) -> Result<(), MemoryError> {
        self.table.insert(self.domain.clone(), key.clone(), value);
        Ok(())
    }

    async fn delete(&self, key: &String) -> Result<(), MemoryError> {
        self.table.remove(&self.domain, key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), MemoryError> {
        tracing::debug!(backend = Self::BACKEND, domain = ?self.domain, "clearing domain");
        self.table.clear_domain(&self.domain);
        Ok(())
    }
}
