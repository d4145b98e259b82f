//! Preferences storage backend
//!
//! A suite-scoped key-value database: each suite persists as one JSON file
//! of hex-encoded entries under the environment's preferences root, with a
//! write-through in-process cache. The `None` domain maps to the
//! environment's default group as suite name.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use crate::environment::StorageEnvironment;
use crate::error::PreferencesError;
use crate::traits::{BackendError, KeyValueDataStorage};

/// Storage adapter over a named preferences suite
pub struct PreferencesStorage {
    domain: Option<String>,
    suite: String,
    path: PathBuf,
    cache: RwLock<HashMap<String, Bytes>>,
}

impl BackendError for PreferencesError {
    fn other<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        PreferencesError::Other(Box::new(source))
    }
}

impl PreferencesStorage {
    /// Name of the suite this adapter operates on
    #[must_use]
    pub fn suite(&self) -> &str {
        &self.suite
    }

    async fn persist(&self, items: &HashMap<String, Bytes>) -> Result<(), PreferencesError> {
        let encoded: HashMap<&String, String> = items
            .iter()
            .map(|(key, value)| (key, hex::encode(value)))
            .collect();

        let json = serde_json::to_string_pretty(&encoded).map_err(PreferencesError::other)?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(PreferencesError::other)
    }

    fn parse(raw: &str) -> Result<HashMap<String, Bytes>, PreferencesError> {
        if raw.is_empty() {
            return Ok(HashMap::new());
        }

        let encoded: HashMap<String, String> =
            serde_json::from_str(raw).map_err(PreferencesError::Malformed)?;

        encoded
            .into_iter()
            .map(|(key, value)| {
                hex::decode(&value)
                    .map(|bytes| (key, Bytes::from(bytes)))
                    .map_err(PreferencesError::other)
            })
            .collect()
    }
}

#[async_trait]
impl KeyValueDataStorage for PreferencesStorage {
    type Key = String;
    type Domain = String;
    type Error = PreferencesError;

    const BACKEND: &'static str = "preferences";

    async fn open(
        domain: Option<String>,
        env: &StorageEnvironment,
    ) -> Result<Self, PreferencesError> {
        let suite = domain
            .clone()
            .unwrap_or_else(|| env.default_group().to_string());

        if suite.is_empty() || suite.contains(['/', '\\']) {
            return Err(PreferencesError::InvalidSuite(suite));
        }

        tokio::fs::create_dir_all(env.preferences_root())
            .await
            .map_err(|source| PreferencesError::FailedToOpenSuite {
                suite: suite.clone(),
                source,
            })?;

        let path = env.preferences_root().join(format!("{suite}.json"));
        let cache = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => Self::parse(&raw)?,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(source) => {
                return Err(PreferencesError::FailedToOpenSuite {
                    suite: suite.clone(),
                    source,
                })
            }
        };

        tracing::debug!(backend = Self::BACKEND, %suite, "opened suite");
        Ok(Self {
            domain,
            suite,
            path,
            cache: RwLock::new(cache),
        })
    }

    fn domain(&self) -> Option<&String> {
        self.domain.as_ref()
    }

    async fn fetch(&self, key: &String) -> Result<Option<Bytes>, PreferencesError> {
        Ok(self.cache.read().await.get(key).cloned())
    }

    async fn save(&self, value: Bytes, key: &String) -> Result<(), PreferencesError> {
        let mut cache = self.cache.write().await;
        cache.insert(key.clone(), value);
        self.persist(&cache).await
    }

    async fn delete(&self, key: &String) -> Result<(), PreferencesError> {
        let mut cache = self.cache.write().await;
        if cache.remove(key).is_some() {
            self.persist(&cache).await?;
        }
        Ok(())
    }

    /// Removes the entire named suite, not individual keys. If other code
    /// shares the suite this wipes its items too; that broad-clear is the
    /// platform semantic, not an accident to narrow.
    async fn clear(&self) -> Result<(), PreferencesError> {
        tracing::debug!(backend = Self::BACKEND, suite = %self.suite, "removing suite");
        let mut cache = self.cache.write().await;
        cache.clear();

        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(PreferencesError::other(error)),
        }
    }
}
