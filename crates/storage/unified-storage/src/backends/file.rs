//! File-tree storage backend
//!
//! One file per key, named by the key directly under a per-domain root: the
//! documents root for the `None` domain, or a shared container named by the
//! domain string. No subdirectories, no extensions.

use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;

use crate::environment::StorageEnvironment;
use crate::error::FileError;
use crate::traits::{BackendError, KeyValueDataStorage};

/// Storage adapter over a per-domain directory
pub struct FileTreeStorage {
    domain: Option<String>,
    root: PathBuf,
}

impl BackendError for FileError {
    fn other<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        FileError::Other(Box::new(source))
    }
}

impl FileTreeStorage {
    /// Directory this adapter stores its files in
    #[must_use]
    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    fn path(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    async fn remove_if_exists(path: &std::path::Path) -> Result<(), FileError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(FileError::other(error)),
        }
    }
}

#[async_trait]
impl KeyValueDataStorage for FileTreeStorage {
    type Key = String;
    type Domain = String;
    type Error = FileError;

    const BACKEND: &'static str = "file";

    async fn open(domain: Option<String>, env: &StorageEnvironment) -> Result<Self, FileError> {
        let root = match &domain {
            None => env.documents_root().join(env.default_group()),
            Some(container) => {
                let root = env
                    .containers_root()
                    .join(container)
                    .join(env.default_group());

                // A named container must be resolvable up front; the private
                // documents root is created lazily on first save instead, so
                // opening the default domain cannot fail.
                tokio::fs::create_dir_all(&root)
                    .await
                    .map_err(|source| FileError::RootCreation {
                        root: root.clone(),
                        source,
                    })?;
                root
            }
        };

        tracing::debug!(backend = Self::BACKEND, root = %root.display(), "opened storage");
        Ok(Self { domain, root })
    }

    fn domain(&self) -> Option<&String> {
        self.domain.as_ref()
    }

    async fn fetch(&self, key: &String) -> Result<Option<Bytes>, FileError> {
        match tokio::fs::read(self.path(key)).await {
            Ok(contents) => Ok(Some(Bytes::from(contents))),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(FileError::other(error)),
        }
    }

    /// Replaces atomically from a reader's perspective: an existing file is
    /// removed before the new one is created, never appended or truncated in
    /// place.
    async fn save(&self, value: Bytes, key: &String) -> Result<(), FileError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(FileError::other)?;

        let path = self.path(key);
        Self::remove_if_exists(&path).await?;
        tokio::fs::write(&path, &value).await.map_err(FileError::other)
    }

    async fn delete(&self, key: &String) -> Result<(), FileError> {
        Self::remove_if_exists(&self.path(key)).await
    }

    async fn clear(&self) -> Result<(), FileError> {
        tracing::debug!(backend = Self::BACKEND, root = %self.root.display(), "clearing root");

        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(error) => return Err(FileError::other(error)),
        };

        while let Some(entry) = entries.next_entry().await.map_err(FileError::other)? {
            Self::remove_if_exists(&entry.path()).await?;
        }
        Ok(())
    }
}
