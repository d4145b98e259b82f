//! Shared state and configuration injected into every adapter.
//!
//! The in-memory table, the observation registry, and the secure store are
//! the pieces of truly shared state in this design. Instead of process
//! globals they live in a [`StorageEnvironment`]: adapters opened from the
//! same environment share them, and tests get hermetic state from
//! [`StorageEnvironment::isolated`]. [`StorageEnvironment::global`] is the
//! lazily-created process-wide default.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::Lazy;

use crate::backends::memory::MemoryTable;
use crate::observable::ObservationRegistry;
use crate::secure_store::{InProcessSecureStore, SecureStore};

const DEFAULT_GROUP: &str = "unified-storage";

static GLOBAL: Lazy<StorageEnvironment> = Lazy::new(|| StorageEnvironment::builder().build());

/// Shared state container for every storage constructed from it
#[derive(Clone)]
pub struct StorageEnvironment {
    inner: Arc<EnvironmentInner>,
}

struct EnvironmentInner {
    default_group: String,
    documents_root: PathBuf,
    containers_root: PathBuf,
    preferences_root: PathBuf,
    memory: MemoryTable,
    observations: ObservationRegistry,
    secure_store: Arc<dyn SecureStore>,
}

impl StorageEnvironment {
    /// Start building an environment
    #[must_use]
    pub fn builder() -> StorageEnvironmentBuilder {
        StorageEnvironmentBuilder::default()
    }

    /// The process-wide default environment. Every storage opened through it
    /// shares one in-memory table, one observation registry, and one secure
    /// store for the lifetime of the process.
    #[must_use]
    pub fn global() -> Self {
        GLOBAL.clone()
    }

    /// A fresh environment with its own shared state, for callers (and
    /// tests) that must not observe anyone else's writes
    #[must_use]
    pub fn isolated() -> Self {
        Self::builder().build()
    }

    /// Group identifier used as the default partition name: the preferences
    /// suite, the credential service name, and the file-tree directory for
    /// the `None` domain
    #[must_use]
    pub fn default_group(&self) -> &str {
        &self.inner.default_group
    }

    /// Root under which the `None`-domain file tree lives
    #[must_use]
    pub fn documents_root(&self) -> &Path {
        &self.inner.documents_root
    }

    /// Root under which per-domain shared containers live
    #[must_use]
    pub fn containers_root(&self) -> &Path {
        &self.inner.containers_root
    }

    /// Directory holding one file per preferences suite
    #[must_use]
    pub fn preferences_root(&self) -> &Path {
        &self.inner.preferences_root
    }

    /// The table backing every in-memory adapter opened from this
    /// environment
    #[must_use]
    pub fn memory(&self) -> &MemoryTable {
        &self.inner.memory
    }

    /// The registry of per-(domain, key) observation subjects
    #[must_use]
    pub fn observations(&self) -> &ObservationRegistry {
        &self.inner.observations
    }

    /// The credential store primitive
    #[must_use]
    pub fn secure_store(&self) -> &Arc<dyn SecureStore> {
        &self.inner.secure_store
    }
}

impl std::fmt::Debug for StorageEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageEnvironment")
            .field("default_group", &self.inner.default_group)
            .field("documents_root", &self.inner.documents_root)
            .field("containers_root", &self.inner.containers_root)
            .field("preferences_root", &self.inner.preferences_root)
            .finish_non_exhaustive()
    }
}

/// Builder for [`StorageEnvironment`]
#[derive(Default)]
pub struct StorageEnvironmentBuilder {
    default_group: Option<String>,
    documents_root: Option<PathBuf>,
    containers_root: Option<PathBuf>,
    preferences_root: Option<PathBuf>,
    secure_store: Option<Arc<dyn SecureStore>>,
}

impl StorageEnvironmentBuilder {
    /// Override the default group identifier
    #[must_use]
    pub fn with_default_group(mut self, group: impl Into<String>) -> Self {
        self.default_group = Some(group.into());
        self
    }

    /// Override the documents root for the file-tree backend
    #[must_use]
    pub fn with_documents_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.documents_root = Some(root.into());
        self
    }

    /// Override the shared-containers root for the file-tree backend
    #[must_use]
    pub fn with_containers_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.containers_root = Some(root.into());
        self
    }

    /// Override the directory holding preferences suite files
    #[must_use]
    pub fn with_preferences_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.preferences_root = Some(root.into());
        self
    }

    /// Substitute the credential store primitive
    #[must_use]
    pub fn with_secure_store(mut self, store: Arc<dyn SecureStore>) -> Self {
        self.secure_store = Some(store);
        self
    }

    /// Build the environment, filling unset roots from the platform data
    /// directory
    #[must_use]
    pub fn build(self) -> StorageEnvironment {
        let base = dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join(DEFAULT_GROUP);

        StorageEnvironment {
            inner: Arc::new(EnvironmentInner {
                default_group: self.default_group.unwrap_or_else(|| DEFAULT_GROUP.to_string()),
                documents_root: self.documents_root.unwrap_or_else(|| base.join("documents")),
                containers_root: self
                    .containers_root
                    .unwrap_or_else(|| base.join("containers")),
                preferences_root: self
                    .preferences_root
                    .unwrap_or_else(|| base.join("preferences")),
                memory: MemoryTable::default(),
                observations: ObservationRegistry::default(),
                secure_store: self
                    .secure_store
                    .unwrap_or_else(|| Arc::new(InProcessSecureStore::new())),
            }),
        }
    }
}
