//! Unified Storage - one key-value interface over four backing stores
//!
//! This crate lets client code store, fetch, delete, and observe typed
//! values across physically different backends - transient in-process
//! memory, a durable preferences database, a secure credential store, and a
//! plain file tree - through one uniform interface, keyed by a strongly
//! typed key and partitioned by an optional domain.
//!
//! # Layers
//!
//! - [`traits::KeyValueDataStorage`]: the raw-byte capability contract every
//!   backend adapter implements.
//! - [`coding::CodingStorage`]: adapter + [`coder::DataCoder`], exposing
//!   typed operations.
//! - [`observable::ObservableCodingStorage`]: coding storage that also
//!   multiplexes change events per (domain, key).
//! - [`unified::UnifiedStorage`]: the facade that lazily constructs and
//!   caches one storage per (backend type, domain) pair and routes typed
//!   operations to it.
//!
//! # Example
//!
//! ```no_run
//! use unified_storage::backends::InMemoryStorage;
//! use unified_storage::unified::{UnifiedKey, UnifiedStorage};
//!
//! # async fn demo() -> unified_storage::Result<()> {
//! let storage = UnifiedStorage::new();
//! let key: UnifiedKey<InMemoryStorage, String> = UnifiedKey::new("greeting");
//!
//! storage.save(&"hello".to_string(), &key).await?;
//! assert_eq!(storage.fetch(&key).await?, Some("hello".to_string()));
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod backends;
pub mod coder;
pub mod coding;
pub mod environment;
pub mod error;
pub mod factory;
pub mod observable;
pub mod secure_store;
pub mod traits;
pub mod unified;

mod identity;

// Re-export commonly used types
pub use coder::{BincodeDataCoder, CodingValue, DataCoder, JsonDataCoder};
pub use coding::CodingStorage;
pub use environment::{StorageEnvironment, StorageEnvironmentBuilder};
pub use error::{ClearFailure, Result, StorageError};
pub use factory::{DefaultStorageFactory, ObservableStorageFactory, UnifiedStorageFactory};
pub use observable::{ObservableCodingStorage, ObservationRegistry, ValueStream, ValueSubscription};
pub use traits::{BackendError, KeyValueDataStorage, StorageDomain, StorageKey};
pub use unified::{StorageHandle, UnifiedKey, UnifiedStorage};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::backends::{
        CredentialDomain, CredentialKey, CredentialStorage, FileTreeStorage, InMemoryStorage,
        PreferencesStorage,
    };
    pub use crate::coder::{BincodeDataCoder, CodingValue, DataCoder, JsonDataCoder};
    pub use crate::coding::CodingStorage;
    pub use crate::environment::StorageEnvironment;
    pub use crate::error::{Result, StorageError};
    pub use crate::factory::{
        DefaultStorageFactory, ObservableStorageFactory, UnifiedStorageFactory,
    };
    pub use crate::observable::ObservableCodingStorage;
    pub use crate::secure_store::Accessibility;
    pub use crate::traits::KeyValueDataStorage;
    pub use crate::unified::{UnifiedKey, UnifiedStorage};
}
