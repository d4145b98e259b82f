//! Boundary to the platform credential store.
//!
//! The credential backend does not talk to the platform directly; it goes
//! through the [`SecureStore`] trait, which models the platform facility as a
//! get/set/remove/wipe-namespace primitive addressed by service name, access
//! group, and account. Failures surface as integer status codes, which the
//! adapter normalizes.
//!
//! The shipped default is [`InProcessSecureStore`], a process-lifetime store
//! partitioned exactly like the platform one, owned by the
//! [`StorageEnvironment`](crate::environment::StorageEnvironment) so tests
//! can reset it. The `os-keyring` feature adds [`KeyringSecureStore`], backed
//! by the operating system's credential manager.

use std::collections::HashMap;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Status reported when an item does not exist. Same numeric value as the
/// platform keychain's "item not found" so callers can match familiar codes.
pub const STATUS_NOT_FOUND: i32 = -25300;

/// Status reported when adding an item that already exists
pub const STATUS_DUPLICATE_ITEM: i32 = -25299;

/// Per-item availability policy, passed through to the platform store
/// verbatim
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Accessibility {
    /// Available while the device is unlocked
    WhenUnlocked,
    /// Available after the first unlock since boot
    AfterFirstUnlock,
    /// As `WhenUnlocked`, and never migrated to another device
    WhenUnlockedThisDeviceOnly,
    /// As `AfterFirstUnlock`, and never migrated to another device
    AfterFirstUnlockThisDeviceOnly,
}

/// Failure surface of a [`SecureStore`]
#[derive(Error, Debug)]
pub enum SecureStoreError {
    /// The platform store reported a non-success status code
    #[error("secure store status {0}")]
    Status(i32),

    /// The platform store failed for a reason without a status code
    #[error("secure store failure: {0}")]
    Other(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl SecureStoreError {
    /// Whether this is the "item not found" status
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, SecureStoreError::Status(STATUS_NOT_FOUND))
    }
}

/// Fully-qualified address of one credential item
#[derive(Clone, Debug)]
pub struct SecureItem<'a> {
    /// Service name that identifies this accessor
    pub service: &'a str,
    /// Access group the item belongs to, for sharing across processes
    pub access_group: Option<&'a str>,
    /// Account name, the item's key within the service
    pub account: &'a str,
    /// Availability policy for the item
    pub accessibility: Option<Accessibility>,
    /// Whether the platform may sync the item across devices
    pub synchronizable: bool,
}

/// Get/set/remove/wipe-namespace primitive over a secure credential store
pub trait SecureStore: Send + Sync + 'static {
    /// Stored bytes for the item. Fails with [`STATUS_NOT_FOUND`] when the
    /// item does not exist.
    fn get(&self, item: &SecureItem<'_>) -> Result<Bytes, SecureStoreError>;

    /// Store or overwrite the item's bytes
    fn set(&self, value: Bytes, item: &SecureItem<'_>) -> Result<(), SecureStoreError>;

    /// Remove the item. Fails with [`STATUS_NOT_FOUND`] when the item does
    /// not exist.
    fn remove(&self, item: &SecureItem<'_>) -> Result<(), SecureStoreError>;

    /// Remove every item under this service name and access group, and
    /// nothing else
    fn remove_all(
        &self,
        service: &str,
        access_group: Option<&str>,
    ) -> Result<(), SecureStoreError>;
}

type Scope = (String, Option<String>);

#[derive(Clone, PartialEq, Eq, Hash)]
struct Slot {
    account: String,
    synchronizable: bool,
}

struct StoredItem {
    data: Bytes,
    #[allow(dead_code)]
    accessibility: Option<Accessibility>,
}

/// Process-lifetime secure store partitioned by (service, access group)
///
/// Items live only as long as the process; the partitioning and status-code
/// surface match the platform store, so the credential adapter behaves
/// identically over either.
#[derive(Default)]
pub struct InProcessSecureStore {
    items: Mutex<HashMap<Scope, HashMap<Slot, StoredItem>>>,
}

impl InProcessSecureStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn scope(item: &SecureItem<'_>) -> Scope {
        (
            item.service.to_string(),
            item.access_group.map(str::to_string),
        )
    }

    fn slot(item: &SecureItem<'_>) -> Slot {
        Slot {
            account: item.account.to_string(),
            synchronizable: item.synchronizable,
        }
    }
}

impl SecureStore for InProcessSecureStore {
    fn get(&self, item: &SecureItem<'_>) -> Result<Bytes, SecureStoreError> {
        self.items
            .lock()
            .get(&Self::scope(item))
            .and_then(|items| items.get(&Self::slot(item)))
            .map(|stored| stored.data.clone())
            .ok_or(SecureStoreError::Status(STATUS_NOT_FOUND))
    }

    fn set(&self, value: Bytes, item: &SecureItem<'_>) -> Result<(), SecureStoreError> {
        self.items
            .lock()
            .entry(Self::scope(item))
            .or_default()
            .insert(
                Self::slot(item),
                StoredItem {
                    data: value,
                    accessibility: item.accessibility,
                },
            );
        Ok(())
    }

    fn remove(&self, item: &SecureItem<'_>) -> Result<(), SecureStoreError> {
        self.items
            .lock()
            .get_mut(&Self::scope(item))
            .and_then(|items| items.remove(&Self::slot(item)))
            .map(|_| ())
            .ok_or(SecureStoreError::Status(STATUS_NOT_FOUND))
    }

    fn remove_all(
        &self,
        service: &str,
        access_group: Option<&str>,
    ) -> Result<(), SecureStoreError> {
        let scope = (service.to_string(), access_group.map(str::to_string));
        self.items.lock().remove(&scope);
        Ok(())
    }
}

#[cfg(feature = "os-keyring")]
pub use self::os::KeyringSecureStore;

#[cfg(feature = "os-keyring")]
mod os {
    use super::{SecureItem, SecureStore, SecureStoreError, STATUS_NOT_FOUND};
    use bytes::Bytes;
    use parking_lot::Mutex;

    const INDEX_ACCOUNT: &str = "__accounts__";

    /// Secure store backed by the operating system's credential manager via
    /// the `keyring` crate.
    ///
    /// The OS API cannot enumerate a service's items, so the store keeps an
    /// index entry per (service, access group) listing the accounts it wrote;
    /// `remove_all` walks that index. Accessibility and the sync flag are
    /// carried but advisory here; the OS keyring has no per-item policy.
    #[derive(Default)]
    pub struct KeyringSecureStore {
        index_guard: Mutex<()>,
    }

    impl KeyringSecureStore {
        /// Create a store over the OS credential manager
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        fn service_name(service: &str, access_group: Option<&str>) -> String {
            match access_group {
                Some(group) => format!("{group}/{service}"),
                None => service.to_string(),
            }
        }

        fn entry(service: &str, account: &str) -> Result<keyring::Entry, SecureStoreError> {
            keyring::Entry::new(service, account)
                .map_err(|error| SecureStoreError::Other(Box::new(error)))
        }

        fn read_index(service: &str) -> Result<Vec<String>, SecureStoreError> {
            match Self::entry(service, INDEX_ACCOUNT)?.get_secret() {
                Ok(raw) => serde_json::from_slice(&raw)
                    .map_err(|error| SecureStoreError::Other(Box::new(error))),
                Err(keyring::Error::NoEntry) => Ok(Vec::new()),
                Err(error) => Err(SecureStoreError::Other(Box::new(error))),
            }
        }

        fn write_index(service: &str, accounts: &[String]) -> Result<(), SecureStoreError> {
            let raw = serde_json::to_vec(accounts)
                .map_err(|error| SecureStoreError::Other(Box::new(error)))?;
            Self::entry(service, INDEX_ACCOUNT)?
                .set_secret(&raw)
                .map_err(|error| SecureStoreError::Other(Box::new(error)))
        }
    }

    impl SecureStore for KeyringSecureStore {
        fn get(&self, item: &SecureItem<'_>) -> Result<Bytes, SecureStoreError> {
            let service = Self::service_name(item.service, item.access_group);
            match Self::entry(&service, item.account)?.get_secret() {
                Ok(raw) => Ok(Bytes::from(raw)),
                Err(keyring::Error::NoEntry) => {
                    Err(SecureStoreError::Status(STATUS_NOT_FOUND))
                }
                Err(error) => Err(SecureStoreError::Other(Box::new(error))),
            }
        }

        fn set(&self, value: Bytes, item: &SecureItem<'_>) -> Result<(), SecureStoreError> {
            let service = Self::service_name(item.service, item.access_group);
            let _guard = self.index_guard.lock();

            Self::entry(&service, item.account)?
                .set_secret(&value)
                .map_err(|error| SecureStoreError::Other(Box::new(error)))?;

            let mut index = Self::read_index(&service)?;
            if !index.iter().any(|account| account == item.account) {
                index.push(item.account.to_string());
                Self::write_index(&service, &index)?;
            }
            Ok(())
        }

        fn remove(&self, item: &SecureItem<'_>) -> Result<(), SecureStoreError> {
            let service = Self::service_name(item.service, item.access_group);
            let _guard = self.index_guard.lock();

            match Self::entry(&service, item.account)?.delete_credential() {
                Ok(()) => {}
                Err(keyring::Error::NoEntry) => {
                    return Err(SecureStoreError::Status(STATUS_NOT_FOUND))
                }
                Err(error) => return Err(SecureStoreError::Other(Box::new(error))),
            }

            let mut index = Self::read_index(&service)?;
            index.retain(|account| account != item.account);
            Self::write_index(&service, &index)
        }

        fn remove_all(
            &self,
            service: &str,
            access_group: Option<&str>,
        ) -> Result<(), SecureStoreError> {
            let service = Self::service_name(service, access_group);
            let _guard = self.index_guard.lock();

            for account in Self::read_index(&service)? {
                match Self::entry(&service, &account)?.delete_credential() {
                    Ok(()) | Err(keyring::Error::NoEntry) => {}
                    Err(error) => return Err(SecureStoreError::Other(Box::new(error))),
                }
            }
            match Self::entry(&service, INDEX_ACCOUNT)?.delete_credential() {
                Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
                Err(error) => Err(SecureStoreError::Other(Box::new(error))),
            }
        }
    }
}
