//! Backend adapter implementations

pub mod credential;
pub mod file;
pub mod memory;
pub mod preferences;

pub use credential::{CredentialDomain, CredentialKey, CredentialStorage};
pub use file::FileTreeStorage;
pub use memory::InMemoryStorage;
pub use preferences::PreferencesStorage;
