//! Error types for the storage module

use std::path::PathBuf;

use thiserror::Error;

/// Type alias for Results using [`StorageError`]
pub type Result<T> = std::result::Result<T, StorageError>;

/// Boxed error used to carry an arbitrary underlying platform cause
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Main error type for storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    /// In-memory backend error
    #[error("memory storage error: {0}")]
    Memory(#[from] MemoryError),

    /// Preferences backend error
    #[error("preferences storage error: {0}")]
    Preferences(#[from] PreferencesError),

    /// Credential backend error
    #[error("credential storage error: {0}")]
    Credential(#[from] CredentialError),

    /// File-tree backend error
    #[error("file storage error: {0}")]
    File(#[from] FileError),

    /// Encoding or decoding failure in the coding layer
    #[error("coder error: {0}")]
    Coder(#[from] CoderError),

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Aggregated failures from a best-effort clear fan-out across cached
    /// storage instances; every instance was attempted
    #[error("clear failed for {} storage instance(s)", .0.len())]
    Clear(Vec<ClearFailure>),
}

/// One failed instance from a clear fan-out
#[derive(Debug)]
pub struct ClearFailure {
    /// Backend and domain of the instance that failed
    pub target: String,
    /// The failure itself
    pub error: StorageError,
}

impl StorageError {
    /// Check if the error was raised while resolving a domain to a partition
    pub fn is_configuration(&self) -> bool {
        match self {
            StorageError::Configuration(_) => true,
            StorageError::Preferences(PreferencesError::InvalidSuite(_))
            | StorageError::Preferences(PreferencesError::FailedToOpenSuite { .. })
            | StorageError::File(FileError::RootCreation { .. }) => true,
            _ => false,
        }
    }

    /// Check if the error is a decode failure (stored bytes do not match the
    /// requested value type)
    pub fn is_decode(&self) -> bool {
        matches!(self, StorageError::Coder(CoderError::Decode(_)))
    }
}

/// Errors produced by the in-memory backend
#[derive(Error, Debug)]
pub enum MemoryError {
    /// Operation failed for an underlying reason
    #[error("memory operation failed: {0}")]
    Other(#[source] BoxError),
}

/// Errors produced by the preferences backend
#[derive(Error, Debug)]
pub enum PreferencesError {
    /// The suite name cannot name a valid partition
    #[error("invalid preferences suite name: {0:?}")]
    InvalidSuite(String),

    /// The suite could not be opened or created
    #[error("failed to open preferences suite {suite:?}")]
    FailedToOpenSuite {
        /// Name of the suite that failed to open
        suite: String,
        /// Underlying filesystem failure
        #[source]
        source: std::io::Error,
    },

    /// The persisted suite file could not be parsed
    #[error("preferences suite file is malformed")]
    Malformed(#[source] serde_json::Error),

    /// Operation failed for an underlying reason
    #[error("preferences operation failed: {0}")]
    Other(#[source] BoxError),
}

/// Errors produced by the credential backend
#[derive(Error, Debug)]
pub enum CredentialError {
    /// The secure store reported a non-success status code
    #[error("secure store returned status {0}")]
    Status(i32),

    /// Operation failed for an underlying reason
    #[error("credential operation failed: {0}")]
    Other(#[source] BoxError),
}

/// Errors produced by the file-tree backend
#[derive(Error, Debug)]
pub enum FileError {
    /// The per-domain root directory could not be created
    #[error("failed to create storage root {root:?}")]
    RootCreation {
        /// The root directory that could not be created
        root: PathBuf,
        /// Underlying filesystem failure
        #[source]
        source: std::io::Error,
    },

    /// Operation failed for an underlying reason
    #[error("file operation failed: {0}")]
    Other(#[source] BoxError),
}

/// Errors produced by a [`DataCoder`](crate::coder::DataCoder)
#[derive(Error, Debug)]
pub enum CoderError {
    /// The value could not be encoded
    #[error("failed to encode value: {0}")]
    Encode(#[source] BoxError),

    /// The stored bytes could not be decoded into the requested type
    #[error("failed to decode value: {0}")]
    Decode(#[source] BoxError),
}
