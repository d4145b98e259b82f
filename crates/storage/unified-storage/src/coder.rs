//! Pluggable serialization between typed values and raw bytes

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CoderError;

/// Any value that can travel through a [`DataCoder`]
pub trait CodingValue: Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> CodingValue for T where T: Serialize + DeserializeOwned + Send + Sync + 'static {}

/// Serializes typed values to bytes and back.
///
/// Implementations are stateless per call (`&self`, `Send + Sync`), so
/// concurrent callers need no external locking. Decode failures propagate as
/// [`CoderError::Decode`], never as a silent default.
pub trait DataCoder: Send + Sync + 'static {
    /// Encode a value to its byte representation
    fn encode<V: CodingValue>(&self, value: &V) -> Result<Bytes, CoderError>;

    /// Decode a value from its byte representation
    fn decode<V: CodingValue>(&self, data: &Bytes) -> Result<V, CoderError>;
}

/// JSON coder, the default wire format
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonDataCoder;

impl JsonDataCoder {
    /// Create a new JSON coder
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl DataCoder for JsonDataCoder {
    fn encode<V: CodingValue>(&self, value: &V) -> Result<Bytes, CoderError> {
        serde_json::to_vec(value)
            .map(Bytes::from)
            .map_err(|error| CoderError::Encode(Box::new(error)))
    }

    fn decode<V: CodingValue>(&self, data: &Bytes) -> Result<V, CoderError> {
        serde_json::from_slice(data).map_err(|error| CoderError::Decode(Box::new(error)))
    }
}

/// Compact binary coder
#[derive(Clone, Copy, Debug, Default)]
pub struct BincodeDataCoder;

impl BincodeDataCoder {
    /// Create a new binary coder
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl DataCoder for BincodeDataCoder {
    fn encode<V: CodingValue>(&self, value: &V) -> Result<Bytes, CoderError> {
        bincode::serialize(value)
            .map(Bytes::from)
            .map_err(|error| CoderError::Encode(error))
    }

    fn decode<V: CodingValue>(&self, data: &Bytes) -> Result<V, CoderError> {
        bincode::deserialize(data).map_err(|error| CoderError::Decode(error))
    }
}
