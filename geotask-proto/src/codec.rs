//! Document encoding for the `GeoTask` store.
//!
//! Stored documents are postcard-encoded. The functions are generic over
//! any serde type so tasks, profiles, preferences and location fixes share
//! one codec and one error type.

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Error type for document encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization failed.
    #[error("document encode error: {0}")]
    Encode(String),
    /// The stored bytes are not a valid document of the requested type.
    #[error("document decode error: {0}")]
    Decode(String),
}

/// Encodes a document into bytes using postcard.
///
/// # Errors
///
/// Returns `CodecError::Encode` if the value cannot be serialized.
pub fn encode<T: Serialize>(document: &T) -> Result<Vec<u8>, CodecError> {
    postcard::to_allocvec(document).map_err(|e| CodecError::Encode(e.to_string()))
}

/// Decodes a document from bytes using postcard.
///
/// # Errors
///
/// Returns `CodecError::Decode` if the bytes cannot be deserialized.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    postcard::from_bytes(bytes).map_err(|e| CodecError::Decode(e.to_string()))
}
