// Canonical binary encoding for hashing and the wire. Every peer must produce
// identical bytes for identical values, so everything goes through these two
// helpers with a single fixed configuration.
use crate::error::{NodeError, Result};
use serde::{de::DeserializeOwned, Serialize};

/// Serialize a value using bincode with the standard configuration
pub fn serialize<T: Serialize>(data: &T) -> Result<Vec<u8>> {
    let config = bincode::config::standard();
    bincode::serde::encode_to_vec(data, config)
        .map_err(|e| NodeError::Serialization(format!("Serialization failed: {e}")))
}

/// Deserialize a value using bincode with the standard configuration
pub fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let config = bincode::config::standard();
    let (data, _) = bincode::serde::decode_from_slice(bytes, config)
        .map_err(|e| NodeError::Codec(format!("Deserialization failed: {e}")))?;
    Ok(data)
}
