//! Record codec
//!
//! The log stores opaque fixed-size blobs. These helpers turn a caller's serde
//! type into exactly `record_size` bytes (bincode, zero padded) and back.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{FlashLogError, Result};

/// Encode `value` into a record of exactly `record_size` bytes
pub fn encode<T: Serialize>(value: &T, record_size: usize) -> Result<Vec<u8>> {
    let mut bytes = bincode::serialize(value)?;
    if bytes.len() > record_size {
        return Err(FlashLogError::Serialization(format!(
            "encoded value needs {} bytes, record holds {}",
            bytes.len(),
            record_size
        )));
    }
    bytes.resize(record_size, 0);
    Ok(bytes)
}

/// Decode a value from a record, ignoring the padding
pub fn decode<T: DeserializeOwned>(record: &[u8]) -> Result<T> {
    Ok(bincode::deserialize(record)?)
}
