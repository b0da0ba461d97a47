//! Pluggable cache payload (de)serialization and optional compression.
//!
//! Grounded on the `CacheBackend`/`L2CacheBackend` trait split used by the
//! reference tiered-cache example: encoding is a trait so the default
//! binary codec can be swapped without touching [`super::tier::ShardedCache`].

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

use crate::config::SerializerType;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("encode failed: {0}")]
    Encode(String),
    #[error("decode failed: {0}")]
    Decode(String),
}

/// Encodes/decodes a typed value to the bytes actually stored on disk and
/// in the memory tier, applying compression above a size threshold.
pub struct Codec {
    serializer: SerializerType,
    enable_compression: bool,
    min_size_to_compress: usize,
}

/// One-byte framing prefix distinguishing compressed from raw payloads.
const FLAG_RAW: u8 = 0;
const FLAG_LZ4: u8 = 1;

impl Codec {
    pub fn new(serializer: SerializerType, enable_compression: bool, min_size_to_compress: usize) -> Self {
        Codec {
            serializer,
            enable_compression,
            min_size_to_compress,
        }
    }

    fn serialize_raw<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        match self.serializer {
            SerializerType::Bincode => {
                bincode::serialize(value).map_err(|e| CodecError::Encode(e.to_string()))
            }
            SerializerType::Json => {
                serde_json::to_vec(value).map_err(|e| CodecError::Encode(e.to_string()))
            }
        }
    }

    fn deserialize_raw<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        match self.serializer {
            SerializerType::Bincode => {
                bincode::deserialize(bytes).map_err(|e| CodecError::Decode(e.to_string()))
            }
            SerializerType::Json => {
                serde_json::from_slice(bytes).map_err(|e| CodecError::Decode(e.to_string()))
            }
        }
    }

    /// Encode a value into the framed byte form stored in cache entries.
    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        let raw = self.serialize_raw(value)?;
        if self.enable_compression && raw.len() >= self.min_size_to_compress {
            let compressed =
                lz4::block::compress(&raw, None, false).map_err(|e| CodecError::Encode(e.to_string()))?;
            let mut framed = Vec::with_capacity(compressed.len() + 9);
            framed.push(FLAG_LZ4);
            framed.extend_from_slice(&(raw.len() as u64).to_le_bytes());
            framed.extend_from_slice(&compressed);
            Ok(framed)
        } else {
            let mut framed = Vec::with_capacity(raw.len() + 1);
            framed.push(FLAG_RAW);
            framed.extend_from_slice(&raw);
            Ok(framed)
        }
    }

    /// Decode the framed byte form back into a value, transparently
    /// decompressing when the frame says so.
    pub fn decode<T: DeserializeOwned>(&self, framed: &[u8]) -> Result<T, CodecError> {
        let (flag, rest) = framed
            .split_first()
            .ok_or_else(|| CodecError::Decode("empty payload".to_string()))?;
        match *flag {
            FLAG_RAW => self.deserialize_raw(rest),
            FLAG_LZ4 => {
                if rest.len() < 8 {
                    return Err(CodecError::Decode("truncated lz4 frame".to_string()));
                }
                let (len_bytes, compressed) = rest.split_at(8);
                let original_len =
                    u64::from_le_bytes(len_bytes.try_into().unwrap()) as i32;
                let raw = lz4::block::decompress(compressed, Some(original_len))
                    .map_err(|e| CodecError::Decode(e.to_string()))?;
                self.deserialize_raw(&raw)
            }
            other => Err(CodecError::Decode(format!("unknown frame flag {other}"))),
        }
    }
}
