//! Serialization of cached payloads and journal records
//!
//! Payloads are stored as JSON wrapped in a small envelope that records the
//! payload's runtime type. A read asking for a different type than the one
//! that was written is reported as a decode failure, which the store treats
//! as an invalid entry.

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;

use crate::cache::CacheEntry;

/// Runtime descriptor of a payload type
///
/// Travels alongside every `get`/`put` so the codec can tag what it writes
/// and verify what it reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PayloadType {
    name: &'static str,
}

impl PayloadType {
    /// Descriptor for the Rust type `T`
    ///
    /// Only sized types describe a payload that can be read back, so `str`
    /// and slices have no descriptor; use `String` and `Vec`.
    pub fn of<T>() -> Self {
        Self {
            name: std::any::type_name::<T>(),
        }
    }

    /// Type name recorded in payload envelopes
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl std::fmt::Display for PayloadType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

/// Errors produced while encoding or decoding cache data
#[derive(Debug, Error)]
pub enum CodecError {
    /// The payload could not be serialized
    #[error("Failed to encode {type_name}: {source}")]
    Encode {
        type_name: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// The stored bytes could not be parsed as the requested type
    #[error("Failed to decode {type_name}: {source}")]
    Decode {
        type_name: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// The stored payload was written for another type
    #[error("Payload type mismatch: stored {stored}, requested {requested}")]
    TypeMismatch {
        stored: String,
        requested: &'static str,
    },

    /// A journal line is not a valid entry record
    #[error("Malformed journal record: {0}")]
    Record(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct PayloadRef<'a, T: ?Sized> {
    #[serde(rename = "type")]
    type_name: &'a str,
    data: &'a T,
}

#[derive(Deserialize)]
struct StoredPayload<T> {
    #[serde(rename = "type")]
    type_name: String,
    data: T,
}

/// JSON codec for payload files and journal records
#[derive(Debug, Clone, Copy, Default)]
pub struct EntryCodec;

impl EntryCodec {
    /// Serializes a payload tagged with its type descriptor
    pub fn encode<T: Serialize + ?Sized>(
        &self,
        value: &T,
        payload_type: PayloadType,
    ) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(&PayloadRef {
            type_name: payload_type.name(),
            data: value,
        })
        .map_err(|source| CodecError::Encode {
            type_name: payload_type.name(),
            source,
        })
    }

    /// Deserializes a payload, checking that it was written for `payload_type`
    pub fn decode<T: DeserializeOwned>(
        &self,
        bytes: &[u8],
        payload_type: PayloadType,
    ) -> Result<T, CodecError> {
        let stored: StoredPayload<T> =
            serde_json::from_slice(bytes).map_err(|source| CodecError::Decode {
                type_name: payload_type.name(),
                source,
            })?;

        if stored.type_name != payload_type.name() {
            return Err(CodecError::TypeMismatch {
                stored: stored.type_name,
                requested: payload_type.name(),
            });
        }

        Ok(stored.data)
    }

    /// Serializes an entry as a single journal line (without the newline)
    pub fn encode_entry(&self, entry: &CacheEntry) -> Result<String, CodecError> {
        Ok(serde_json::to_string(entry)?)
    }

    /// Parses a single journal line
    pub fn decode_entry(&self, line: &str) -> Result<CacheEntry, CodecError> {
        Ok(serde_json::from_str(line)?)
    }
}
