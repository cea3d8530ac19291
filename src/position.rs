//! Checkpoint position values and their on-store byte encoding.
//!
//! Positions written by this crate are stored as `format=json;` followed by
//! the JSON serialization of the value. Older exporters wrote either a
//! 4-byte big-endian integer or an arbitrary raw buffer; those payloads are
//! still accepted by [`decode`] and surface as the legacy variants.
//!
//! # Example
//!
//! ```rust
//! use resumable_exporter::position::{decode, encode, Position};
//! use serde_json::json;
//!
//! let position = Position::Structured(json!({"timestamp": 1000, "key": 1}));
//! let bytes = encode(&position).unwrap();
//! assert_eq!(&bytes[..], br#"format=json;{"timestamp":1000,"key":1}"#);
//! assert_eq!(decode(&bytes).unwrap(), Some(position));
//! ```

use crate::{Error, Result};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;

/// Marker prefixed to every versioned checkpoint payload.
pub const FORMAT_HEADER: &str = "format=json;";

const LEGACY_INTEGER_WIDTH: usize = 4;

/// The progress marker persisted for an exporter/topic pair.
///
/// Equality compares checkpoint values, so `LegacyInteger(n)` equals the
/// structured number `n` it is upgraded to on write.
#[derive(Debug, Clone)]
pub enum Position {
    /// Fixed-width big-endian integer written by the oldest exporters.
    LegacyInteger(u32),
    /// Unrecognized raw payload, passed through as-is.
    LegacyBuffer(Bytes),
    /// Application-defined JSON value.
    Structured(Value),
}

impl Position {
    /// Builds a structured position from any serializable value.
    pub fn from_serializable<T: Serialize>(value: &T) -> Result<Self> {
        Ok(Position::Structured(serde_json::to_value(value)?))
    }

    /// Deserializes a structured (or legacy integer) position into `T`.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T> {
        match self {
            Position::Structured(value) => Ok(serde_json::from_value(value.clone())?),
            Position::LegacyInteger(n) => Ok(serde_json::from_value(Value::from(*n))?),
            Position::LegacyBuffer(_) => Err(Error::Codec(
                "legacy buffer position has no structured form".to_string(),
            )),
        }
    }

    /// The `key` field of a structured position, if present and numeric.
    pub fn key(&self) -> Option<u64> {
        match self {
            Position::Structured(value) => value.get("key").and_then(Value::as_u64),
            _ => None,
        }
    }

    /// Numeric view of the position, for integer-valued checkpoints.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Position::LegacyInteger(n) => Some(u64::from(*n)),
            Position::Structured(value) => value.as_u64(),
            Position::LegacyBuffer(_) => None,
        }
    }
}

impl PartialEq for Position {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Position::LegacyInteger(a), Position::LegacyInteger(b)) => a == b,
            (Position::LegacyBuffer(a), Position::LegacyBuffer(b)) => a == b,
            (Position::Structured(a), Position::Structured(b)) => a == b,
            (Position::LegacyInteger(n), Position::Structured(value))
            | (Position::Structured(value), Position::LegacyInteger(n)) => {
                value.as_u64() == Some(u64::from(*n))
            }
            _ => false,
        }
    }
}

impl From<u32> for Position {
    fn from(n: u32) -> Self {
        Position::Structured(Value::from(n))
    }
}

impl From<Value> for Position {
    fn from(value: Value) -> Self {
        Position::Structured(value)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Position::LegacyInteger(n) => write!(f, "{}", n),
            Position::LegacyBuffer(bytes) => write!(f, "<legacy buffer, {} bytes>", bytes.len()),
            Position::Structured(value) => write!(f, "{}", value),
        }
    }
}

/// Computes the idempotent key for the next record.
///
/// Returns `k + 1` when the last position carries `key = k`, and `1` on a
/// cold start or when the stored position has no key.
pub fn next_key(last: Option<&Position>) -> u64 {
    last.and_then(Position::key).map_or(1, |key| key + 1)
}

/// Encodes a position into the versioned checkpoint format.
///
/// Legacy integers are upgraded to a JSON number. Legacy buffers have no
/// JSON form and are rejected.
pub fn encode(position: &Position) -> Result<Bytes> {
    let body = match position {
        Position::Structured(value) => serde_json::to_string(value)?,
        Position::LegacyInteger(n) => n.to_string(),
        Position::LegacyBuffer(_) => {
            return Err(Error::Codec(
                "refusing to write a legacy buffer position".to_string(),
            ))
        }
    };

    let mut payload = String::with_capacity(FORMAT_HEADER.len() + body.len());
    payload.push_str(FORMAT_HEADER);
    payload.push_str(&body);
    Ok(Bytes::from(payload))
}

/// Decodes a checkpoint payload.
///
/// Returns `Ok(None)` for an empty payload. Payloads without the versioned
/// marker go through the legacy path and never fail.
pub fn decode(payload: &[u8]) -> Result<Option<Position>> {
    if payload.is_empty() {
        return Ok(None);
    }

    if let Some(body) = payload.strip_prefix(FORMAT_HEADER.as_bytes()) {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| Error::Codec(format!("invalid versioned checkpoint: {}", e)))?;
        return Ok(Some(Position::Structured(value)));
    }

    Ok(Some(decode_legacy(payload)))
}

fn decode_legacy(payload: &[u8]) -> Position {
    match <[u8; LEGACY_INTEGER_WIDTH]>::try_from(payload) {
        Ok(raw) => Position::LegacyInteger(u32::from_be_bytes(raw)),
        Err(_) => Position::LegacyBuffer(Bytes::copy_from_slice(payload)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[test]
    fn test_structured_round_trip() {
        let positions = [
            Position::Structured(json!({"timestamp": 1000, "key": 1})),
            Position::Structured(json!({"block": 18_000_000u64, "tx_index": 42, "hash": "0xabc"})),
            Position::Structured(json!(17)),
            Position::Structured(json!("2024-01-01T00:00:00Z")),
            Position::Structured(json!([1, 2, 3])),
        ];

        for position in positions {
            let encoded = encode(&position).unwrap();
            assert!(encoded.starts_with(FORMAT_HEADER.as_bytes()));
            assert_eq!(decode(&encoded).unwrap(), Some(position));
        }
    }

    #[test]
    fn test_legacy_integer_decodes_big_endian() {
        let payload = 123_456u32.to_be_bytes();
        assert_eq!(decode(&payload).unwrap(), Some(Position::LegacyInteger(123_456)));
    }

    #[test]
    fn test_legacy_buffer_passthrough() {
        let payload = b"9876543";
        assert_eq!(
            decode(payload).unwrap(),
            Some(Position::LegacyBuffer(Bytes::from_static(b"9876543")))
        );
    }

    #[test]
    fn test_legacy_integer_is_upgraded_on_encode() {
        let encoded = encode(&Position::LegacyInteger(500)).unwrap();
        assert_eq!(&encoded[..], b"format=json;500");
        assert_eq!(decode(&encoded).unwrap().unwrap().as_u64(), Some(500));
    }

    #[test]
    fn test_legacy_integer_round_trips_as_equal_value() {
        let legacy = Position::LegacyInteger(500);
        let decoded = decode(&encode(&legacy).unwrap()).unwrap();

        assert_eq!(decoded, Some(Position::LegacyInteger(500)));
        assert_eq!(decoded, Some(Position::Structured(json!(500))));
        assert_ne!(legacy, Position::LegacyInteger(501));
        assert_ne!(legacy, Position::Structured(json!("500")));
        assert_ne!(legacy, Position::LegacyBuffer(Bytes::from_static(b"500")));
    }

    #[test]
    fn test_legacy_buffer_cannot_be_encoded() {
        let result = encode(&Position::LegacyBuffer(Bytes::from_static(b"raw")));
        assert!(matches!(result, Err(Error::Codec(_))));
    }

    #[test]
    fn test_corrupt_versioned_payload_is_codec_error() {
        let result = decode(b"format=json;{not json");
        assert!(matches!(result, Err(Error::Codec(_))));
    }

    #[test]
    fn test_empty_payload_is_no_position() {
        assert_eq!(decode(b"").unwrap(), None);
    }

    #[test]
    fn test_next_key() {
        assert_eq!(next_key(None), 1);

        let last = Position::Structured(json!({"timestamp": 1000, "key": 41}));
        assert_eq!(next_key(Some(&last)), 42);

        let keyless = Position::Structured(json!({"timestamp": 1000}));
        assert_eq!(next_key(Some(&keyless)), 1);
    }

    #[test]
    fn test_typed_helpers() {
        #[derive(Debug, Serialize, Deserialize, PartialEq)]
        struct Cursor {
            timestamp: u64,
            key: u64,
        }

        let cursor = Cursor { timestamp: 1000, key: 7 };
        let position = Position::from_serializable(&cursor).unwrap();
        assert_eq!(position.key(), Some(7));
        assert_eq!(position.deserialize::<Cursor>().unwrap(), cursor);

        assert_eq!(Position::LegacyInteger(9).deserialize::<u64>().unwrap(), 9);
    }
}
