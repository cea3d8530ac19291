use super::publisher::Record;
use crate::Result;
use bytes::Bytes;
use serde_json::Value;

/// Turns a record into its wire payload.
///
/// Encoded records and JSON strings pass through as raw bytes; every other
/// structured value is written as compact JSON.
pub fn serialize(record: &Record) -> Result<Bytes> {
    match record {
        Record::Encoded(bytes) => Ok(bytes.clone()),
        Record::Structured(Value::String(text)) => Ok(Bytes::copy_from_slice(text.as_bytes())),
        Record::Structured(value) => Ok(Bytes::from(serde_json::to_vec(value)?)),
    }
}
