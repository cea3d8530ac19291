use super::publisher::Record;
use serde_json::Value;
use tracing::debug;

/// Partition key for `record`, read from `key_field`.
///
/// A top-level field with that exact name wins; otherwise a dotted path
/// such as `meta.id` is followed into nested objects. Encoded records,
/// missing fields and nulls yield no key.
pub fn extract_key(record: &Record, key_field: &str) -> Option<String> {
    let Record::Structured(value) = record else {
        debug!("Encoded record has no '{}' field to key by", key_field);
        return None;
    };

    let found = value
        .get(key_field)
        .or_else(|| extract_field_value(value, key_field));

    match found {
        Some(field) => key_to_string(field),
        None => {
            debug!("Field '{}' not found in record", key_field);
            None
        }
    }
}

fn extract_field_value<'a>(record: &'a Value, field_path: &str) -> Option<&'a Value> {
    field_path
        .split('.')
        .try_fold(record, |current, part| current.get(part))
}

fn key_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}
