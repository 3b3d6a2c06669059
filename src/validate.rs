//! Input legitimacy checks
//!
//! Pure predicates run before the engine touches its Index. Each check
//! returns the matching `Invalid*` error instead of a bare bool.

use std::io;

use serde_json::Value;

use crate::error::{Result, StashError};
use crate::index::Document;

/// Non-empty and at most `max_key_len` characters
pub fn check_key(key: &str, max_key_len: usize) -> Result<()> {
    if key.is_empty() {
        return Err(StashError::InvalidKey("key must not be empty".to_string()));
    }
    let len = key.chars().count();
    if len > max_key_len {
        return Err(StashError::InvalidKey(format!(
            "key is {} characters, allowed size is {}",
            len, max_key_len
        )));
    }
    Ok(())
}

/// Accept only string keys from untyped input
pub fn key_from_json(key: &Value) -> Result<&str> {
    key.as_str()
        .ok_or_else(|| StashError::InvalidKey(format!("key [{}] must be a string", key)))
}

/// Unwrap a JSON object no larger than `max_value_size` serialized bytes
pub fn into_document(value: Value, max_value_size: usize) -> Result<Document> {
    let document = match value {
        Value::Object(map) => map,
        other => {
            return Err(StashError::InvalidValue(format!(
                "value must be a JSON object, got {}",
                type_name(&other)
            )))
        }
    };

    let size = serialized_size(&document)?;
    if size > max_value_size {
        return Err(StashError::InvalidValue(format!(
            "value is {} bytes, allowed size is {}",
            size, max_value_size
        )));
    }
    Ok(document)
}

/// Coerce a TTL from untyped input into whole seconds
///
/// Accepts non-negative integers, finite non-negative floats (truncated)
/// and strings holding a non-negative integer.
pub fn coerce_ttl(raw: &Value) -> Result<u64> {
    let invalid = || StashError::InvalidTtl(format!("time-to-live {} must be an integer value", raw));

    match raw {
        Value::Number(n) => {
            if let Some(secs) = n.as_u64() {
                Ok(secs)
            } else if let Some(f) = n.as_f64() {
                if f.is_finite() && f >= 0.0 && f < u64::MAX as f64 {
                    Ok(f.trunc() as u64)
                } else {
                    Err(invalid())
                }
            } else {
                Err(invalid())
            }
        }
        Value::String(s) => s.trim().parse::<u64>().map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}

/// Byte length of the compact JSON encoding, without allocating it
fn serialized_size(document: &Document) -> Result<usize> {
    let mut counter = ByteCounter(0);
    serde_json::to_writer(&mut counter, document)
        .map_err(|e| StashError::Serialization(e.to_string()))?;
    Ok(counter.0)
}

struct ByteCounter(usize);

impl io::Write for ByteCounter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0 += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
