//! JSON message codec.
//!
//! Messages travel through the engine as `serde_json::Value`. Decoding into a
//! backend type is lenient: the payload is merged over the type's default
//! value, so partial payloads decode and unknown fields are dropped. Encoding
//! emits every field.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::CallError;

/// Parse a raw payload into a JSON value. An absent or empty payload is the
/// empty object.
///
/// # Errors
///
/// Returns `CallError::Decode` if the bytes are not valid JSON.
pub fn parse_payload(payload: Option<&[u8]>) -> Result<Value, CallError> {
    match payload {
        None => Ok(Value::Object(Map::new())),
        Some(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => Ok(Value::Object(Map::new())),
        Some(bytes) => serde_json::from_slice(bytes).map_err(|e| CallError::Decode(e.to_string())),
    }
}

/// Decode a JSON value into `T`, starting from `T::default()`.
///
/// # Errors
///
/// Returns `CallError::Decode` if the merged value does not fit `T`.
pub fn decode_into<T>(value: Value) -> Result<T, CallError>
where
    T: DeserializeOwned + Serialize + Default,
{
    let mut base =
        serde_json::to_value(T::default()).map_err(|e| CallError::Decode(e.to_string()))?;
    match value {
        Value::Null => {}
        Value::Object(fields) if base.is_object() => merge_object(&mut base, fields),
        other => base = other,
    }
    serde_json::from_value(base).map_err(|e| CallError::Decode(e.to_string()))
}

/// Encode a backend message as a JSON value.
///
/// # Errors
///
/// Returns `CallError::Encode` if serialization fails.
pub fn encode_value<T: Serialize>(message: &T) -> Result<Value, CallError> {
    serde_json::to_value(message).map_err(|e| CallError::Encode(e.to_string()))
}

/// Encode a value as a stream frame payload.
///
/// # Errors
///
/// Returns `CallError::Encode` if serialization fails.
pub fn encode_frame(value: &Value) -> Result<Bytes, CallError> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|e| CallError::Encode(e.to_string()))
}

/// Encode a unary response. `null` and `{}` mean "no content" and yield `None`.
///
/// # Errors
///
/// Returns `CallError::Encode` if serialization fails.
pub fn encode_unary(value: &Value) -> Result<Option<Bytes>, CallError> {
    match value {
        Value::Null => Ok(None),
        Value::Object(fields) if fields.is_empty() => Ok(None),
        other => encode_frame(other).map(Some),
    }
}

/// Deep-merge `src` into `dst`. Nested objects merge recursively; any other
/// value in `src` replaces the one in `dst`.
pub fn merge_object(dst: &mut Value, src: Map<String, Value>) {
    let Value::Object(dst_fields) = dst else {
        *dst = Value::Object(src);
        return;
    };
    for (key, value) in src {
        if let Value::Object(nested) = value {
            if let Some(existing @ Value::Object(_)) = dst_fields.get_mut(&key) {
                merge_object(existing, nested);
                continue;
            }
            dst_fields.insert(key, Value::Object(nested));
        } else {
            dst_fields.insert(key, value);
        }
    }
}
