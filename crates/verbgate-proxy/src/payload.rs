//! Request payload construction.
//!
//! Query parameters become a JSON object (last value wins for repeated
//! keys). Verbs without body semantics use only that object; verbs with a
//! body deep-merge it under the body, so body values win on conflict.

use bytes::Bytes;
use serde_json::{Map, Value};

use verbgate_core::{MultiMap, RequestEnvelope, Verb};

use crate::codec::merge_object;
use crate::error::ProxyError;

/// Convert query parameters to a JSON object.
///
/// A value that is itself a JSON object is expanded, and string members of
/// such objects are expanded in turn.
#[must_use]
pub fn params_to_object(params: &MultiMap) -> Map<String, Value> {
    params
        .iter()
        .filter_map(|(key, values)| {
            let last = values.last()?;
            Some((key.to_string(), expand_param(last)))
        })
        .collect()
}

fn expand_param(raw: &str) -> Value {
    match serde_json::from_str::<Map<String, Value>>(raw) {
        Ok(fields) => Value::Object(
            fields
                .into_iter()
                .map(|(key, value)| match value {
                    Value::String(s) => (key, expand_param(&s)),
                    other => (key, other),
                })
                .collect(),
        ),
        Err(_) => Value::String(raw.to_string()),
    }
}

/// Build the canonical payload from parameters and body.
///
/// Returns `None` when there is neither a body nor any parameter.
///
/// # Errors
///
/// Returns `ProxyError::BadPayload` if the body has to be merged with
/// parameters but is not a JSON object.
pub fn merge_payload(
    verb: Verb,
    params: &MultiMap,
    body: Option<&[u8]>,
) -> Result<Option<Bytes>, ProxyError> {
    let query = params_to_object(params);
    let body = body.filter(|b| !b.is_empty()).filter(|_| verb.has_body());

    match (body, query.is_empty()) {
        (None, true) => Ok(None),
        (None, false) => encode(&Value::Object(query)).map(Some),
        (Some(body), true) => Ok(Some(Bytes::copy_from_slice(body))),
        (Some(body), false) => {
            // A `null` body carries no fields and leaves the parameters as they are.
            let body_fields: Option<Map<String, Value>> =
                serde_json::from_slice(body).map_err(|e| {
                    ProxyError::BadPayload(format!("failed to unmarshal request body JSON: {e}"))
                })?;
            let body_fields = body_fields.unwrap_or_default();
            let mut merged = Value::Object(query);
            merge_object(&mut merged, body_fields);
            encode(&merged).map(Some)
        }
    }
}

/// Build the payload for a unary request envelope.
///
/// # Errors
///
/// See [`merge_payload`].
pub fn request_payload(request: &RequestEnvelope) -> Result<Option<Bytes>, ProxyError> {
    merge_payload(request.verb, &request.params, request.payload.as_deref())
}

fn encode(value: &Value) -> Result<Bytes, ProxyError> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|e| ProxyError::Internal(format!("failed to marshal query parameters to JSON: {e}")))
}
