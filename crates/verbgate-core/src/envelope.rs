//! Canonical request/response envelopes exchanged between transport
//! adapters and executors.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::verb::Verb;

/// An ordered multi-valued string map, used for headers and query parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MultiMap(BTreeMap<String, Vec<String>>);

impl MultiMap {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value under `key`, keeping earlier values.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.entry(key.into()).or_default().push(value.into());
    }

    /// All values recorded for `key`, in insertion order.
    #[must_use]
    pub fn get_all(&self, key: &str) -> &[String] {
        self.0.get(key).map_or(&[], Vec::as_slice)
    }

    /// The last value recorded for `key`.
    #[must_use]
    pub fn last(&self, key: &str) -> Option<&str> {
        self.get_all(key).last().map(String::as_str)
    }

    /// Returns true if no keys are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of distinct keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterate over keys and their values.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

impl<K, V> FromIterator<(K, V)> for MultiMap
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (key, value) in iter {
            map.append(key, value);
        }
        map
    }
}

/// A transport request normalized for the executors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestEnvelope {
    /// Routing verb.
    pub verb: Verb,
    /// Procedure name, without the verb prefix.
    pub procedure: String,
    /// Inbound headers.
    pub headers: MultiMap,
    /// Query parameters.
    pub params: MultiMap,
    /// Raw request body, if any.
    pub payload: Option<Bytes>,
}

impl RequestEnvelope {
    /// Create an envelope with no headers, parameters or body.
    #[must_use]
    pub fn new(verb: Verb, procedure: impl Into<String>) -> Self {
        Self {
            verb,
            procedure: procedure.into(),
            headers: MultiMap::new(),
            params: MultiMap::new(),
            payload: None,
        }
    }

    /// Set the body.
    #[must_use]
    pub fn with_payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    /// Add a query parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.append(key, value);
        self
    }

    /// Add a header.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(key, value);
        self
    }
}

/// The executor's answer to a unary request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseEnvelope {
    /// Transport status code.
    pub status_code: u16,
    /// Response body; `None` means "no content".
    pub payload: Option<Bytes>,
    /// Headers to write on the transport response.
    pub headers: MultiMap,
}

impl ResponseEnvelope {
    /// A `200` response carrying `payload`.
    #[must_use]
    pub fn ok(payload: Option<Bytes>) -> Self {
        Self::with_status(200, payload)
    }

    /// A `200` response with no body.
    #[must_use]
    pub fn no_content() -> Self {
        Self::ok(None)
    }

    /// A response with an arbitrary status.
    #[must_use]
    pub fn with_status(status_code: u16, payload: Option<Bytes>) -> Self {
        Self {
            status_code,
            payload,
            headers: MultiMap::new(),
        }
    }

    /// Add a header to write on the transport response.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(key, value);
        self
    }

    /// Returns true for 2xx statuses.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status_code >= 200 && self.status_code < 300
    }
}
