//! Unary HTTP handler.
//!
//! Turns an HTTP request into a request envelope, runs it through the proxy
//! and writes the response envelope back.

use std::sync::Arc;

use axum::body::{Body, Bytes};
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};

use verbgate_core::{MultiMap, RequestEnvelope, ResponseEnvelope, Verb};
use verbgate_proxy::CallContext;

use crate::error::ApiError;
use crate::state::GatewayState;

/// Unary call handler.
///
/// ```text
/// POST /api/UploadPhoto?album=cats
/// {"data": "aGVsbG8="}
///
/// Response: 200 OK
/// {"uuid": "..."}
/// ```
///
/// # Errors
///
/// Returns `ApiError::MethodNotAllowed` if the HTTP method is not a routing
/// verb. Dispatch failures are already encoded in the response envelope.
pub async fn unary_handler(
    State(state): State<Arc<GatewayState>>,
    method: Method,
    Path(procedure): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    let verb: Verb = method
        .as_str()
        .parse()
        .map_err(|_| ApiError::MethodNotAllowed(method.to_string()))?;

    let mut request = RequestEnvelope::new(verb, procedure);
    request.params = params.into_iter().collect();
    request.headers = header_multimap(&headers);
    if !body.is_empty() {
        request.payload = Some(body);
    }

    let response = state.proxy.proxy_unary(CallContext::new(), request).await;
    Ok(into_http(response))
}

/// Copy HTTP headers into a multimap, skipping values that are not valid text.
pub(crate) fn header_multimap(headers: &HeaderMap) -> MultiMap {
    headers
        .iter()
        .filter_map(|(name, value)| Some((name.as_str(), value.to_str().ok()?)))
        .collect()
}

fn into_http(envelope: ResponseEnvelope) -> Response {
    let status =
        StatusCode::from_u16(envelope.status_code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let mut response = match envelope.payload {
        Some(payload) => (status, Body::from(payload)).into_response(),
        None => status.into_response(),
    };

    for (name, values) in envelope.headers.iter() {
        let Ok(name) = HeaderName::try_from(name) else {
            continue;
        };
        for value in values {
            if let Ok(value) = HeaderValue::try_from(value.as_str()) {
                response.headers_mut().append(name.clone(), value);
            }
        }
    }
    response
}
