//! Error types for the dispatch engine.
//!
//! Errors fall into two classes. [`SetupError`] is raised while building the
//! catalogue and aborts construction. [`ProxyError`] is raised while serving
//! and is always converted into a response or a terminal stream error.

use std::any::Any;

use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;
use tonic::Code;

use verbgate_core::{http_status_for, ResponseEnvelope, Verb};

use crate::shape::CallShape;
use crate::signature::Kind;

/// A result type using `ProxyError`.
pub type Result<T> = std::result::Result<T, ProxyError>;

/// Fatal errors raised while validating the exposed interface.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SetupError {
    /// No backend was supplied to the builder.
    #[error("no backend server configured")]
    MissingBackend,

    /// No exposed interface was supplied to the builder.
    #[error("no exposed interface configured")]
    MissingInterface,

    /// The exposed method name has no valid verb prefix.
    #[error("{0} does not begin with a valid HTTP method")]
    InvalidVerbPrefix(String),

    /// The backend has no procedure with the stripped name.
    #[error("server is missing method {0}")]
    MissingMethod(String),

    /// The backend procedure matches none of the four call shapes.
    #[error("method {0} does not match a supported call pattern")]
    UnsupportedShape(String),

    /// Exposed and backend signatures are structurally incompatible.
    #[error("api/server arguments do not match for method ({exposed}/{procedure}): {reason}")]
    SignatureMismatch {
        /// Exposed method name.
        exposed: String,
        /// Backend procedure name.
        procedure: String,
        /// First detected difference.
        reason: MismatchReason,
    },

    /// The registered handler does not implement the classified shape.
    #[error("procedure {procedure} is classified as {shape} but its handler is {handler}")]
    HandlerMismatch {
        /// Backend procedure name.
        procedure: String,
        /// Shape derived from the signature.
        shape: CallShape,
        /// Shape the handler implements.
        handler: CallShape,
    },

    /// Two exposed methods resolve to the same routing key.
    #[error("duplicate route {verb} {procedure}")]
    DuplicateRoute {
        /// Routing verb.
        verb: Verb,
        /// Procedure name.
        procedure: String,
    },
}

/// Why two signatures are incompatible.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MismatchReason {
    /// One side has only a receiver.
    #[error("cannot exclude receiver from argument checks: expected >= 2 input arguments, found {expected} and {found}")]
    TooFewArguments {
        /// Exposed parameter count.
        expected: usize,
        /// Backend parameter count.
        found: usize,
    },

    /// One side's receiver is not a pointer to a structured type.
    #[error("no receiver")]
    NoReceiver,

    /// The lists have different lengths.
    #[error("{list} lengths did not match: expected {expected} but found {found}")]
    LengthMismatch {
        /// `"argument"` or `"return"`.
        list: &'static str,
        /// Exposed length.
        expected: usize,
        /// Backend length.
        found: usize,
    },

    /// Kinds differ at a position.
    #[error("{list}s mismatch in position {position}: {expected} vs {found}")]
    KindMismatch {
        /// `"argument"` or `"return"`.
        list: &'static str,
        /// Zero-based position, excluding the receiver.
        position: usize,
        /// Exposed kind.
        expected: Kind,
        /// Backend kind.
        found: Kind,
    },
}

/// Errors surfaced at the backend call boundary.
#[derive(Debug, Error, Clone)]
pub enum CallError {
    /// The backend returned an RPC status.
    #[error("{0}")]
    Status(#[from] tonic::Status),

    /// A payload could not be decoded into the expected message type.
    #[error("could not decode message: {0}")]
    Decode(String),

    /// A message could not be encoded.
    #[error("could not encode message: {0}")]
    Encode(String),

    /// The backend panicked.
    #[error("caught panic: {0}")]
    Fault(String),

    /// The backend failed with an error outside the status vocabulary.
    #[error("non-status error from backend: {0}")]
    Other(String),

    /// The backend side of a stream is gone.
    #[error("backend stream closed")]
    StreamClosed,
}

impl CallError {
    /// Convert a caught panic payload into a fault.
    #[must_use]
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic payload".to_string());
        Self::Fault(message)
    }
}

/// Errors raised by a frame transport.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The peer went away.
    #[error("transport closed")]
    Closed,

    /// Reading or writing failed.
    #[error("transport error: {0}")]
    Io(String),
}

/// Request-time errors.
#[derive(Debug, Error, Clone)]
pub enum ProxyError {
    /// No binding for the routing key.
    #[error("no procedure {procedure} defined for {verb} method in api")]
    RouteNotFound {
        /// Routing verb.
        verb: Verb,
        /// Procedure name.
        procedure: String,
    },

    /// The binding exists but has a shape the entry point cannot serve.
    #[error("{procedure} is a {found} procedure and cannot be called as {expected}")]
    WrongShape {
        /// Procedure name.
        procedure: String,
        /// What the entry point serves.
        expected: &'static str,
        /// The binding's shape.
        found: CallShape,
    },

    /// Client input could not be turned into a payload.
    #[error("bad payload: {0}")]
    BadPayload(String),

    /// A streaming handshake or framing rule was broken.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The backend answered with an RPC status.
    #[error("{}", .0.message())]
    Backend(tonic::Status),

    /// The backend failed outside the status vocabulary.
    #[error("received non-status error from backend: {0}")]
    BackendOther(String),

    /// The gateway itself failed.
    #[error("internal error: {0}")]
    Internal(String),

    /// The transport failed mid-call.
    #[error("{0}")]
    Transport(#[from] TransportError),

    /// The call context was cancelled or its deadline passed.
    #[error("call cancelled")]
    Cancelled,
}

/// Error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse<'a> {
    error: ErrorBody<'a>,
}

/// Error details.
#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: String,
}

impl ProxyError {
    /// Get the transport status code for this error.
    ///
    /// Backend statuses go through the status table. A `tonic::Status`
    /// cannot hold a raw code outside the RPC vocabulary (`Code::from_i32`
    /// folds those into `Unknown`), so a backend status never reaches the
    /// `500` row for unrecognized codes; it reports `502` instead. Raw
    /// codes from other sources use `verbgate_core::http_status_for_code`.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::RouteNotFound { .. } => 501,
            Self::WrongShape { .. } | Self::BadPayload(_) | Self::Protocol(_) => 400,
            Self::Backend(status) => http_status_for(status.code()),
            Self::BackendOther(_) | Self::Transport(_) => 502,
            Self::Internal(_) => 500,
            Self::Cancelled => 504,
        }
    }

    /// Get the error code string for this error.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::RouteNotFound { .. } => "route_not_found",
            Self::WrongShape { .. } => "wrong_shape",
            Self::BadPayload(_) => "bad_payload",
            Self::Protocol(_) => "protocol_error",
            Self::Backend(status) => rpc_code_name(status.code()),
            Self::BackendOther(_) => "bad_gateway",
            Self::Internal(_) => "internal_error",
            Self::Transport(_) => "transport_error",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns true if the error originated in the backend.
    #[must_use]
    pub const fn is_backend(&self) -> bool {
        matches!(self, Self::Backend(_) | Self::BackendOther(_))
    }

    /// Render this error as a response envelope with a JSON body.
    #[must_use]
    pub fn to_response(&self) -> ResponseEnvelope {
        ResponseEnvelope::with_status(self.status_code(), Some(self.to_body()))
            .with_header("content-type", "application/json")
    }

    /// The JSON error body.
    #[must_use]
    pub fn to_body(&self) -> Bytes {
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.code(),
                message: self.to_string(),
            },
        };
        serde_json::to_vec(&body).map_or_else(|_| Bytes::from(self.to_string()), Bytes::from)
    }
}

impl From<CallError> for ProxyError {
    fn from(err: CallError) -> Self {
        match err {
            CallError::Status(status) => Self::Backend(status),
            CallError::Decode(msg) => Self::BadPayload(msg),
            CallError::Encode(msg) => {
                Self::Internal(format!("could not encode response message: {msg}"))
            }
            CallError::Fault(msg) => Self::Internal(format!("caught panic: {msg}")),
            CallError::Other(msg) => Self::BackendOther(msg),
            CallError::StreamClosed => Self::Internal("backend stream closed".to_string()),
        }
    }
}

/// Snake-case name of an RPC code.
#[must_use]
pub const fn rpc_code_name(code: Code) -> &'static str {
    match code {
        Code::Ok => "ok",
        Code::Cancelled => "cancelled",
        Code::Unknown => "unknown",
        Code::InvalidArgument => "invalid_argument",
        Code::DeadlineExceeded => "deadline_exceeded",
        Code::NotFound => "not_found",
        Code::AlreadyExists => "already_exists",
        Code::PermissionDenied => "permission_denied",
        Code::ResourceExhausted => "resource_exhausted",
        Code::FailedPrecondition => "failed_precondition",
        Code::Aborted => "aborted",
        Code::OutOfRange => "out_of_range",
        Code::Unimplemented => "unimplemented",
        Code::Internal => "internal",
        Code::Unavailable => "unavailable",
        Code::DataLoss => "data_loss",
        Code::Unauthenticated => "unauthenticated",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_status_codes() {
        assert_eq!(
            ProxyError::RouteNotFound {
                verb: Verb::Get,
                procedure: "Nope".into()
            }
            .status_code(),
            501
        );
        assert_eq!(ProxyError::BadPayload("x".into()).status_code(), 400);
        assert_eq!(ProxyError::Protocol("x".into()).status_code(), 400);
        assert_eq!(ProxyError::Internal("x".into()).status_code(), 500);
        assert_eq!(ProxyError::BackendOther("x".into()).status_code(), 502);
        assert_eq!(ProxyError::Cancelled.status_code(), 504);
        assert_eq!(
            ProxyError::from(CallError::Status(tonic::Status::not_found("gone"))).status_code(),
            404
        );
        assert_eq!(
            ProxyError::from(CallError::Status(tonic::Status::internal("boom"))).status_code(),
            502
        );
    }

    #[test]
    fn gateway_faults_are_distinct_from_backend_errors() {
        let fault = ProxyError::from(CallError::Fault("oops".into()));
        assert_eq!(fault.status_code(), 500);
        assert!(!fault.is_backend());

        let backend = ProxyError::from(CallError::Status(tonic::Status::internal("oops")));
        assert!(backend.is_backend());
        assert_ne!(backend.status_code(), fault.status_code());
    }

    #[test]
    fn backend_status_message_is_reported() {
        let err = ProxyError::Backend(tonic::Status::aborted("stopped"));
        assert_eq!(err.to_string(), "stopped");
        assert_eq!(err.code(), "aborted");
        assert_eq!(err.status_code(), 502);
    }

    #[test]
    fn out_of_vocabulary_backend_code_is_unknown() {
        let err = ProxyError::Backend(tonic::Status::new(Code::from_i32(99), "odd"));
        assert_eq!(err.code(), "unknown");
        assert_eq!(err.status_code(), 502);
        assert_eq!(verbgate_core::http_status_for_code(99), 500);
    }

    #[test]
    fn response_body_is_json() {
        let res = ProxyError::BadPayload("not json".into()).to_response();
        assert_eq!(res.status_code, 400);
        let body: serde_json::Value =
            serde_json::from_slice(res.payload.as_deref().unwrap()).unwrap();
        assert_eq!(body["error"]["code"], "bad_payload");
        assert_eq!(body["error"]["message"], "bad payload: not json");
        assert_eq!(res.headers.last("content-type"), Some("application/json"));
    }

    #[test]
    fn panic_payloads_become_faults() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert!(matches!(CallError::from_panic(payload.as_ref()), CallError::Fault(m) if m == "boom"));
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert!(matches!(CallError::from_panic(payload.as_ref()), CallError::Fault(m) if m == "bang"));
    }

    #[test]
    fn mismatch_messages_name_position_and_kinds() {
        let reason = MismatchReason::KindMismatch {
            list: "argument",
            position: 1,
            expected: Kind::Int,
            found: Kind::String,
        };
        assert_eq!(
            reason.to_string(),
            "arguments mismatch in position 1: int vs string"
        );
    }
}
