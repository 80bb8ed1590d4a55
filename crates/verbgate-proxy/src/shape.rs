//! Call-shape classification.
//!
//! The shape of a procedure is decided from the backend's own signature,
//! never from the exposed interface. Patterns are checked in a fixed
//! precedence; the first match wins.

use std::fmt;

use serde::Serialize;

use crate::signature::MethodSignature;

/// The structural call pattern of a procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallShape {
    /// One request, one response.
    Unary,
    /// Many requests, one response.
    ClientStream,
    /// One request, many responses.
    ServerStream,
    /// Many requests and many responses, in any order.
    BidiStream,
}

impl CallShape {
    /// Snake-case name used in logs and errors.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unary => "unary",
            Self::ClientStream => "client_stream",
            Self::ServerStream => "server_stream",
            Self::BidiStream => "bidi_stream",
        }
    }

    /// Returns true for the three streaming shapes.
    #[must_use]
    pub const fn is_streaming(self) -> bool {
        !matches!(self, Self::Unary)
    }
}

impl fmt::Display for CallShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classify a backend method signature.
///
/// Returns `None` when the signature matches no supported pattern,
/// including signatures that are too short to inspect.
#[must_use]
pub fn classify(signature: &MethodSignature) -> Option<CallShape> {
    let params = &signature.params;
    let returns = &signature.returns;

    if !params.first()?.is_struct_ptr() {
        return None;
    }
    let first = params.get(1)?;

    if first.is_context() {
        let matches = params.len() == 3
            && params[2].is_struct_ptr()
            && returns.len() == 2
            && returns[0].is_struct_ptr()
            && returns[1].is_error();
        return matches.then_some(CallShape::Unary);
    }

    if first.is_struct_ptr() {
        let matches = params.len() == 3
            && params[2].is_out_stream()
            && returns.len() == 1
            && returns[0].is_error();
        return matches.then_some(CallShape::ServerStream);
    }

    if first.is_in_stream() && params.len() == 2 && returns.len() == 1 && returns[0].is_error() {
        if first.has_send_and_close() {
            return Some(CallShape::ClientStream);
        }
        if first.is_out_stream() {
            return Some(CallShape::BidiStream);
        }
    }

    None
}
