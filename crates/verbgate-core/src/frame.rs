//! Streamed frames.
//!
//! A stream opens with an [`StreamedFrame::Init`] frame carrying the routing
//! key, followed by raw payload frames. Transports without a native
//! half-close (such as WebSocket text frames) signal "done sending" with the
//! literal [`EOF_SENTINEL`], which adapters must strip rather than forward.

use bytes::Bytes;

use crate::envelope::MultiMap;
use crate::verb::Verb;

/// Text payload used as the end-of-stream marker on transports that lack a
/// half-close signal.
pub const EOF_SENTINEL: &str = "EOF";

/// Routing information carried by the first frame of a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingInfo {
    /// Routing verb.
    pub verb: Verb,
    /// Procedure name.
    pub procedure: String,
    /// Headers of the opening request.
    pub headers: MultiMap,
}

impl RoutingInfo {
    /// Routing info with no headers.
    #[must_use]
    pub fn new(verb: Verb, procedure: impl Into<String>) -> Self {
        Self {
            verb,
            procedure: procedure.into(),
            headers: MultiMap::new(),
        }
    }
}

/// One frame on a transport stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamedFrame {
    /// Opens the stream.
    Init(RoutingInfo),
    /// A payload.
    Data(Bytes),
}

impl StreamedFrame {
    /// Shorthand for a data frame.
    #[must_use]
    pub fn data(payload: impl Into<Bytes>) -> Self {
        Self::Data(payload.into())
    }
}

/// Returns true if `payload` is exactly the end-of-stream sentinel.
#[must_use]
pub fn is_eof_sentinel(payload: &[u8]) -> bool {
    payload == EOF_SENTINEL.as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_matches_exactly() {
        assert!(is_eof_sentinel(b"EOF"));
        assert!(!is_eof_sentinel(b"eof"));
        assert!(!is_eof_sentinel(b"EOF\n"));
        assert!(!is_eof_sentinel(b"\"EOF\""));
    }
}
