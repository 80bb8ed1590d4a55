//! Common error types for verbgate.

use thiserror::Error;

/// A result type using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors raised while parsing core routing types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// The string is not one of the nine recognized HTTP verbs.
    #[error("unknown HTTP method: {0}")]
    InvalidVerb(String),
}
