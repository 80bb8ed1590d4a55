//! Core types for verbgate.
//!
//! This crate provides the leaf types shared by the dispatch engine and the
//! transport adapters:
//!
//! - **Verbs**: the nine routing verbs and the exposed-name parser
//! - **Status translation**: the fixed RPC status to HTTP status table
//! - **Envelopes**: canonical request/response values
//! - **Frames**: stream framing and the end-of-stream sentinel
//!
//! # Example
//!
//! ```
//! use verbgate_core::{parse_exposed_name, http_status_for, Verb};
//!
//! assert_eq!(parse_exposed_name("PostUploadPhoto"), Some((Verb::Post, "UploadPhoto")));
//! assert_eq!(http_status_for(tonic::Code::NotFound), 404);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod envelope;
pub mod error;
pub mod frame;
pub mod status;
pub mod verb;

pub use envelope::{MultiMap, RequestEnvelope, ResponseEnvelope};
pub use error::{CoreError, Result};
pub use frame::{is_eof_sentinel, RoutingInfo, StreamedFrame, EOF_SENTINEL};
pub use status::{http_status_for, http_status_for_code, UNRECOGNIZED_STATUS};
pub use verb::{parse_exposed_name, Verb};
