//! Dispatch engine for verbgate.
//!
//! This crate turns transport requests into calls against an in-process RPC
//! backend. It validates an exposed interface against the backend once at
//! startup, builds an immutable routing catalogue, and then serves requests
//! through one executor per call shape.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Transport adapter (HTTP / WS)               │
//! └─────────────────────────────────────────────────────────────┘
//!                 │ RequestEnvelope        │ StreamedFrame
//!                 ▼                        ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                           Proxy                             │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────────┐    │
//! │  │  Catalogue  │ │   Unary     │ │  Server / Client /  │    │
//! │  │  (verb,     │ │  executor   │ │  Bidi executors     │    │
//! │  │  procedure) │ │             │ │  + stream bridge    │    │
//! │  └─────────────┘ └─────────────┘ └─────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                Backend (registered procedures)              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```
//! use serde::{Deserialize, Serialize};
//! use verbgate_core::{RequestEnvelope, Verb};
//! use verbgate_proxy::{Backend, CallContext, ExposedInterface, Proxy};
//!
//! #[derive(Default, Serialize, Deserialize)]
//! struct Numbers { a: i64, b: i64 }
//!
//! #[derive(Default, Serialize, Deserialize)]
//! struct Sum { total: i64 }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = Backend::builder("Calc")
//!     .unary("Add", |_ctx, req: Numbers| async move {
//!         Ok::<_, tonic::Status>(Sum { total: req.a + req.b })
//!     })
//!     .build();
//! let api = ExposedInterface::builder("CalcApi")
//!     .unary::<Numbers, Sum>("PostAdd")
//!     .build();
//! let proxy = Proxy::builder().backend(backend).interface(api).build()?;
//!
//! let request = RequestEnvelope::new(Verb::Post, "Add").with_payload(r#"{"a": 1, "b": 2}"#);
//! let response = proxy.proxy_unary(CallContext::new(), request).await;
//! assert_eq!(response.status_code, 200);
//! # Ok(())
//! # }
//! ```
//!
//! # Call shapes
//!
//! - `Unary`: one request envelope, one response envelope
//! - `ServerStream`: one request frame, many response frames
//! - `ClientStream`: many request frames, one response frame
//! - `BidiStream`: both directions concurrently, via [`bridge`]

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod backend;
pub mod bridge;
pub mod catalogue;
pub mod codec;
pub mod config;
pub mod context;
pub mod error;
pub mod payload;
pub mod service;
pub mod shape;
pub mod signature;
mod stream;
pub mod transport;
pub mod typed;
pub mod validate;

pub use backend::{
    Backend, BackendBuilder, BidiCall, BidiStreamHandler, ClientStreamCall, ClientStreamHandler,
    ExposedInterface, Handler, InterfaceBuilder, MessageSink, MessageSource, MethodDescriptor,
    Procedure, ServerStreamHandler, UnaryHandler,
};
pub use catalogue::{Catalogue, MethodBinding};
pub use config::ProxyConfig;
pub use context::{CallContext, CancelHandle, Cancellation};
pub use error::{CallError, MismatchReason, ProxyError, Result, SetupError, TransportError};
pub use payload::merge_payload;
pub use service::{ExceptionHandler, Proxy, ProxyBuilder};
pub use shape::{classify, CallShape};
pub use signature::{Kind, MethodSignature, MethodSpec, TypeRef};
pub use transport::{frame_channel, FrameChannel, FrameSink, FrameSource};
pub use typed::{RequestStream, ResponseSink};

// Re-export the shared envelope types for convenience
pub use verbgate_core::{MultiMap, RequestEnvelope, ResponseEnvelope, RoutingInfo, StreamedFrame, Verb};
