//! HTTP and WebSocket gateway for verbgate.
//!
//! This crate puts the dispatch engine behind axum:
//!
//! - Unary calls over plain HTTP, with the method as the routing verb
//! - Streaming calls over WebSocket, one socket per stream
//! - CORS, body limits, timeouts and request tracing via tower-http
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Clients                              │
//! │                   (HTTP / WebSocket)                        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    verbgate-gateway                         │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────────┐    │
//! │  │   Router    │ │   Unary     │ │    WebSocket        │    │
//! │  │ + Middleware│ │   Handler   │ │    Frame adapter    │    │
//! │  └─────────────┘ └─────────────┘ └─────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//!                  ┌───────────────────────┐
//!                  │  verbgate-proxy Proxy │
//!                  └───────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use verbgate_gateway::{create_router, demo, GatewayConfig, GatewayState};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = GatewayConfig::default();
//! let proxy = demo::proxy(config.proxy.clone())?;
//! let app = create_router(GatewayState::new(proxy, config));
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod demo;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::GatewayConfig;
pub use error::ApiError;
pub use routes::create_router;
pub use state::GatewayState;
