//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;

use axum::routing::{any, get};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{health, unary, ws};
use crate::state::GatewayState;

/// Create the gateway router with all routes and middleware.
///
/// # Routes
///
/// - `GET /health` - Health check
/// - `ANY {api_prefix}/:procedure` - Unary call; the HTTP method is the verb
/// - `GET {stream_prefix}/:procedure` - WebSocket stream; `?verb=` selects
///   the verb (default `GET`)
///
/// Unary calls get the body limit and request timeout. Streams are bounded
/// by the stream timeout instead.
pub fn create_router(state: GatewayState) -> Router {
    let cors = build_cors_layer(&state.config.cors_origins);
    let api_path = format!("{}/:procedure", state.config.api_prefix.trim_end_matches('/'));
    let stream_path = format!("{}/:procedure", state.config.stream_prefix.trim_end_matches('/'));

    let api = Router::new().route(&api_path, any(unary::unary_handler)).layer(
        ServiceBuilder::new()
            .layer(RequestBodyLimitLayer::new(state.config.max_body_bytes))
            .layer(TimeoutLayer::new(state.config.request_timeout())),
    );

    let state = Arc::new(state);

    Router::new()
        .route("/health", get(health::health))
        .route(&stream_path, get(ws::stream_handler))
        .merge(api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
