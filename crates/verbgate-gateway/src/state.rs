//! Gateway application state.
//!
//! This module defines the shared state that is available to all request handlers.

use verbgate_proxy::Proxy;

use crate::config::GatewayConfig;

/// Shared application state for the gateway.
#[derive(Debug, Clone)]
pub struct GatewayState {
    /// The dispatch engine.
    pub proxy: Proxy,
    /// Gateway configuration.
    pub config: GatewayConfig,
}

impl GatewayState {
    /// Create a new gateway state.
    #[must_use]
    pub const fn new(proxy: Proxy, config: GatewayConfig) -> Self {
        Self { proxy, config }
    }
}
