//! Gateway configuration types.
//!
//! This module defines configuration structures for the HTTP/WebSocket gateway.

use std::time::Duration;

use serde::Deserialize;

use verbgate_proxy::ProxyConfig;

/// Configuration for the gateway service.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Listen address (e.g., "0.0.0.0:8080").
    #[serde(default = "GatewayConfig::default_listen_addr")]
    pub listen_addr: String,

    /// Allowed CORS origins.
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    #[serde(default = "GatewayConfig::default_max_body")]
    pub max_body_bytes: usize,

    /// Unary request timeout in seconds.
    #[serde(default = "GatewayConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Lifetime of a single stream in seconds.
    #[serde(default = "GatewayConfig::default_stream_timeout")]
    pub stream_timeout_seconds: u64,

    /// Path prefix for unary calls.
    #[serde(default = "GatewayConfig::default_api_prefix")]
    pub api_prefix: String,

    /// Path prefix for WebSocket streams.
    #[serde(default = "GatewayConfig::default_stream_prefix")]
    pub stream_prefix: String,

    /// Dispatch engine settings.
    #[serde(default)]
    pub proxy: ProxyConfig,
}

impl GatewayConfig {
    fn default_listen_addr() -> String {
        "0.0.0.0:8080".to_string()
    }

    const fn default_max_body() -> usize {
        4 * 1024 * 1024 // 4 MB
    }

    const fn default_request_timeout() -> u64 {
        30
    }

    const fn default_stream_timeout() -> u64 {
        3600 // 1 hour
    }

    fn default_api_prefix() -> String {
        "/api".to_string()
    }

    fn default_stream_prefix() -> String {
        "/stream".to_string()
    }

    /// Get the request timeout as a `Duration`.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Get the stream timeout as a `Duration`.
    #[must_use]
    pub fn stream_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_timeout_seconds)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_addr: Self::default_listen_addr(),
            cors_origins: vec!["*".to_string()],
            max_body_bytes: Self::default_max_body(),
            request_timeout_seconds: Self::default_request_timeout(),
            stream_timeout_seconds: Self::default_stream_timeout(),
            api_prefix: Self::default_api_prefix(),
            stream_prefix: Self::default_stream_prefix(),
            proxy: ProxyConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.api_prefix, "/api");
        assert_eq!(config.stream_prefix, "/stream");
        assert_eq!(config.max_body_bytes, 4 * 1024 * 1024);
        assert!(config.proxy.forward_metadata);
    }

    #[test]
    fn timeout_durations() {
        let config = GatewayConfig::default();
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.stream_timeout(), Duration::from_secs(3600));
    }

    #[test]
    fn partial_config_takes_defaults() {
        let config: GatewayConfig = serde_json::from_str(
            r#"{"stream_timeout_seconds": 5, "proxy": {"forward_metadata": false}}"#,
        )
        .unwrap();
        assert_eq!(config.stream_timeout(), Duration::from_secs(5));
        assert!(!config.proxy.forward_metadata);
        assert_eq!(config.proxy.request_id_header, "x-request-id");
        assert_eq!(config.api_prefix, "/api");
    }
}
