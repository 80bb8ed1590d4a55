//! Configuration for the dispatch engine.

use serde::{Deserialize, Serialize};

/// Configuration for [`crate::Proxy`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Copy inbound headers into the outbound call metadata.
    #[serde(default = "ProxyConfig::default_forward_metadata")]
    pub forward_metadata: bool,
    /// Header carrying the correlation id. A request without one gets a
    /// fresh id.
    #[serde(default = "ProxyConfig::default_request_id_header")]
    pub request_id_header: String,
}

impl ProxyConfig {
    const fn default_forward_metadata() -> bool {
        true
    }

    fn default_request_id_header() -> String {
        "x-request-id".to_string()
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            forward_metadata: Self::default_forward_metadata(),
            request_id_header: Self::default_request_id_header(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proxy_config_defaults() {
        let config = ProxyConfig::default();
        assert!(config.forward_metadata);
        assert_eq!(config.request_id_header, "x-request-id");
    }

    #[test]
    fn missing_fields_take_defaults() {
        let config: ProxyConfig = serde_json::from_str(r#"{"forward_metadata": false}"#).unwrap();
        assert!(!config.forward_metadata);
        assert_eq!(config.request_id_header, "x-request-id");
    }
}
