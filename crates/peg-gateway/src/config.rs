//! Gateway configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// REST API root.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Chain path segment, e.g. `polygon`.
    #[serde(default = "default_chain")]
    pub chain: String,
    /// JSON-RPC endpoint. Empty means `{base_url}/{chain}/web3/{api_key}`.
    #[serde(default)]
    pub rpc_url: String,
    /// Chain code used when registering address monitoring webhooks.
    #[serde(default = "default_monitoring_chain")]
    pub monitoring_chain: String,
    /// Filled from the environment.
    #[serde(skip)]
    pub api_key: Option<String>,
    #[serde(default = "default_min_spacing_ms")]
    pub min_spacing_ms: u64,
    #[serde(default)]
    pub retry: RetryPolicy,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.tatum.io/v3".to_string()
}

fn default_chain() -> String {
    "polygon".to_string()
}

fn default_monitoring_chain() -> String {
    "MATIC".to_string()
}

fn default_min_spacing_ms() -> u64 {
    200
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            chain: default_chain(),
            rpc_url: String::new(),
            monitoring_chain: default_monitoring_chain(),
            api_key: None,
            min_spacing_ms: default_min_spacing_ms(),
            retry: RetryPolicy::default(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl GatewayConfig {
    pub fn min_spacing(&self) -> Duration {
        Duration::from_millis(self.min_spacing_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Endpoint path relative to `base_url`.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.chain, path)
    }

    pub fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), endpoint)
    }

    pub fn resolved_rpc_url(&self) -> String {
        if !self.rpc_url.is_empty() {
            return self.rpc_url.clone();
        }
        let key = self.api_key.as_deref().unwrap_or_default();
        self.url(&self.endpoint(&format!("web3/{key}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.min_spacing(), Duration::from_millis(200));
        assert_eq!(config.retry.attempts, 5);
        assert_eq!(config.url(&config.endpoint("gas")), "https://api.tatum.io/v3/polygon/gas");
    }

    #[test]
    fn test_rpc_url_derivation() {
        let mut config = GatewayConfig {
            api_key: Some("k".to_string()),
            ..Default::default()
        };
        assert_eq!(config.resolved_rpc_url(), "https://api.tatum.io/v3/polygon/web3/k");

        config.rpc_url = "http://localhost:8545".to_string();
        assert_eq!(config.resolved_rpc_url(), "http://localhost:8545");
    }
}
