//! JSON-RPC provider configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection settings for an Ethereum JSON-RPC endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcConfig {
    /// Endpoint URL (e.g., a local development node)
    #[serde(default = "default_url")]
    pub url: String,

    /// Delay between receipt polls while waiting for confirmation
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Per-request HTTP timeout
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            poll_interval_ms: default_poll_interval_ms(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl RpcConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn default_url() -> String {
    "http://127.0.0.1:8545".to_string()
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_request_timeout_secs() -> u64 {
    30
}
