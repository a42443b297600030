//! JSON-RPC client: request/response plumbing over HTTP

use super::config::RpcConfig;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// JSON-RPC "method not found"
pub const METHOD_NOT_FOUND: i64 = -32601;

/// Failure of a single JSON-RPC round trip
///
/// Kept separate from `WalletError` so each call site can map it to the
/// right taxonomy kind (connection, transaction, or query).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcFailure {
    /// HTTP/transport failure
    #[error("transport error: {0}")]
    Transport(String),
    /// The node answered with a JSON-RPC error object
    #[error("{message} (code {code})")]
    Rpc { code: i64, message: String },
    /// The response did not have the expected shape
    #[error("malformed response: {0}")]
    Decode(String),
}

impl RpcFailure {
    pub fn is_method_not_found(&self) -> bool {
        matches!(self, Self::Rpc { code, .. } if *code == METHOD_NOT_FOUND)
    }
}

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

/// Low-level JSON-RPC client
pub struct RpcClient {
    http: reqwest::Client,
    config: Arc<RpcConfig>,
    next_id: AtomicU64,
}

impl RpcClient {
    /// Build a client; no request is made until the first call
    pub fn new(config: RpcConfig) -> std::result::Result<Self, RpcFailure> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| RpcFailure::Transport(e.to_string()))?;
        Ok(Self {
            http,
            config: Arc::new(config),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    /// Issue one request and deserialize its `result`
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> std::result::Result<T, RpcFailure> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        tracing::trace!(id, method, "JSON-RPC request");

        let response = self
            .http
            .post(&self.config.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| RpcFailure::Transport(format!("{}: {}", self.config.url, e)))?;

        let status = response.status();
        let parsed: RpcResponse = response.json().await.map_err(|e| {
            RpcFailure::Decode(format!("HTTP {} from {}: {}", status, self.config.url, e))
        })?;

        if let Some(err) = parsed.error {
            tracing::debug!(id, method, code = err.code, message = %err.message, "JSON-RPC error");
            return Err(RpcFailure::Rpc {
                code: err.code,
                message: err.message,
            });
        }

        let result = parsed.result.unwrap_or(serde_json::Value::Null);
        serde_json::from_value(result)
            .map_err(|e| RpcFailure::Decode(format!("{} result: {}", method, e)))
    }
}

/// Parse a hex quantity (`"0x1b4"`)
pub fn parse_quantity(raw: &str) -> Option<u64> {
    let digits = raw.strip_prefix("0x")?;
    if digits.is_empty() {
        return Some(0);
    }
    u64::from_str_radix(digits, 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x0"), Some(0));
        assert_eq!(parse_quantity("0x1b4"), Some(436));
        assert_eq!(parse_quantity("0x"), Some(0));
        assert_eq!(parse_quantity("1b4"), None);
        assert_eq!(parse_quantity("0xzz"), None);
    }

    #[test]
    fn test_failure_display() {
        let failure = RpcFailure::Rpc {
            code: -32000,
            message: "insufficient funds".into(),
        };
        assert_eq!(failure.to_string(), "insufficient funds (code -32000)");
        assert!(!failure.is_method_not_found());
        assert!(RpcFailure::Rpc {
            code: METHOD_NOT_FOUND,
            message: "nope".into()
        }
        .is_method_not_found());
    }

    #[test]
    fn test_failure_is_std_error() {
        let boxed: Box<dyn std::error::Error + Send + Sync> =
            Box::new(RpcFailure::Transport("connection refused".into()));
        assert_eq!(boxed.to_string(), "transport error: connection refused");

        let decode = RpcFailure::Decode("missing result".into());
        assert_eq!(decode.to_string(), "malformed response: missing result");
    }

    #[test]
    fn test_response_shapes() {
        let ok: RpcResponse =
            serde_json::from_str(r#"{"jsonrpc":"2.0","id":1,"result":"0x1"}"#).unwrap();
        assert!(ok.error.is_none());
        assert_eq!(ok.result.unwrap(), "0x1");

        let err: RpcResponse = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"not found"}}"#,
        )
        .unwrap();
        assert_eq!(err.error.unwrap().code, METHOD_NOT_FOUND);
    }
}
