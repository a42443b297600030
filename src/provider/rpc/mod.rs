//! Ethereum JSON-RPC wallet provider
//!
//! Implements `WalletProvider` against a node that manages its own
//! accounts (e.g. a local development node): the node signs
//! `eth_sendTransaction` requests on behalf of its unlocked accounts.

mod client;
mod config;

pub use client::{parse_quantity, RpcClient, RpcFailure};
pub use config::RpcConfig;

use crate::abi::ContractCall;
use crate::error::{Result, WalletError};
use crate::provider::WalletProvider;
use crate::types::{Log, TransactionReceipt, TransactionRequest, TxHash};
use alloy_primitives::{Address, Bytes, B256};
use async_trait::async_trait;
use serde::Deserialize;

/// Receipt as returned by `eth_getTransactionReceipt`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    transaction_hash: B256,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    block_number: Option<String>,
    #[serde(default)]
    contract_address: Option<Address>,
    #[serde(default)]
    logs: Vec<Log>,
}

impl TryFrom<RawReceipt> for TransactionReceipt {
    type Error = WalletError;

    fn try_from(raw: RawReceipt) -> Result<Self> {
        // pre-Byzantium receipts carry no status; treat them as successful
        let success = match raw.status.as_deref() {
            None => true,
            Some(status) => parse_quantity(status).map(|s| s == 1).ok_or_else(|| {
                WalletError::Decode(format!(
                    "receipt {} has malformed status {:?}",
                    raw.transaction_hash, status
                ))
            })?,
        };
        Ok(Self {
            transaction_hash: raw.transaction_hash,
            success,
            block_number: raw.block_number.as_deref().and_then(parse_quantity),
            contract_address: raw.contract_address,
            logs: raw.logs,
        })
    }
}

fn hex_data(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Build the `eth_sendTransaction` parameter object
fn transaction_params(tx: &TransactionRequest) -> serde_json::Value {
    let mut params = serde_json::Map::new();
    if let Some(from) = tx.from {
        params.insert("from".into(), serde_json::Value::String(from.to_string()));
    }
    if let Some(to) = tx.to {
        params.insert("to".into(), serde_json::Value::String(to.to_string()));
    }
    params.insert(
        "value".into(),
        serde_json::Value::String(format!("{:#x}", tx.value)),
    );
    let data = tx.data();
    if !data.is_empty() {
        params.insert("data".into(), serde_json::Value::String(hex_data(&data)));
    }
    serde_json::Value::Object(params)
}

/// JSON-RPC wallet provider
pub struct RpcProvider {
    client: RpcClient,
}

impl RpcProvider {
    pub fn new(config: RpcConfig) -> Result<Self> {
        let client = RpcClient::new(config)
            .map_err(|e| WalletError::Config(format!("Failed to build RPC client: {}", e)))?;
        Ok(Self { client })
    }

    /// Build a provider and verify the endpoint answers
    pub async fn connect(config: RpcConfig) -> Result<Self> {
        let provider = Self::new(config)?;
        let chain_id = provider.chain_id().await?;
        tracing::info!(url = %provider.client.config().url, chain_id, "Connected to JSON-RPC endpoint");
        Ok(provider)
    }

    pub fn client(&self) -> &RpcClient {
        &self.client
    }
}

#[async_trait]
impl WalletProvider for RpcProvider {
    async fn request_accounts(&self) -> Result<Vec<Address>> {
        let requested: std::result::Result<Vec<Address>, RpcFailure> = self
            .client
            .request("eth_requestAccounts", serde_json::json!([]))
            .await;

        match requested {
            Ok(accounts) => Ok(accounts),
            // plain nodes don't prompt; their accounts are authorized already
            Err(failure) if failure.is_method_not_found() => self
                .client
                .request("eth_accounts", serde_json::json!([]))
                .await
                .map_err(|e| WalletError::ConnectionFailed(e.to_string())),
            Err(failure) => Err(WalletError::ConnectionFailed(failure.to_string())),
        }
    }

    async fn accounts(&self) -> Result<Vec<Address>> {
        self.client
            .request("eth_accounts", serde_json::json!([]))
            .await
            .map_err(|e| WalletError::QueryFailed(e.to_string()))
    }

    async fn chain_id(&self) -> Result<u64> {
        let raw: String = self
            .client
            .request("eth_chainId", serde_json::json!([]))
            .await
            .map_err(|e| WalletError::QueryFailed(e.to_string()))?;
        parse_quantity(&raw)
            .ok_or_else(|| WalletError::Decode(format!("invalid chain id '{}'", raw)))
    }

    async fn send_transaction(&self, tx: TransactionRequest) -> Result<TxHash> {
        let params = transaction_params(&tx);
        let hash: TxHash = self
            .client
            .request("eth_sendTransaction", serde_json::json!([params]))
            .await
            .map_err(|e| WalletError::TransactionFailed(e.to_string()))?;

        tracing::debug!(tx = %hash, method = tx.describe(), "Transaction submitted");
        Ok(hash)
    }

    async fn wait_for_confirmation(&self, tx: TxHash) -> Result<TransactionReceipt> {
        let interval = self.client.config().poll_interval();
        loop {
            let receipt: Option<RawReceipt> = self
                .client
                .request("eth_getTransactionReceipt", serde_json::json!([tx]))
                .await
                .map_err(|e| WalletError::TransactionFailed(e.to_string()))?;

            if let Some(raw) = receipt {
                let receipt = TransactionReceipt::try_from(raw)?;
                tracing::debug!(
                    tx = %tx,
                    block = ?receipt.block_number,
                    success = receipt.success,
                    "Transaction confirmed"
                );
                return Ok(receipt);
            }
            tokio::time::sleep(interval).await;
        }
    }

    async fn call(&self, to: Address, call: &ContractCall) -> Result<Bytes> {
        let params = serde_json::json!([
            { "to": to.to_string(), "data": hex_data(&call.encode()) },
            "latest"
        ]);
        self.client
            .request("eth_call", params)
            .await
            .map_err(|e| WalletError::QueryFailed(e.to_string()))
    }

    fn name(&self) -> &str {
        "rpc"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;

    #[test]
    fn test_transaction_params_transfer() {
        let tx = TransactionRequest::transfer(Address::repeat_byte(0x11), U256::from(255u64))
            .with_from(Address::repeat_byte(0x22));
        let params = transaction_params(&tx);

        assert_eq!(params["value"], "0xff");
        assert!(params.get("data").is_none());
        assert!(params["to"].as_str().unwrap().starts_with("0x"));
        assert!(params["from"].as_str().unwrap().starts_with("0x"));
    }

    #[test]
    fn test_transaction_params_create() {
        let tx = TransactionRequest::create(Bytes::from(vec![0x60, 0x80]));
        let params = transaction_params(&tx);

        assert!(params.get("to").is_none());
        assert_eq!(params["data"], "0x6080");
        assert_eq!(params["value"], "0x0");
    }

    #[test]
    fn test_raw_receipt_conversion() {
        let json = r#"{
            "transactionHash": "0x0101010101010101010101010101010101010101010101010101010101010101",
            "status": "0x0",
            "blockNumber": "0x2a",
            "contractAddress": null,
            "logs": []
        }"#;
        let raw: RawReceipt = serde_json::from_str(json).unwrap();
        let receipt = TransactionReceipt::try_from(raw).unwrap();

        assert!(!receipt.success);
        assert_eq!(receipt.block_number, Some(42));
        assert!(receipt.contract_address.is_none());
    }

    #[test]
    fn test_receipt_with_contract_address() {
        let json = r#"{
            "transactionHash": "0x0101010101010101010101010101010101010101010101010101010101010101",
            "status": "0x1",
            "contractAddress": "0x5fbdb2315678afecb367f032d93f642f64180aa3"
        }"#;
        let receipt =
            TransactionReceipt::try_from(serde_json::from_str::<RawReceipt>(json).unwrap()).unwrap();
        assert!(receipt.success);
        assert!(receipt.contract_address.is_some());
        assert!(receipt.logs.is_empty());
    }

    #[test]
    fn test_receipt_status_parsing() {
        let receipt = |status: &str| {
            let json = format!(
                r#"{{
                    "transactionHash": "0x0101010101010101010101010101010101010101010101010101010101010101",
                    {status}
                    "logs": []
                }}"#
            );
            TransactionReceipt::try_from(serde_json::from_str::<RawReceipt>(&json).unwrap())
        };

        // a missing status predates Byzantium and counts as success
        assert!(receipt("").unwrap().success);
        assert!(receipt(r#""status": "0x1","#).unwrap().success);

        let err = receipt(r#""status": "success","#).unwrap_err();
        assert!(matches!(err, WalletError::Decode(_)));
        assert!(err.to_string().contains("malformed status"));
    }
}
