//! Wallet provider trait: the injected wallet capability
//!
//! All backends (in-memory simulated chain, JSON-RPC node, etc.) implement
//! `WalletProvider` to offer account authorization, transaction submission,
//! confirmation, and read-only contract calls through one uniform API.

use crate::abi::ContractCall;
use crate::error::Result;
use crate::types::{TransactionReceipt, TransactionRequest, TxHash};
use alloy_primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use std::sync::Arc;

pub mod memory;
pub mod rpc;

/// Core trait for wallet backends
///
/// Implementations own account custody and signing. The orchestrator never
/// sees keys: it hands a [`TransactionRequest`] to the provider and waits
/// for the receipt.
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Prompt the wallet for account authorization
    async fn request_accounts(&self) -> Result<Vec<Address>>;

    /// Accounts already authorized, without prompting
    async fn accounts(&self) -> Result<Vec<Address>>;

    /// Chain identifier of the connected network
    async fn chain_id(&self) -> Result<u64>;

    /// Sign and submit a transaction, returning its hash
    async fn send_transaction(&self, tx: TransactionRequest) -> Result<TxHash>;

    /// Wait until the transaction is included
    ///
    /// There is no built-in deadline: a provider that never answers keeps
    /// the caller waiting. Callers that need a bound wrap this in a timeout.
    async fn wait_for_confirmation(&self, tx: TxHash) -> Result<TransactionReceipt>;

    /// Execute a read-only call, returning the raw ABI-encoded result
    async fn call(&self, to: Address, call: &ContractCall) -> Result<Bytes>;

    /// Provider name (e.g., "memory", "rpc")
    fn name(&self) -> &str;

    /// Health check, true if the provider answers
    ///
    /// Default implementation delegates to `chain_id()`.
    async fn health(&self) -> Result<bool> {
        self.chain_id().await.map(|_| true)
    }
}

/// Signing handle bound to the active account
#[derive(Clone)]
pub struct Signer {
    account: Address,
    provider: Arc<dyn WalletProvider>,
}

impl Signer {
    pub fn new(provider: Arc<dyn WalletProvider>, account: Address) -> Self {
        Self { account, provider }
    }

    /// The account this signer sends from
    pub fn address(&self) -> Address {
        self.account
    }

    pub fn provider(&self) -> &Arc<dyn WalletProvider> {
        &self.provider
    }

    /// Submit a transaction from the bound account
    pub async fn send_transaction(&self, tx: TransactionRequest) -> Result<TxHash> {
        let tx = tx.with_from(self.account);
        tracing::debug!(
            from = %self.account,
            to = ?tx.to,
            value = %tx.value,
            method = tx.describe(),
            "Submitting transaction"
        );
        self.provider.send_transaction(tx).await
    }

    /// Plain value send, no contract call
    pub async fn send_value(&self, to: Address, value: U256) -> Result<TxHash> {
        self.send_transaction(TransactionRequest::transfer(to, value))
            .await
    }

    /// Contract call with optional attached value
    pub async fn send_call(&self, to: Address, call: ContractCall, value: U256) -> Result<TxHash> {
        self.send_transaction(TransactionRequest::call(to, call).with_value(value))
            .await
    }
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("account", &self.account)
            .field("provider", &self.provider.name())
            .finish()
    }
}
