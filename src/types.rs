//! Core transaction and operation types
//!
//! Wire-facing types use camelCase JSON serialization, matching the
//! Ethereum JSON-RPC field names.

use crate::abi::ContractCall;
use alloy_primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

/// Transaction hash
pub type TxHash = B256;

/// Payload of a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxInput {
    /// Plain value transfer, no calldata
    Transfer,
    /// Contract method call
    Call(ContractCall),
    /// Contract creation from init bytecode
    Create(Bytes),
}

/// A transaction to be signed and submitted by the wallet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRequest {
    /// Sender; filled in by the signer when absent
    pub from: Option<Address>,
    /// Recipient; `None` only for contract creation
    pub to: Option<Address>,
    /// Attached native value in wei
    pub value: U256,
    pub input: TxInput,
}

impl TransactionRequest {
    /// Plain value transfer to `to`
    pub fn transfer(to: Address, value: U256) -> Self {
        Self {
            from: None,
            to: Some(to),
            value,
            input: TxInput::Transfer,
        }
    }

    /// Contract call without attached value
    pub fn call(to: Address, call: ContractCall) -> Self {
        Self {
            from: None,
            to: Some(to),
            value: U256::ZERO,
            input: TxInput::Call(call),
        }
    }

    /// Contract creation
    pub fn create(bytecode: Bytes) -> Self {
        Self {
            from: None,
            to: None,
            value: U256::ZERO,
            input: TxInput::Create(bytecode),
        }
    }

    pub fn with_value(mut self, value: U256) -> Self {
        self.value = value;
        self
    }

    pub fn with_from(mut self, from: Address) -> Self {
        self.from = Some(from);
        self
    }

    /// Raw calldata as sent on the wire
    pub fn data(&self) -> Bytes {
        match &self.input {
            TxInput::Transfer => Bytes::new(),
            TxInput::Call(call) => call.encode(),
            TxInput::Create(code) => code.clone(),
        }
    }

    /// Short description for logs
    pub fn describe(&self) -> &'static str {
        match &self.input {
            TxInput::Transfer => "transfer",
            TxInput::Call(call) => call.method(),
            TxInput::Create(_) => "create",
        }
    }
}

/// An event log entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Log {
    /// Emitting contract
    pub address: Address,
    pub topics: Vec<B256>,
    #[serde(default)]
    pub data: Bytes,
}

/// Outcome of a confirmed transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionReceipt {
    pub transaction_hash: TxHash,
    /// False when execution reverted
    pub success: bool,
    pub block_number: Option<u64>,
    /// Set for contract-creation transactions
    pub contract_address: Option<Address>,
    pub logs: Vec<Log>,
}

/// User-triggerable operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Connect,
    DeployAgent,
    RefreshBalance,
    Deposit,
    PayForApi,
    SendTo,
    RunDecision,
}

/// Step chained after an operation succeeds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostAction {
    None,
    /// Re-read the agent balance so the displayed value never goes stale
    RefreshBalance,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::DeployAgent => "deploy_agent",
            Self::RefreshBalance => "refresh_balance",
            Self::Deposit => "deposit",
            Self::PayForApi => "pay_for_api",
            Self::SendTo => "send_to",
            Self::RunDecision => "run_decision",
        }
    }

    /// Prefix of the error message recorded when this action fails
    pub fn failure_prefix(&self) -> &'static str {
        match self {
            Self::Connect => "Failed to connect wallet",
            Self::DeployAgent => "Failed to deploy agent",
            Self::RefreshBalance => "Failed to fetch balance",
            Self::Deposit => "Deposit failed",
            Self::PayForApi => "API payment failed",
            Self::SendTo => "Send failed",
            Self::RunDecision => "AI action failed",
        }
    }

    /// Every chain mutation ends with a balance refresh
    pub fn post_action(&self) -> PostAction {
        match self {
            Self::DeployAgent | Self::Deposit | Self::PayForApi | Self::SendTo => {
                PostAction::RefreshBalance
            }
            Self::Connect | Self::RefreshBalance | Self::RunDecision => PostAction::None,
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
