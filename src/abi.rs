//! Factory and agent contract interfaces
//!
//! Calls are modeled as a typed [`ContractCall`] enum. Each call knows its
//! Solidity signature, its 4-byte selector, and how to ABI-encode its
//! arguments. Only the handful of static/dynamic types the two contracts
//! use are supported: `address`, `uint256`, `string`, and `address[]`.

use crate::error::{Result, WalletError};
use crate::types::{Log, TransactionReceipt};
use alloy_primitives::{Address, Bytes, B256, U256};
use sha3::{Digest, Keccak256};

const WORD: usize = 32;

/// `event AgentDeployed(address indexed agentAddress, address indexed owner, string name)`
pub const AGENT_DEPLOYED_EVENT: &str = "AgentDeployed(address,address,string)";
/// `event API_Paid(address indexed agent, address indexed service, uint256 amount)`
pub const API_PAID_EVENT: &str = "API_Paid(address,address,uint256)";
/// `event Transfer_Made(address indexed from, address indexed to, uint256 amount)`
pub const TRANSFER_MADE_EVENT: &str = "Transfer_Made(address,address,uint256)";
/// `event Deposited(address indexed by, uint256 amount)`
pub const DEPOSITED_EVENT: &str = "Deposited(address,uint256)";

/// Keccak-256 digest
pub fn keccak256(data: &[u8]) -> B256 {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    B256::from_slice(&hasher.finalize())
}

/// First four bytes of the signature hash
pub fn selector(signature: &str) -> [u8; 4] {
    let hash = keccak256(signature.as_bytes());
    let mut out = [0u8; 4];
    out.copy_from_slice(&hash[..4]);
    out
}

/// Topic0 for an event signature
pub fn event_topic(signature: &str) -> B256 {
    keccak256(signature.as_bytes())
}

/// A call against the factory or an agent contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContractCall {
    /// `factory.deployAgent(string name) returns (address)`
    DeployAgent { name: String },
    /// `factory.getDeployedAgents() view returns (address[])`
    GetDeployedAgents,
    /// `agent.deposit() payable`
    Deposit,
    /// `agent.getBalance() view returns (uint256)`
    GetBalance,
    /// `agent.payForAPI(address payable service) payable`
    PayForApi { service: Address },
    /// `agent.sendTo(address payable to, uint256 amount)`
    SendTo { to: Address, amount: U256 },
    /// `agent.owner() view returns (address)`
    Owner,
}

impl ContractCall {
    /// Canonical Solidity signature
    pub fn signature(&self) -> &'static str {
        match self {
            Self::DeployAgent { .. } => "deployAgent(string)",
            Self::GetDeployedAgents => "getDeployedAgents()",
            Self::Deposit => "deposit()",
            Self::GetBalance => "getBalance()",
            Self::PayForApi { .. } => "payForAPI(address)",
            Self::SendTo { .. } => "sendTo(address,uint256)",
            Self::Owner => "owner()",
        }
    }

    /// Method name, for logs
    pub fn method(&self) -> &'static str {
        let sig = self.signature();
        sig.split('(').next().unwrap_or(sig)
    }

    /// Whether the method is a `view`
    pub fn is_view(&self) -> bool {
        matches!(self, Self::GetDeployedAgents | Self::GetBalance | Self::Owner)
    }

    pub fn selector(&self) -> [u8; 4] {
        selector(self.signature())
    }

    /// Selector followed by the ABI-encoded arguments
    pub fn encode(&self) -> Bytes {
        let mut out = self.selector().to_vec();
        match self {
            Self::DeployAgent { name } => {
                // single dynamic argument: head is the offset of its tail
                out.extend_from_slice(&encode_usize(WORD));
                out.extend_from_slice(&encode_string(name));
            }
            Self::PayForApi { service } => out.extend_from_slice(&encode_address(*service)),
            Self::SendTo { to, amount } => {
                out.extend_from_slice(&encode_address(*to));
                out.extend_from_slice(&encode_uint(*amount));
            }
            Self::GetDeployedAgents | Self::Deposit | Self::GetBalance | Self::Owner => {}
        }
        Bytes::from(out)
    }
}

pub fn encode_address(addr: Address) -> [u8; WORD] {
    addr.into_word().0
}

pub fn encode_uint(value: U256) -> [u8; WORD] {
    value.to_be_bytes::<WORD>()
}

fn encode_usize(value: usize) -> [u8; WORD] {
    encode_uint(U256::from(value))
}

/// Length word followed by the UTF-8 bytes, right-padded to a word boundary
pub fn encode_string(value: &str) -> Vec<u8> {
    let bytes = value.as_bytes();
    let padded = bytes.len().div_ceil(WORD) * WORD;
    let mut out = Vec::with_capacity(WORD + padded);
    out.extend_from_slice(&encode_usize(bytes.len()));
    out.extend_from_slice(bytes);
    out.resize(WORD + padded, 0);
    out
}

/// Encode a dynamic `address[]` return value (offset, length, items)
pub fn encode_address_array(items: &[Address]) -> Vec<u8> {
    let mut out = Vec::with_capacity(WORD * (2 + items.len()));
    out.extend_from_slice(&encode_usize(WORD));
    out.extend_from_slice(&encode_usize(items.len()));
    for item in items {
        out.extend_from_slice(&encode_address(*item));
    }
    out
}

fn word_at(data: &[u8], offset: usize) -> Result<&[u8]> {
    data.get(offset..offset + WORD).ok_or_else(|| {
        WalletError::Decode(format!(
            "expected a 32-byte word at offset {}, got {} bytes",
            offset,
            data.len()
        ))
    })
}

fn usize_at(data: &[u8], offset: usize) -> Result<usize> {
    let word = word_at(data, offset)?;
    if word[..WORD - 8].iter().any(|b| *b != 0) {
        return Err(WalletError::Decode(format!(
            "offset/length word at {} does not fit in 64 bits",
            offset
        )));
    }
    let mut tail = [0u8; 8];
    tail.copy_from_slice(&word[WORD - 8..]);
    usize::try_from(u64::from_be_bytes(tail))
        .map_err(|e| WalletError::Decode(e.to_string()))
}

/// Decode a single `uint256` return value
pub fn decode_uint(data: &[u8]) -> Result<U256> {
    Ok(U256::from_be_slice(word_at(data, 0)?))
}

/// Decode a single `address` return value
pub fn decode_address(data: &[u8]) -> Result<Address> {
    let word = word_at(data, 0)?;
    Ok(Address::from_word(B256::from_slice(word)))
}

/// Decode a single dynamic `address[]` return value
pub fn decode_address_array(data: &[u8]) -> Result<Vec<Address>> {
    let offset = usize_at(data, 0)?;
    let len = usize_at(data, offset)?;
    (0..len)
        .map(|i| {
            let word = word_at(data, offset + WORD * (i + 1))?;
            Ok(Address::from_word(B256::from_slice(word)))
        })
        .collect()
}

/// Decode a dynamic `string` whose head word sits at `head`
pub fn decode_string(data: &[u8], head: usize) -> Result<String> {
    let offset = usize_at(data, head)?;
    let len = usize_at(data, offset)?;
    let start = offset + WORD;
    let bytes = data.get(start..start + len).ok_or_else(|| {
        WalletError::Decode(format!("string of {} bytes overruns data", len))
    })?;
    String::from_utf8(bytes.to_vec()).map_err(|e| WalletError::Decode(e.to_string()))
}

/// Events emitted by the factory and agent contracts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentEvent {
    AgentDeployed {
        agent: Address,
        owner: Address,
        name: String,
    },
    ApiPaid {
        agent: Address,
        service: Address,
        amount: U256,
    },
    TransferMade {
        from: Address,
        to: Address,
        amount: U256,
    },
    Deposited {
        by: Address,
        amount: U256,
    },
}

impl AgentEvent {
    pub fn signature(&self) -> &'static str {
        match self {
            Self::AgentDeployed { .. } => AGENT_DEPLOYED_EVENT,
            Self::ApiPaid { .. } => API_PAID_EVENT,
            Self::TransferMade { .. } => TRANSFER_MADE_EVENT,
            Self::Deposited { .. } => DEPOSITED_EVENT,
        }
    }

    /// Encode as a log emitted by `emitter` (indexed fields become topics)
    pub fn to_log(&self, emitter: Address) -> Log {
        let topic0 = event_topic(self.signature());
        let (topics, data) = match self {
            Self::AgentDeployed { agent, owner, name } => {
                let mut data = encode_usize(WORD).to_vec();
                data.extend_from_slice(&encode_string(name));
                (vec![topic0, agent.into_word(), owner.into_word()], data)
            }
            Self::ApiPaid { agent, service, amount } => (
                vec![topic0, agent.into_word(), service.into_word()],
                encode_uint(*amount).to_vec(),
            ),
            Self::TransferMade { from, to, amount } => (
                vec![topic0, from.into_word(), to.into_word()],
                encode_uint(*amount).to_vec(),
            ),
            Self::Deposited { by, amount } => {
                (vec![topic0, by.into_word()], encode_uint(*amount).to_vec())
            }
        };
        Log {
            address: emitter,
            topics,
            data: Bytes::from(data),
        }
    }

    /// Decode a log; `Ok(None)` when topic0 is not one of ours
    pub fn decode(log: &Log) -> Result<Option<Self>> {
        let Some(topic0) = log.topics.first() else {
            return Ok(None);
        };
        let indexed = |i: usize| -> Result<Address> {
            log.topics
                .get(i)
                .map(|t| Address::from_word(*t))
                .ok_or_else(|| WalletError::Decode(format!("missing indexed topic {}", i)))
        };

        let event = if *topic0 == event_topic(AGENT_DEPLOYED_EVENT) {
            Self::AgentDeployed {
                agent: indexed(1)?,
                owner: indexed(2)?,
                name: decode_string(&log.data, 0)?,
            }
        } else if *topic0 == event_topic(API_PAID_EVENT) {
            Self::ApiPaid {
                agent: indexed(1)?,
                service: indexed(2)?,
                amount: decode_uint(&log.data)?,
            }
        } else if *topic0 == event_topic(TRANSFER_MADE_EVENT) {
            Self::TransferMade {
                from: indexed(1)?,
                to: indexed(2)?,
                amount: decode_uint(&log.data)?,
            }
        } else if *topic0 == event_topic(DEPOSITED_EVENT) {
            Self::Deposited {
                by: indexed(1)?,
                amount: decode_uint(&log.data)?,
            }
        } else {
            return Ok(None);
        };
        Ok(Some(event))
    }
}

/// Recover the freshly deployed agent address from a deploy receipt
///
/// Reads the `AgentDeployed` event emitted by `factory` first (the agent
/// address is its first indexed topic), then falls back to the receipt's
/// `contractAddress`. Events from any other contract are ignored. Fails
/// when neither source yields an address.
pub fn extract_deployed_agent(receipt: &TransactionReceipt, factory: Address) -> Result<Address> {
    let deployed_topic = event_topic(AGENT_DEPLOYED_EVENT);
    let from_event = receipt
        .logs
        .iter()
        .filter(|log| log.address == factory)
        .find(|log| log.topics.first() == Some(&deployed_topic))
        .and_then(|log| log.topics.get(1))
        .map(|topic| Address::from_word(*topic));

    if let Some(agent) = from_event {
        return Ok(agent);
    }

    if let Some(agent) = receipt.contract_address {
        tracing::debug!(
            tx = %receipt.transaction_hash,
            "AgentDeployed event absent, using receipt contract address"
        );
        return Ok(agent);
    }

    Err(WalletError::Decode(format!(
        "receipt {} carries neither an AgentDeployed event nor a contract address",
        receipt.transaction_hash
    )))
}
