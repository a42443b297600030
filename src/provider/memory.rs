//! In-memory wallet provider
//!
//! Simulates a single-node chain with the factory and agent contracts
//! built in. Transactions execute synchronously on submission and are
//! "confirmed" immediately. Failure injection hooks let tests drive every
//! error path, and submission/query counters make "no network call"
//! assertions possible.

use crate::abi::{self, AgentEvent, ContractCall};
use crate::error::{Result, WalletError};
use crate::provider::WalletProvider;
use crate::types::{Log, TransactionReceipt, TransactionRequest, TxHash, TxInput};
use alloy_primitives::{Address, Bytes, U256};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Configuration for the in-memory chain
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Chain identifier reported by `chain_id()`
    pub chain_id: u64,
    /// Wallet-managed accounts, in authorization order
    pub accounts: Vec<Address>,
    /// Starting balance of every wallet account
    pub initial_balance: U256,
    /// Accounts count as authorized before any prompt
    pub preauthorized: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            chain_id: 31337,
            accounts: vec![Address::repeat_byte(0x0a)],
            // 10_000 ether
            initial_balance: U256::from(10_000u64) * U256::from(1_000_000_000_000_000_000u128),
            preauthorized: false,
        }
    }
}

#[derive(Debug, Clone)]
struct AgentRecord {
    owner: Address,
    factory: Address,
}

#[derive(Default)]
struct ChainState {
    authorized: bool,
    balances: HashMap<Address, U256>,
    /// factory address -> deployed agents
    factories: HashMap<Address, Vec<Address>>,
    agents: HashMap<Address, AgentRecord>,
    receipts: HashMap<TxHash, TransactionReceipt>,
    nonce: u64,
    block: u64,
    next_agent_addresses: VecDeque<Address>,
    reject_authorization: Option<String>,
    reject_next_submission: Option<String>,
    fail_next_query: Option<String>,
    hang_confirmations: bool,
    omit_deploy_events: bool,
}

/// Result of executing a transaction body: created address + emitted logs
type Execution = std::result::Result<(Option<Address>, Vec<Log>), String>;

impl ChainState {
    fn balance(&self, addr: &Address) -> U256 {
        self.balances.get(addr).copied().unwrap_or(U256::ZERO)
    }

    fn transfer(&mut self, from: Address, to: Address, value: U256) {
        if value.is_zero() {
            return;
        }
        let from_balance = self.balance(&from);
        self.balances.insert(from, from_balance.saturating_sub(value));
        let to_balance = self.balance(&to);
        self.balances.insert(to, to_balance.saturating_add(value));
    }

    fn derive_address(&self, creator: Address) -> Address {
        let mut seed = creator.to_vec();
        seed.extend_from_slice(&self.nonce.to_be_bytes());
        Address::from_word(abi::keccak256(&seed))
    }

    fn execute(&mut self, from: Address, to: Option<Address>, value: U256, input: &TxInput) -> Execution {
        match input {
            TxInput::Create(code) => {
                if code.is_empty() {
                    return Err("contract creation without bytecode".to_string());
                }
                let created = self.derive_address(from);
                self.factories.insert(created, Vec::new());
                self.transfer(from, created, value);
                Ok((Some(created), Vec::new()))
            }
            TxInput::Transfer => {
                let to = to.ok_or_else(|| "transfer without recipient".to_string())?;
                self.transfer(from, to, value);
                let logs = if self.agents.contains_key(&to) {
                    vec![AgentEvent::Deposited { by: from, amount: value }.to_log(to)]
                } else {
                    Vec::new()
                };
                Ok((None, logs))
            }
            TxInput::Call(call) => {
                let to = to.ok_or_else(|| "call without target".to_string())?;
                self.execute_call(from, to, value, call)
            }
        }
    }

    fn execute_call(&mut self, from: Address, to: Address, value: U256, call: &ContractCall) -> Execution {
        match call {
            ContractCall::DeployAgent { name } => {
                if !self.factories.contains_key(&to) {
                    return Err("target is not a factory".to_string());
                }
                let agent = match self.next_agent_addresses.pop_front() {
                    Some(addr) => addr,
                    None => self.derive_address(to),
                };
                self.agents.insert(agent, AgentRecord { owner: from, factory: to });
                self.factories.entry(to).or_default().push(agent);
                self.transfer(from, to, value);

                let logs = if self.omit_deploy_events {
                    Vec::new()
                } else {
                    vec![AgentEvent::AgentDeployed {
                        agent,
                        owner: from,
                        name: name.clone(),
                    }
                    .to_log(to)]
                };
                Ok((None, logs))
            }
            ContractCall::Deposit => {
                self.require_agent(&to)?;
                self.transfer(from, to, value);
                Ok((None, vec![AgentEvent::Deposited { by: from, amount: value }.to_log(to)]))
            }
            ContractCall::PayForApi { service } => {
                self.require_owner(&to, from)?;
                // the attached value is forwarded to the service
                self.transfer(from, to, value);
                self.transfer(to, *service, value);
                Ok((
                    None,
                    vec![AgentEvent::ApiPaid {
                        agent: to,
                        service: *service,
                        amount: value,
                    }
                    .to_log(to)],
                ))
            }
            ContractCall::SendTo { to: recipient, amount } => {
                self.require_owner(&to, from)?;
                if self.balance(&to) < *amount {
                    return Err("insufficient agent balance".to_string());
                }
                self.transfer(from, to, value);
                self.transfer(to, *recipient, *amount);
                Ok((
                    None,
                    vec![AgentEvent::TransferMade {
                        from: to,
                        to: *recipient,
                        amount: *amount,
                    }
                    .to_log(to)],
                ))
            }
            ContractCall::GetBalance | ContractCall::Owner | ContractCall::GetDeployedAgents => {
                Ok((None, Vec::new()))
            }
        }
    }

    fn require_agent(&self, addr: &Address) -> std::result::Result<&AgentRecord, String> {
        self.agents
            .get(addr)
            .ok_or_else(|| "target is not an agent".to_string())
    }

    fn require_owner(&self, agent: &Address, caller: Address) -> std::result::Result<(), String> {
        let record = self.require_agent(agent)?;
        if record.owner != caller {
            return Err("caller is not the agent owner".to_string());
        }
        Ok(())
    }
}

/// In-memory simulated chain implementing `WalletProvider`
pub struct MemoryChain {
    config: MemoryConfig,
    state: Mutex<ChainState>,
    submissions: AtomicUsize,
    queries: AtomicUsize,
}

impl Default for MemoryChain {
    fn default() -> Self {
        Self::new(MemoryConfig::default())
    }
}

impl MemoryChain {
    /// Create a chain with funded wallet accounts
    pub fn new(config: MemoryConfig) -> Self {
        let mut state = ChainState {
            authorized: config.preauthorized,
            ..Default::default()
        };
        for account in &config.accounts {
            state.balances.insert(*account, config.initial_balance);
        }
        Self {
            config,
            state: Mutex::new(state),
            submissions: AtomicUsize::new(0),
            queries: AtomicUsize::new(0),
        }
    }

    /// Chain whose accounts are already authorized
    pub fn preauthorized() -> Self {
        Self::new(MemoryConfig {
            preauthorized: true,
            ..Default::default()
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ChainState>> {
        self.state.lock().map_err(|e| {
            WalletError::QueryFailed(format!("Failed to acquire chain lock: {}", e))
        })
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut ChainState) -> R) -> R {
        let mut guard = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut guard)
    }

    /// Install a factory contract directly, bypassing a creation transaction
    pub fn install_factory(&self) -> Address {
        self.with_state(|s| {
            s.nonce += 1;
            let factory = s.derive_address(Address::ZERO);
            s.factories.insert(factory, Vec::new());
            factory
        })
    }

    /// Queue an address for the next `deployAgent` call
    pub fn push_agent_address(&self, addr: Address) {
        self.with_state(|s| s.next_agent_addresses.push_back(addr));
    }

    /// Make the next authorization prompt fail with `reason`
    pub fn reject_authorization(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.with_state(|s| s.reject_authorization = Some(reason));
    }

    /// Make the next submission fail with `reason` (e.g. user rejection)
    pub fn reject_next_submission(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.with_state(|s| s.reject_next_submission = Some(reason));
    }

    /// Make the next read-only call fail with `reason`
    pub fn fail_next_query(&self, reason: impl Into<String>) {
        let reason = reason.into();
        self.with_state(|s| s.fail_next_query = Some(reason));
    }

    /// Never answer confirmation requests
    pub fn set_hang_confirmations(&self, hang: bool) {
        self.with_state(|s| s.hang_confirmations = hang);
    }

    /// Deploy agents without emitting `AgentDeployed`
    pub fn set_omit_deploy_events(&self, omit: bool) {
        self.with_state(|s| s.omit_deploy_events = omit);
    }

    /// Current balance of any address
    pub fn balance_of(&self, addr: Address) -> U256 {
        self.with_state(|s| s.balance(&addr))
    }

    /// Owner recorded for a deployed agent
    pub fn agent_owner(&self, agent: Address) -> Option<Address> {
        self.with_state(|s| s.agents.get(&agent).map(|r| r.owner))
    }

    /// Factory that deployed an agent
    pub fn agent_factory(&self, agent: Address) -> Option<Address> {
        self.with_state(|s| s.agents.get(&agent).map(|r| r.factory))
    }

    /// Number of `send_transaction` calls, including rejected ones
    pub fn submission_count(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }

    /// Number of read-only `call` invocations
    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &MemoryConfig {
        &self.config
    }
}

#[async_trait]
impl WalletProvider for MemoryChain {
    async fn request_accounts(&self) -> Result<Vec<Address>> {
        let mut state = self.lock()?;
        if let Some(reason) = state.reject_authorization.take() {
            return Err(WalletError::ConnectionFailed(reason));
        }
        state.authorized = true;
        Ok(self.config.accounts.clone())
    }

    async fn accounts(&self) -> Result<Vec<Address>> {
        let state = self.lock()?;
        if state.authorized {
            Ok(self.config.accounts.clone())
        } else {
            Ok(Vec::new())
        }
    }

    async fn chain_id(&self) -> Result<u64> {
        Ok(self.config.chain_id)
    }

    async fn send_transaction(&self, tx: TransactionRequest) -> Result<TxHash> {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        let mut state = self.lock()?;

        if let Some(reason) = state.reject_next_submission.take() {
            return Err(WalletError::TransactionFailed(reason));
        }

        let from = tx
            .from
            .ok_or_else(|| WalletError::TransactionFailed("missing sender".to_string()))?;
        if !state.authorized || !self.config.accounts.contains(&from) {
            return Err(WalletError::TransactionFailed(format!(
                "account {} is not authorized",
                from
            )));
        }
        if state.balance(&from) < tx.value {
            return Err(WalletError::TransactionFailed(
                "insufficient funds for transfer".to_string(),
            ));
        }

        state.nonce += 1;
        state.block += 1;
        let mut seed = from.to_vec();
        seed.extend_from_slice(&state.nonce.to_be_bytes());
        let hash = abi::keccak256(&seed);

        let receipt = match state.execute(from, tx.to, tx.value, &tx.input) {
            Ok((contract_address, logs)) => TransactionReceipt {
                transaction_hash: hash,
                success: true,
                block_number: Some(state.block),
                contract_address,
                logs,
            },
            Err(reason) => {
                tracing::debug!(tx = %hash, reason = %reason, "Simulated transaction reverted");
                TransactionReceipt {
                    transaction_hash: hash,
                    success: false,
                    block_number: Some(state.block),
                    contract_address: None,
                    logs: Vec::new(),
                }
            }
        };

        tracing::debug!(
            tx = %hash,
            method = tx.describe(),
            success = receipt.success,
            "Simulated transaction executed"
        );
        state.receipts.insert(hash, receipt);
        Ok(hash)
    }

    async fn wait_for_confirmation(&self, tx: TxHash) -> Result<TransactionReceipt> {
        let (hang, receipt) = {
            let state = self.lock()?;
            (state.hang_confirmations, state.receipts.get(&tx).cloned())
        };
        if hang {
            std::future::pending::<()>().await;
        }
        receipt.ok_or_else(|| WalletError::TransactionFailed(format!("unknown transaction {}", tx)))
    }

    async fn call(&self, to: Address, call: &ContractCall) -> Result<Bytes> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        let mut state = self.lock()?;

        if let Some(reason) = state.fail_next_query.take() {
            return Err(WalletError::QueryFailed(reason));
        }

        let encoded = match call {
            ContractCall::GetBalance => {
                state
                    .require_agent(&to)
                    .map_err(WalletError::QueryFailed)?;
                abi::encode_uint(state.balance(&to)).to_vec()
            }
            ContractCall::Owner => {
                let record = state.require_agent(&to).map_err(WalletError::QueryFailed)?;
                abi::encode_address(record.owner).to_vec()
            }
            ContractCall::GetDeployedAgents => {
                let agents = state.factories.get(&to).ok_or_else(|| {
                    WalletError::QueryFailed("target is not a factory".to_string())
                })?;
                abi::encode_address_array(agents)
            }
            other => {
                return Err(WalletError::QueryFailed(format!(
                    "{} is not a view function",
                    other.method()
                )))
            }
        };
        Ok(Bytes::from(encoded))
    }

    fn name(&self) -> &str {
        "memory"
    }
}
