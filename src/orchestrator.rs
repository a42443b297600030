//! Agent orchestrator: drives one agent contract through its lifecycle
//!
//! Every state-changing operation runs the same protocol:
//!
//! 1. `StateHandle::begin` checks the precondition and marks the state
//!    busy in one step (no network call on failure)
//! 2. the transaction is submitted through the session signer
//! 3. confirmation is awaited, optionally bounded by a timeout
//! 4. the receipt is reconciled into local state and a success status set
//! 5. the action's [`PostAction`] runs (a balance refresh for mutations)
//!
//! The busy flag is cleared by the `OperationGuard` however the run ends.

use crate::abi::{self, ContractCall};
use crate::config::{Amounts, WalletConfig};
use crate::decision::{decide, Decision, RandomSource, StdRandom};
use crate::error::{Result, WalletError};
use crate::provider::{Signer, WalletProvider};
use crate::state::{AppState, OperationGuard, StateHandle, Transition};
use crate::types::{Action, PostAction, TransactionReceipt, TxHash};
use crate::units::{format_ether, format_ether_friendly, is_valid_address, shorten_address, NATIVE_SYMBOL};
use alloy_primitives::{Address, U256};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::Instrument;

const NOT_CONNECTED: &str = "Connect wallet first.";
const NOT_OPERABLE: &str = "Connect and deploy agent first";
const NO_AGENT: &str = "No agent deployed or invalid address";
const AWAITING_CONFIRMATION: &str = "Waiting for transaction confirmation...";

/// Result of one completed operation
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationReport {
    pub action: Action,
    /// Success status recorded in the shared state
    pub status: String,
    /// Hash of the confirmed transaction, if one was sent
    pub tx: Option<TxHash>,
    pub agent: Option<Address>,
    /// Agent balance after the operation; `None` if it could not be read
    pub balance: Option<U256>,
    pub finished_at: DateTime<Utc>,
}

/// Result of one decision round
#[derive(Debug, Clone, Serialize)]
pub struct DecisionReport {
    pub draw: f64,
    pub decision: Decision,
    /// Report of the delegated payment, absent for a no-op
    pub outcome: Option<OperationReport>,
}

/// What the operation body hands back for reconciliation
struct Completed {
    status: String,
    tx: Option<TxHash>,
    agent: Option<Address>,
    balance: Option<U256>,
}

pub struct AgentOrchestrator {
    state: StateHandle,
    factory: Option<Address>,
    config: WalletConfig,
    amounts: Amounts,
    confirmation_timeout: Option<Duration>,
    rng: Mutex<Box<dyn RandomSource>>,
}

impl AgentOrchestrator {
    /// Fails with `Config` when the configured amounts do not parse
    pub fn new(state: StateHandle, factory: Option<Address>, config: WalletConfig) -> Result<Self> {
        let amounts = config.validate()?;
        Ok(Self {
            state,
            factory,
            confirmation_timeout: config.confirmation_timeout(),
            config,
            amounts,
            rng: Mutex::new(Box::new(StdRandom::from_entropy())),
        })
    }

    /// Replace the decision routine's random source
    pub fn with_random_source(mut self, source: Box<dyn RandomSource>) -> Self {
        self.rng = Mutex::new(source);
        self
    }

    /// Override the configured confirmation timeout
    pub fn with_confirmation_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    pub fn factory(&self) -> Option<Address> {
        self.factory
    }

    pub fn config(&self) -> &WalletConfig {
        &self.config
    }

    pub fn amounts(&self) -> Amounts {
        self.amounts
    }

    /// Deploy a fresh agent through the factory
    pub async fn deploy_agent(&self) -> Result<OperationReport> {
        let action = Action::DeployAgent;
        let factory = self.factory;
        let name = self.config.agent_name.clone();

        let (guard, (signer, factory)) = self.state.begin(
            action,
            format!("Deploying agent \"{}\"...", name),
            |s| {
                let signer = require_signer(s)?;
                if s.agent.is_deployed() {
                    return Err(WalletError::PreconditionFailed(format!(
                        "Agent already deployed: {}",
                        shorten_address(&s.agent.display())
                    )));
                }
                let factory = factory.ok_or_else(|| {
                    WalletError::PreconditionFailed(
                        "Factory address unknown. Deploy the factory first.".to_string(),
                    )
                })?;
                Ok((signer, factory))
            },
        )?;

        self.run(action, guard, async {
            let tx = signer
                .send_call(factory, ContractCall::DeployAgent { name }, U256::ZERO)
                .await?;
            let receipt = self.confirm(signer.provider(), tx).await?;
            let agent = abi::extract_deployed_agent(&receipt, factory)?;

            tracing::info!(agent = %agent, factory = %factory, "Agent deployed");
            self.state.apply(Transition::AgentSet(agent));
            Ok(Completed {
                status: format!("Agent deployed: {}", shorten_address(&agent.to_string())),
                tx: Some(tx),
                agent: Some(agent),
                balance: None,
            })
        })
        .await
    }

    /// Re-read the agent balance
    pub async fn refresh_balance(&self) -> Result<OperationReport> {
        let action = Action::RefreshBalance;
        let (guard, (provider, agent)) =
            self.state
                .begin(action, "Fetching agent balance...", |s| {
                    let agent = require_agent(s)?;
                    let provider = s
                        .session
                        .provider()
                        .cloned()
                        .ok_or(WalletError::ProviderUnavailable)?;
                    Ok((provider, agent))
                })?;

        self.run(action, guard, async {
            let wei = fetch_balance(provider.as_ref(), agent).await?;
            self.state.apply(Transition::BalanceUpdated(wei));
            Ok(Completed {
                status: format!("Balance: {}", format_ether_friendly(wei)),
                tx: None,
                agent: Some(agent),
                balance: Some(wei),
            })
        })
        .await
    }

    /// Send the deposit amount to the agent as a plain value transfer
    pub async fn deposit(&self) -> Result<OperationReport> {
        let action = Action::Deposit;
        let amount = self.amounts.deposit;
        let (guard, (signer, agent)) = self.state.begin(
            action,
            format!("Sending {} {} to agent...", format_ether(amount), NATIVE_SYMBOL),
            require_operable,
        )?;

        self.run(action, guard, async {
            let tx = signer.send_value(agent, amount).await?;
            self.confirm(signer.provider(), tx).await?;
            tracing::info!(agent = %agent, amount = %amount, "Deposit confirmed");
            Ok(Completed {
                status: "Deposit complete".to_string(),
                tx: Some(tx),
                agent: Some(agent),
                balance: None,
            })
        })
        .await
    }

    /// Have the agent pay the mock API; the connected account is the service
    pub async fn pay_for_api(&self) -> Result<OperationReport> {
        let (guard, (signer, agent)) =
            self.state
                .begin(Action::PayForApi, self.payment_progress(), require_operable)?;
        self.pay_with(guard, signer, agent).await
    }

    fn payment_progress(&self) -> String {
        format!(
            "Paying for mock API ({} {})...",
            format_ether(self.amounts.api_payment),
            NATIVE_SYMBOL
        )
    }

    /// Payment body, run under a slot the caller already holds
    async fn pay_with(&self, guard: OperationGuard, signer: Signer, agent: Address) -> Result<OperationReport> {
        let amount = self.amounts.api_payment;
        self.run(Action::PayForApi, guard, async {
            let service = signer.address();
            let tx = signer
                .send_call(agent, ContractCall::PayForApi { service }, amount)
                .await?;
            self.confirm(signer.provider(), tx).await?;
            tracing::info!(agent = %agent, service = %service, amount = %amount, "API payment confirmed");
            Ok(Completed {
                status: "API paid".to_string(),
                tx: Some(tx),
                agent: Some(agent),
                balance: None,
            })
        })
        .await
    }

    /// Instruct the agent to send the transfer amount back to the owner
    pub async fn send_to_owner(&self) -> Result<OperationReport> {
        let action = Action::SendTo;
        let amount = self.amounts.transfer;
        let (guard, (signer, agent)) = self.state.begin(
            action,
            format!(
                "Sending {} {} from agent to you...",
                format_ether(amount),
                NATIVE_SYMBOL
            ),
            require_operable,
        )?;

        self.run(action, guard, async {
            let owner = signer.address();
            let tx = signer
                .send_call(agent, ContractCall::SendTo { to: owner, amount }, U256::ZERO)
                .await?;
            self.confirm(signer.provider(), tx).await?;
            tracing::info!(agent = %agent, to = %owner, amount = %amount, "Transfer confirmed");
            Ok(Completed {
                status: "Transfer complete".to_string(),
                tx: Some(tx),
                agent: Some(agent),
                balance: None,
            })
        })
        .await
    }

    /// Draw once; below the threshold do nothing, otherwise pay for the API
    pub async fn run_decision(&self) -> Result<DecisionReport> {
        let action = Action::RunDecision;
        let (guard, _agent) = self.state.begin(action, "Agent is deciding...", require_agent)?;

        let draw = self.draw();
        let decision = decide(draw, self.config.decision_threshold, self.amounts.api_payment);
        tracing::info!(draw, decision = ?decision, "Agent decision");

        match decision {
            Decision::Noop { .. } => {
                self.state
                    .apply(Transition::Succeeded("AI decided to do nothing".to_string()));
                drop(guard);
                Ok(DecisionReport {
                    draw,
                    decision,
                    outcome: None,
                })
            }
            Decision::PayApi { .. } => {
                // the payment takes over the slot; busy stays set throughout
                let (signer, agent) =
                    guard.hand_off(Action::PayForApi, self.payment_progress(), require_operable)?;
                let outcome = self.pay_with(guard, signer, agent).await?;
                Ok(DecisionReport {
                    draw,
                    decision,
                    outcome: Some(outcome),
                })
            }
        }
    }

    /// Point the session at an existing agent contract
    pub fn attach_agent(&self, candidate: &str) -> Result<Address> {
        let candidate = candidate.trim();
        let agent = Some(candidate)
            .filter(|c| is_valid_address(c))
            .and_then(|c| Address::from_str(c).ok())
            .ok_or_else(|| {
                WalletError::PreconditionFailed(format!("Invalid agent address: {}", candidate))
            })?;

        self.state.apply_idle([
            Transition::AgentCleared,
            Transition::AgentSet(agent),
            Transition::Succeeded(format!("Agent attached: {}", shorten_address(&agent.to_string()))),
        ])?;
        tracing::info!(agent = %agent, "Agent attached");
        Ok(agent)
    }

    /// Forget the current agent so a new one can be deployed
    pub fn reset_agent(&self) -> Result<()> {
        self.state.apply_idle([
            Transition::AgentCleared,
            Transition::Succeeded("Agent reset".to_string()),
        ])?;
        tracing::info!("Agent reference cleared");
        Ok(())
    }

    /// Agents recorded by the factory
    pub async fn deployed_agents(&self) -> Result<Vec<Address>> {
        let factory = self.factory.ok_or_else(|| {
            WalletError::PreconditionFailed("Factory address unknown".to_string())
        })?;
        let provider = self
            .state
            .read(|s| s.session.provider().cloned())
            .ok_or(WalletError::ProviderUnavailable)?;

        let raw = provider.call(factory, &ContractCall::GetDeployedAgents).await?;
        let agents = abi::decode_address_array(&raw)?;
        tracing::debug!(factory = %factory, count = agents.len(), "Deployed agents listed");
        Ok(agents)
    }

    /// Run an operation body and reconcile its outcome into state
    async fn run<F>(&self, action: Action, guard: OperationGuard, body: F) -> Result<OperationReport>
    where
        F: Future<Output = Result<Completed>>,
    {
        let op_id = format!("op-{}", uuid::Uuid::new_v4());
        let span = tracing::info_span!("operation", action = %action, op_id = %op_id);

        async move {
            match body.await {
                Ok(mut done) => {
                    self.state.apply(Transition::Succeeded(done.status.clone()));
                    if let (PostAction::RefreshBalance, Some(agent)) = (action.post_action(), done.agent) {
                        done.balance = self.post_refresh(agent).await;
                    }
                    drop(guard);
                    tracing::info!(status = %done.status, "Operation succeeded");
                    Ok(OperationReport {
                        action,
                        status: done.status,
                        tx: done.tx,
                        agent: done.agent,
                        balance: done.balance,
                        finished_at: Utc::now(),
                    })
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Operation failed");
                    self.state.apply(Transition::Failed(format!(
                        "{}: {}",
                        action.failure_prefix(),
                        e
                    )));
                    drop(guard);
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Wait for the receipt and require successful execution
    async fn confirm(&self, provider: &Arc<dyn WalletProvider>, tx: TxHash) -> Result<TransactionReceipt> {
        self.state
            .apply(Transition::Progress(AWAITING_CONFIRMATION.to_string()));
        tracing::debug!(tx = %tx, "Awaiting confirmation");

        let wait = provider.wait_for_confirmation(tx);
        let receipt = match self.confirmation_timeout {
            Some(limit) => tokio::time::timeout(limit, wait).await.map_err(|_| {
                WalletError::TransactionTimeout {
                    tx: tx.to_string(),
                    secs: limit.as_secs(),
                }
            })??,
            None => wait.await?,
        };

        if !receipt.success {
            return Err(WalletError::TransactionFailed("transaction reverted".to_string()));
        }
        tracing::debug!(tx = %tx, block = ?receipt.block_number, "Transaction confirmed");
        Ok(receipt)
    }

    /// Chained refresh: updates the balance only and never fails the operation
    async fn post_refresh(&self, agent: Address) -> Option<U256> {
        let provider = self.state.read(|s| s.session.provider().cloned())?;
        match fetch_balance(provider.as_ref(), agent).await {
            Ok(wei) => {
                self.state.apply(Transition::BalanceUpdated(wei));
                Some(wei)
            }
            Err(e) => {
                tracing::warn!(agent = %agent, error = %e, "Balance refresh after operation failed");
                None
            }
        }
    }

    fn draw(&self) -> f64 {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        rng.next_unit()
    }
}

async fn fetch_balance(provider: &dyn WalletProvider, agent: Address) -> Result<U256> {
    let raw = provider.call(agent, &ContractCall::GetBalance).await?;
    abi::decode_uint(&raw)
}

fn require_signer(state: &AppState) -> Result<Signer> {
    state
        .session
        .signer()
        .cloned()
        .ok_or_else(|| WalletError::PreconditionFailed(NOT_CONNECTED.to_string()))
}

fn require_agent(state: &AppState) -> Result<Address> {
    state
        .agent
        .address()
        .filter(|_| state.agent.is_deployed())
        .ok_or_else(|| WalletError::PreconditionFailed(NO_AGENT.to_string()))
}

fn require_operable(state: &AppState) -> Result<(Signer, Address)> {
    match (state.session.signer(), state.agent.address()) {
        (Some(signer), Some(agent)) if state.agent.is_deployed() => Ok((signer.clone(), agent)),
        _ => Err(WalletError::PreconditionFailed(NOT_OPERABLE.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::FixedRandom;
    use crate::provider::memory::MemoryChain;
    use crate::state::Notice;

    struct Fixture {
        chain: Arc<MemoryChain>,
        state: StateHandle,
        orchestrator: AgentOrchestrator,
    }

    async fn connected(draw: f64) -> Fixture {
        let chain = Arc::new(MemoryChain::default());
        let factory = chain.install_factory();
        let provider: Arc<dyn WalletProvider> = chain.clone();
        let account = provider.request_accounts().await.unwrap()[0];

        let state = StateHandle::new();
        state.apply(Transition::Connected { provider, account });
        let orchestrator = AgentOrchestrator::new(state.clone(), Some(factory), WalletConfig::default())
            .unwrap()
            .with_random_source(Box::new(FixedRandom::always(draw)));
        Fixture { chain, state, orchestrator }
    }

    #[tokio::test]
    async fn test_deploy_sets_agent_and_status() {
        let fx = connected(0.0).await;
        let report = fx.orchestrator.deploy_agent().await.unwrap();
        let agent = report.agent.unwrap();

        let snapshot = fx.state.snapshot();
        assert_eq!(snapshot.agent.address(), Some(agent));
        assert_eq!(
            snapshot.operation.last_status,
            format!("Agent deployed: {}", shorten_address(&agent.to_string()))
        );
        assert_eq!(report.balance, Some(U256::ZERO));
        assert_eq!(snapshot.balance, Some(U256::ZERO));
        assert!(!snapshot.operation.busy);
    }

    #[tokio::test]
    async fn test_deploy_requires_session() {
        let state = StateHandle::new();
        let orchestrator =
            AgentOrchestrator::new(state.clone(), Some(Address::ZERO), WalletConfig::default()).unwrap();

        let err = orchestrator.deploy_agent().await.unwrap_err();
        assert_eq!(err.to_string(), NOT_CONNECTED);
        assert_eq!(
            state.snapshot().operation.last_error,
            "Failed to deploy agent: Connect wallet first."
        );
    }

    #[tokio::test]
    async fn test_deploy_without_factory() {
        let fx = connected(0.0).await;
        let orchestrator =
            AgentOrchestrator::new(fx.state.clone(), None, WalletConfig::default()).unwrap();
        let err = orchestrator.deploy_agent().await.unwrap_err();
        assert!(err.is_precondition());
        assert_eq!(fx.chain.submission_count(), 0);
    }

    #[tokio::test]
    async fn test_deposit_pay_send_cycle() {
        let fx = connected(0.0).await;
        let agent = fx.orchestrator.deploy_agent().await.unwrap().agent.unwrap();

        let deposit = fx.orchestrator.deposit().await.unwrap();
        assert_eq!(deposit.status, "Deposit complete");
        assert_eq!(deposit.balance, Some(fx.orchestrator.amounts().deposit));

        let pay = fx.orchestrator.pay_for_api().await.unwrap();
        assert_eq!(pay.status, "API paid");
        assert_eq!(pay.balance, Some(fx.orchestrator.amounts().deposit));

        let send = fx.orchestrator.send_to_owner().await.unwrap();
        assert_eq!(send.status, "Transfer complete");
        let expected = fx.orchestrator.amounts().deposit - fx.orchestrator.amounts().transfer;
        assert_eq!(fx.chain.balance_of(agent), expected);
        assert_eq!(fx.state.snapshot().balance_display(), "0.045");
    }

    #[tokio::test]
    async fn test_refresh_balance_status() {
        let fx = connected(0.0).await;
        fx.orchestrator.deploy_agent().await.unwrap();

        let report = fx.orchestrator.refresh_balance().await.unwrap();
        assert_eq!(report.status, "Balance: <0.0001");
        assert_eq!(fx.state.snapshot().notice(), Notice::Success("Balance: <0.0001".into()));
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_status() {
        let fx = connected(0.0).await;
        fx.orchestrator.deploy_agent().await.unwrap();
        let before = fx.state.snapshot().operation.last_status;

        fx.chain.fail_next_query("node unavailable");
        let err = fx.orchestrator.refresh_balance().await.unwrap_err();
        assert!(matches!(err, WalletError::QueryFailed(_)));

        let op = fx.state.snapshot().operation;
        assert_eq!(op.last_status, before);
        assert_eq!(op.last_error, "Failed to fetch balance: Query failed: node unavailable");
    }

    #[tokio::test]
    async fn test_post_refresh_failure_does_not_fail_operation() {
        let fx = connected(0.0).await;
        fx.orchestrator.deploy_agent().await.unwrap();

        fx.chain.fail_next_query("flaky");
        let report = fx.orchestrator.deposit().await.unwrap();
        assert!(report.balance.is_none());

        let op = fx.state.snapshot().operation;
        assert_eq!(op.last_status, "Deposit complete");
        assert!(op.last_error.is_empty());
    }

    #[tokio::test]
    async fn test_reverted_send_is_transaction_failure() {
        let fx = connected(0.0).await;
        fx.orchestrator.deploy_agent().await.unwrap();

        // agent holds nothing, so the transfer reverts
        let err = fx.orchestrator.send_to_owner().await.unwrap_err();
        assert_eq!(err.to_string(), "Transaction failed: transaction reverted");
        assert_eq!(
            fx.state.snapshot().operation.last_error,
            "Send failed: Transaction failed: transaction reverted"
        );
    }

    #[tokio::test]
    async fn test_decision_noop() {
        let fx = connected(0.2).await;
        fx.orchestrator.deploy_agent().await.unwrap();
        let submissions = fx.chain.submission_count();

        let report = fx.orchestrator.run_decision().await.unwrap();
        assert!(report.decision.is_noop());
        assert!(report.outcome.is_none());
        assert_eq!(fx.chain.submission_count(), submissions);
        assert_eq!(fx.state.snapshot().operation.last_status, "AI decided to do nothing");
    }

    #[tokio::test]
    async fn test_decision_pays() {
        let fx = connected(0.8).await;
        fx.orchestrator.deploy_agent().await.unwrap();

        let report = fx.orchestrator.run_decision().await.unwrap();
        assert!(!report.decision.is_noop());
        assert_eq!(report.outcome.unwrap().status, "API paid");
        assert!(!fx.state.snapshot().operation.busy);
    }

    #[tokio::test]
    async fn test_decision_requires_agent() {
        let fx = connected(0.8).await;
        let err = fx.orchestrator.run_decision().await.unwrap_err();
        assert_eq!(err.to_string(), NO_AGENT);
        assert_eq!(
            fx.state.snapshot().operation.last_error,
            "AI action failed: No agent deployed or invalid address"
        );
    }

    #[tokio::test]
    async fn test_attach_and_reset() {
        let fx = connected(0.0).await;
        assert!(fx.orchestrator.attach_agent("0x1234").is_err());

        let agent = fx
            .orchestrator
            .attach_agent("0x00000000000000000000000000000000000000aa")
            .unwrap();
        assert_eq!(fx.state.snapshot().agent.address(), Some(agent));

        fx.orchestrator.reset_agent().unwrap();
        let snapshot = fx.state.snapshot();
        assert!(!snapshot.agent.is_deployed());
        assert!(snapshot.can_deploy());
    }

    #[tokio::test]
    async fn test_deployed_agents_listing() {
        let fx = connected(0.0).await;
        assert!(fx.orchestrator.deployed_agents().await.unwrap().is_empty());

        let agent = fx.orchestrator.deploy_agent().await.unwrap().agent.unwrap();
        assert_eq!(fx.orchestrator.deployed_agents().await.unwrap(), vec![agent]);
    }
}
