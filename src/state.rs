//! Shared session/UI state and its update contract
//!
//! `AppState` is the single record both the connection manager and the
//! orchestrator read and write. It is never mutated field-by-field from
//! call sites: every change goes through [`AppState::apply`] with a
//! [`Transition`]. `StateHandle` wraps it for sharing and provides the
//! busy guard that serializes operations.

use crate::error::{Result, WalletError};
use crate::provider::{Signer, WalletProvider};
use crate::types::Action;
use crate::units::{format_ether, format_ether_friendly, is_valid_address, shorten_address};
use alloy_primitives::{Address, U256};
use std::sync::{Arc, RwLock};

/// Wallet authorization state
///
/// The account is read from the signer, so "signer present" and "account
/// present" can never disagree.
#[derive(Clone, Default)]
pub struct Session {
    provider: Option<Arc<dyn WalletProvider>>,
    signer: Option<Signer>,
}

impl Session {
    /// Read-only chain handle, present once a wallet was detected
    pub fn provider(&self) -> Option<&Arc<dyn WalletProvider>> {
        self.provider.as_ref()
    }

    pub fn signer(&self) -> Option<&Signer> {
        self.signer.as_ref()
    }

    pub fn account(&self) -> Option<Address> {
        self.signer.as_ref().map(Signer::address)
    }

    pub fn is_connected(&self) -> bool {
        self.signer.is_some()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("provider", &self.provider.as_ref().map(|p| p.name().to_string()))
            .field("account", &self.account())
            .finish()
    }
}

/// Reference to the deployed agent contract
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AgentRef(Option<Address>);

impl AgentRef {
    pub fn address(&self) -> Option<Address> {
        self.0
    }

    /// Rendered address, empty when unset
    pub fn display(&self) -> String {
        self.0.map(|a| a.to_string()).unwrap_or_default()
    }

    /// Unset and malformed references are both "not deployed"
    pub fn is_deployed(&self) -> bool {
        is_valid_address(&self.display())
    }
}

/// Progress and outcome of the operation in flight (or the last one)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationState {
    pub busy: bool,
    /// Action currently running
    pub current: Option<Action>,
    /// In-progress message, only while busy
    pub progress: Option<String>,
    /// Last success message; untouched by failures
    pub last_status: String,
    /// Last error message; cleared when the next operation starts
    pub last_error: String,
}

/// Panel shown to the operator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Working(String),
    Error(String),
    Success(String),
    Idle,
}

/// The complete in-memory application state
#[derive(Debug, Clone, Default)]
pub struct AppState {
    pub session: Session,
    pub agent: AgentRef,
    /// Last fetched raw agent balance (wei)
    pub balance: Option<U256>,
    pub operation: OperationState,
}

/// One state change
pub enum Transition {
    /// A wallet capability was found; read-only handle available
    ProviderDetected(Arc<dyn WalletProvider>),
    /// An account was authorized
    Connected {
        provider: Arc<dyn WalletProvider>,
        account: Address,
    },
    /// Operation entry: busy, error cleared, progress shown
    Begin { action: Action, progress: String },
    /// In-flight progress update
    Progress(String),
    AgentSet(Address),
    AgentCleared,
    BalanceUpdated(U256),
    Succeeded(String),
    Failed(String),
    /// Operation exit, regardless of outcome
    Finished,
}

impl Transition {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ProviderDetected(_) => "provider_detected",
            Self::Connected { .. } => "connected",
            Self::Begin { .. } => "begin",
            Self::Progress(_) => "progress",
            Self::AgentSet(_) => "agent_set",
            Self::AgentCleared => "agent_cleared",
            Self::BalanceUpdated(_) => "balance_updated",
            Self::Succeeded(_) => "succeeded",
            Self::Failed(_) => "failed",
            Self::Finished => "finished",
        }
    }
}

impl AppState {
    /// The one mutation function
    pub fn apply(&mut self, transition: Transition) {
        tracing::trace!(transition = transition.name(), "State transition");
        match transition {
            Transition::ProviderDetected(provider) => {
                self.session.provider = Some(provider);
            }
            Transition::Connected { provider, account } => {
                self.session.signer = Some(Signer::new(provider.clone(), account));
                self.session.provider = Some(provider);
            }
            Transition::Begin { action, progress } => {
                self.operation.busy = true;
                self.operation.current = Some(action);
                self.operation.progress = Some(progress);
                self.operation.last_error.clear();
            }
            Transition::Progress(message) => {
                self.operation.progress = Some(message);
            }
            Transition::AgentSet(addr) => {
                self.agent = AgentRef(Some(addr));
            }
            Transition::AgentCleared => {
                self.agent = AgentRef::default();
                self.balance = None;
            }
            Transition::BalanceUpdated(wei) => {
                self.balance = Some(wei);
            }
            Transition::Succeeded(status) => {
                self.operation.last_status = status;
                self.operation.last_error.clear();
            }
            Transition::Failed(error) => {
                self.operation.last_error = error;
            }
            Transition::Finished => {
                self.operation.busy = false;
                self.operation.current = None;
                self.operation.progress = None;
            }
        }
    }

    /// Which panel to show: busy beats error beats success
    pub fn notice(&self) -> Notice {
        let op = &self.operation;
        if op.busy {
            let message = op
                .progress
                .clone()
                .unwrap_or_else(|| "processing...".to_string());
            Notice::Working(message)
        } else if !op.last_error.is_empty() {
            Notice::Error(op.last_error.clone())
        } else if !op.last_status.is_empty() {
            Notice::Success(op.last_status.clone())
        } else {
            Notice::Idle
        }
    }

    pub fn can_connect(&self) -> bool {
        !self.operation.busy && !self.session.is_connected()
    }

    pub fn can_deploy(&self) -> bool {
        !self.operation.busy && self.session.is_connected() && !self.agent.is_deployed()
    }

    /// Gate for deposit/pay/send/refresh/decision affordances
    pub fn can_operate(&self) -> bool {
        !self.operation.busy && self.agent.is_deployed()
    }

    /// Full-precision balance, `"0"` before the first fetch
    pub fn balance_display(&self) -> String {
        self.balance
            .map(format_ether)
            .unwrap_or_else(|| "0".to_string())
    }

    pub fn balance_friendly(&self) -> Option<String> {
        self.balance.map(format_ether_friendly)
    }

    /// Connected account, shortened for display
    pub fn account_display(&self) -> String {
        self.session
            .account()
            .map(|a| shorten_address(&a.to_string()))
            .unwrap_or_else(|| "Not connected".to_string())
    }
}

/// Shared, cloneable handle to the application state
///
/// Locks are never held across an await point.
#[derive(Clone, Default)]
pub struct StateHandle {
    inner: Arc<RwLock<AppState>>,
}

impl StateHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&self, transition: Transition) {
        let mut state = self.inner.write().unwrap_or_else(|e| e.into_inner());
        state.apply(transition);
    }

    pub fn snapshot(&self) -> AppState {
        self.read(Clone::clone)
    }

    pub fn read<R>(&self, f: impl FnOnce(&AppState) -> R) -> R {
        let state = self.inner.read().unwrap_or_else(|e| e.into_inner());
        f(&state)
    }

    /// Apply instantaneous transitions, refusing while an operation runs
    pub fn apply_idle(&self, transitions: impl IntoIterator<Item = Transition>) -> Result<()> {
        let mut state = self.inner.write().unwrap_or_else(|e| e.into_inner());
        if state.operation.busy {
            return Err(WalletError::PreconditionFailed(
                "Another operation is already in progress".to_string(),
            ));
        }
        for transition in transitions {
            state.apply(transition);
        }
        Ok(())
    }

    /// Enter an operation
    ///
    /// Under one write lock: refuses if another operation is in flight
    /// (leaving its state untouched), clears the previous error, runs the
    /// precondition check, and on success marks the state busy. A failed
    /// precondition records `"<prefix>: <reason>"` and makes no network call.
    pub fn begin<T>(
        &self,
        action: Action,
        progress: impl Into<String>,
        precondition: impl FnOnce(&AppState) -> Result<T>,
    ) -> Result<(OperationGuard, T)> {
        let mut state = self.inner.write().unwrap_or_else(|e| e.into_inner());

        if state.operation.busy {
            let running = state.operation.current.map(|a| a.as_str()).unwrap_or("operation");
            tracing::warn!(action = %action, running, "Operation refused while busy");
            return Err(WalletError::PreconditionFailed(format!(
                "Another operation ({}) is already in progress",
                running
            )));
        }

        state.operation.last_error.clear();
        let value = match precondition(&state) {
            Ok(value) => value,
            Err(e) => {
                tracing::info!(action = %action, reason = %e, "Precondition failed");
                state.apply(Transition::Failed(format!("{}: {}", action.failure_prefix(), e)));
                return Err(e);
            }
        };

        state.apply(Transition::Begin {
            action,
            progress: progress.into(),
        });
        Ok((OperationGuard { state: self.clone() }, value))
    }
}

/// Clears `busy` when dropped, whichever way the operation ends
pub struct OperationGuard {
    state: StateHandle,
}

impl OperationGuard {
    pub fn state(&self) -> &StateHandle {
        &self.state
    }

    /// Hand the held slot to a follow-up action without releasing `busy`
    ///
    /// Same contract as [`StateHandle::begin`] minus the busy check: the
    /// precondition runs under the write lock, a failure is recorded with
    /// the follow-up's prefix, and success relabels the running action.
    pub fn hand_off<T>(
        &self,
        action: Action,
        progress: impl Into<String>,
        precondition: impl FnOnce(&AppState) -> Result<T>,
    ) -> Result<T> {
        let mut state = self.state.inner.write().unwrap_or_else(|e| e.into_inner());
        let value = match precondition(&state) {
            Ok(value) => value,
            Err(e) => {
                tracing::info!(action = %action, reason = %e, "Precondition failed");
                state.apply(Transition::Failed(format!("{}: {}", action.failure_prefix(), e)));
                return Err(e);
            }
        };

        state.apply(Transition::Begin {
            action,
            progress: progress.into(),
        });
        Ok(value)
    }
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        self.state.apply(Transition::Finished);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::memory::MemoryChain;

    fn provider() -> Arc<dyn WalletProvider> {
        Arc::new(MemoryChain::default())
    }

    #[test]
    fn test_initial_state() {
        let state = AppState::default();
        assert!(!state.session.is_connected());
        assert!(state.session.provider().is_none());
        assert!(!state.agent.is_deployed());
        assert_eq!(state.notice(), Notice::Idle);
        assert_eq!(state.balance_display(), "0");
        assert_eq!(state.account_display(), "Not connected");
        assert!(state.can_connect());
        assert!(!state.can_deploy());
        assert!(!state.can_operate());
    }

    #[test]
    fn test_connected_session_pairs_signer_and_account() {
        let mut state = AppState::default();
        let account = Address::repeat_byte(0x0a);
        state.apply(Transition::Connected { provider: provider(), account });

        assert!(state.session.is_connected());
        assert_eq!(state.session.account(), Some(account));
        assert_eq!(state.session.signer().map(Signer::address), Some(account));
        assert!(state.session.provider().is_some());
        assert!(!state.can_connect());
        assert!(state.can_deploy());
    }

    #[test]
    fn test_success_clears_error_and_sets_status() {
        let mut state = AppState::default();
        state.apply(Transition::Failed("old".into()));
        state.apply(Transition::Begin {
            action: Action::Deposit,
            progress: "Sending".into(),
        });
        assert_eq!(state.notice(), Notice::Working("Sending".into()));
        assert!(state.operation.last_error.is_empty());

        state.apply(Transition::Succeeded("Deposit complete".into()));
        state.apply(Transition::Finished);
        assert!(!state.operation.busy);
        assert_eq!(state.notice(), Notice::Success("Deposit complete".into()));
    }

    #[test]
    fn test_failure_keeps_previous_status() {
        let mut state = AppState::default();
        state.apply(Transition::Succeeded("Connected".into()));
        state.apply(Transition::Begin {
            action: Action::DeployAgent,
            progress: "Deploying".into(),
        });
        state.apply(Transition::Failed("Failed to deploy agent: boom".into()));
        state.apply(Transition::Finished);

        assert_eq!(state.operation.last_status, "Connected");
        assert_eq!(
            state.notice(),
            Notice::Error("Failed to deploy agent: boom".into())
        );
    }

    #[test]
    fn test_agent_gating() {
        let mut state = AppState::default();
        state.apply(Transition::AgentSet(Address::repeat_byte(0xaa)));
        state.apply(Transition::BalanceUpdated(U256::from(5u64)));
        assert!(state.agent.is_deployed());
        assert!(state.can_operate());
        assert_eq!(state.balance_friendly().as_deref(), Some("<0.0001"));

        state.apply(Transition::AgentCleared);
        assert!(!state.agent.is_deployed());
        assert!(state.balance.is_none());
        assert_eq!(state.agent.display(), "");
    }

    #[test]
    fn test_guard_clears_busy_on_drop() {
        let handle = StateHandle::new();
        let (guard, ()) = handle.begin(Action::RefreshBalance, "Fetching", |_| Ok(())).unwrap();
        assert!(handle.read(|s| s.operation.busy));
        assert!(!handle.read(|s| s.can_operate()));

        drop(guard);
        assert!(!handle.read(|s| s.operation.busy));
        assert!(handle.read(|s| s.operation.progress.is_none()));
    }

    #[test]
    fn test_begin_refuses_reentry_without_touching_state() {
        let handle = StateHandle::new();
        let (_guard, ()) = handle.begin(Action::Deposit, "Sending", |_| Ok(())).unwrap();
        let before = handle.snapshot().operation;

        let err = handle
            .begin(Action::PayForApi, "Paying", |_| Ok(()))
            .err()
            .unwrap();
        assert!(err.is_precondition());
        assert!(err.to_string().contains("deposit"));
        assert_eq!(handle.snapshot().operation, before);
    }

    #[test]
    fn test_apply_idle_refused_while_busy() {
        let handle = StateHandle::new();
        handle
            .apply_idle([Transition::AgentSet(Address::repeat_byte(0xaa))])
            .unwrap();
        assert!(handle.read(|s| s.agent.is_deployed()));

        let (_guard, ()) = handle.begin(Action::SendTo, "Sending", |_| Ok(())).unwrap();
        assert!(handle.apply_idle([Transition::AgentCleared]).is_err());
        assert!(handle.read(|s| s.agent.is_deployed()));
    }

    #[test]
    fn test_begin_records_precondition_failure() {
        let handle = StateHandle::new();
        let result: Result<(OperationGuard, ())> = handle.begin(Action::Deposit, "Sending", |_| {
            Err(WalletError::PreconditionFailed("Connect and deploy agent first".into()))
        });

        assert!(result.is_err());
        let op = handle.snapshot().operation;
        assert!(!op.busy);
        assert_eq!(op.last_error, "Deposit failed: Connect and deploy agent first");
    }

    #[test]
    fn test_hand_off_keeps_slot_busy() {
        let handle = StateHandle::new();
        let (guard, ()) = handle.begin(Action::RunDecision, "Deciding", |_| Ok(())).unwrap();

        guard.hand_off(Action::PayForApi, "Paying", |_| Ok(())).unwrap();
        let op = handle.snapshot().operation;
        assert!(op.busy);
        assert_eq!(op.current, Some(Action::PayForApi));
        assert_eq!(op.progress.as_deref(), Some("Paying"));

        let err = handle
            .begin(Action::Deposit, "Sending", |_| Ok(()))
            .err()
            .unwrap();
        assert!(err.to_string().contains("pay_for_api"));

        drop(guard);
        assert!(!handle.read(|s| s.operation.busy));
    }

    #[test]
    fn test_hand_off_records_follow_up_failure() {
        let handle = StateHandle::new();
        let (guard, ()) = handle.begin(Action::RunDecision, "Deciding", |_| Ok(())).unwrap();

        let result: Result<()> = guard.hand_off(Action::PayForApi, "Paying", |_| {
            Err(WalletError::PreconditionFailed("Connect and deploy agent first".into()))
        });
        assert!(result.is_err());
        assert!(handle.read(|s| s.operation.busy));

        drop(guard);
        let op = handle.snapshot().operation;
        assert!(!op.busy);
        assert_eq!(op.last_error, "API payment failed: Connect and deploy agent first");
    }
}
