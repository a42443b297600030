//! Agent wallet client
//!
//! High-level entry point that wires the shared state, the connection
//! manager and the agent orchestrator to one wallet provider.

use crate::config::WalletConfig;
use crate::connection::ConnectionManager;
use crate::decision::RandomSource;
use crate::error::Result;
use crate::orchestrator::AgentOrchestrator;
use crate::provider::WalletProvider;
use crate::state::{AppState, StateHandle};
use alloy_primitives::Address;
use std::sync::Arc;

/// One operator session against one wallet provider
pub struct AgentWallet {
    state: StateHandle,
    connection: ConnectionManager,
    orchestrator: AgentOrchestrator,
}

impl AgentWallet {
    /// Create a client; `provider` is `None` when no wallet is available
    pub fn new(
        provider: Option<Arc<dyn WalletProvider>>,
        factory: Option<Address>,
        config: WalletConfig,
    ) -> Result<Self> {
        let state = StateHandle::new();
        let connection = ConnectionManager::new(provider, state.clone());
        let orchestrator = AgentOrchestrator::new(state.clone(), factory, config)?;
        Ok(Self {
            state,
            connection,
            orchestrator,
        })
    }

    pub fn with_random_source(mut self, source: Box<dyn RandomSource>) -> Self {
        self.orchestrator = self.orchestrator.with_random_source(source);
        self
    }

    /// Startup hook: restore an already-authorized session
    pub async fn start(&self) -> bool {
        let restored = self.connection.detect_existing().await;
        if restored {
            tracing::info!(account = %self.state.read(|s| s.account_display()), "Session restored");
        }
        restored
    }

    pub fn connection(&self) -> &ConnectionManager {
        &self.connection
    }

    pub fn orchestrator(&self) -> &AgentOrchestrator {
        &self.orchestrator
    }

    pub fn state(&self) -> &StateHandle {
        &self.state
    }

    pub fn snapshot(&self) -> AppState {
        self.state.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::FixedRandom;
    use crate::provider::memory::MemoryChain;

    #[tokio::test]
    async fn test_start_restores_preauthorized_session() {
        let chain = Arc::new(MemoryChain::preauthorized());
        let factory = chain.install_factory();
        let provider: Arc<dyn WalletProvider> = chain;
        let wallet = AgentWallet::new(Some(provider), Some(factory), WalletConfig::default()).unwrap();

        assert!(wallet.start().await);
        assert!(wallet.snapshot().can_deploy());
    }

    #[tokio::test]
    async fn test_components_share_state() {
        let chain = Arc::new(MemoryChain::default());
        let factory = chain.install_factory();
        let provider: Arc<dyn WalletProvider> = chain;
        let wallet = AgentWallet::new(Some(provider), Some(factory), WalletConfig::default())
            .unwrap()
            .with_random_source(Box::new(FixedRandom::always(0.1)));

        assert!(!wallet.start().await);
        wallet.connection().connect().await.unwrap();
        let report = wallet.orchestrator().deploy_agent().await.unwrap();

        assert_eq!(wallet.snapshot().agent.address(), report.agent);
        assert!(wallet.snapshot().can_operate());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = WalletConfig {
            api_payment_amount: "lots".into(),
            ..Default::default()
        };
        assert!(AgentWallet::new(None, None, config).is_err());
    }
}
