//! Connection manager: obtains the (account, signer, read provider) triple

use crate::error::{Result, WalletError};
use crate::provider::WalletProvider;
use crate::state::{StateHandle, Transition};
use crate::types::Action;
use crate::units::shorten_address;
use alloy_primitives::Address;
use std::sync::Arc;

/// Detects the wallet capability and establishes the session
pub struct ConnectionManager {
    provider: Option<Arc<dyn WalletProvider>>,
    state: StateHandle,
}

impl ConnectionManager {
    /// `provider` is `None` when no wallet capability was found
    pub fn new(provider: Option<Arc<dyn WalletProvider>>, state: StateHandle) -> Self {
        Self { provider, state }
    }

    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    /// Pick up an already-authorized session without prompting
    ///
    /// Returns whether a session was established. Failures are logged and
    /// reported as "not connected".
    pub async fn detect_existing(&self) -> bool {
        let Some(provider) = self.provider.clone() else {
            tracing::debug!("No wallet provider present");
            return false;
        };
        self.state.apply(Transition::ProviderDetected(provider.clone()));

        match provider.accounts().await {
            Ok(accounts) => match accounts.first() {
                Some(&account) => {
                    tracing::info!(account = %account, provider = provider.name(), "Restored authorized session");
                    self.state.apply(Transition::Connected { provider, account });
                    true
                }
                None => false,
            },
            Err(e) => {
                tracing::debug!(error = %e, "Authorized-account lookup failed");
                false
            }
        }
    }

    /// Prompt the wallet for authorization and populate the session
    pub async fn connect(&self) -> Result<Address> {
        let (_guard, provider) =
            self.state
                .begin(Action::Connect, "Connecting wallet...", |_| {
                    self.provider.clone().ok_or(WalletError::ProviderUnavailable)
                })?;

        match self.authorize(provider.as_ref()).await {
            Ok(account) => {
                tracing::info!(account = %account, provider = provider.name(), "Wallet connected");
                self.state.apply(Transition::Connected { provider, account });
                self.state.apply(Transition::Succeeded(format!(
                    "Connected: {}",
                    shorten_address(&account.to_string())
                )));
                Ok(account)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Wallet connection failed");
                self.state.apply(Transition::Failed(format!(
                    "{}: {}",
                    Action::Connect.failure_prefix(),
                    e
                )));
                Err(e)
            }
        }
    }

    async fn authorize(&self, provider: &dyn WalletProvider) -> Result<Address> {
        let accounts = provider.request_accounts().await.map_err(|e| match e {
            WalletError::ConnectionFailed(_) => e,
            other => WalletError::ConnectionFailed(other.to_string()),
        })?;
        accounts
            .first()
            .copied()
            .ok_or_else(|| WalletError::ConnectionFailed("wallet returned no accounts".to_string()))
    }
}
