use std::path::Path;
use std::time::Duration;

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WalletError};
use crate::units::parse_ether;

/// Operator-tunable parameters of the agent orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletConfig {
    /// Display name passed to `deployAgent` (default: "My AI Agent")
    #[serde(default = "default_agent_name")]
    pub agent_name: String,

    /// Ether sent to the agent by a deposit (default: 0.05)
    #[serde(default = "default_deposit_amount")]
    pub deposit_amount: String,

    /// Ether attached to a pay-for-API call (default: 0.01)
    #[serde(default = "default_api_payment_amount")]
    pub api_payment_amount: String,

    /// Ether the agent sends back to the owner (default: 0.005)
    #[serde(default = "default_transfer_amount")]
    pub transfer_amount: String,

    /// Draws below this value make the decision routine do nothing
    #[serde(default = "default_decision_threshold")]
    pub decision_threshold: f64,

    /// Give up waiting for a confirmation after this many seconds.
    /// Unset means wait indefinitely, which hangs on an unresponsive provider.
    #[serde(default)]
    pub confirmation_timeout_secs: Option<u64>,
}

fn default_agent_name() -> String {
    "My AI Agent".to_string()
}

fn default_deposit_amount() -> String {
    "0.05".to_string()
}

fn default_api_payment_amount() -> String {
    "0.01".to_string()
}

fn default_transfer_amount() -> String {
    "0.005".to_string()
}

fn default_decision_threshold() -> f64 {
    0.5
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            agent_name: default_agent_name(),
            deposit_amount: default_deposit_amount(),
            api_payment_amount: default_api_payment_amount(),
            transfer_amount: default_transfer_amount(),
            decision_threshold: default_decision_threshold(),
            confirmation_timeout_secs: None,
        }
    }
}

/// Amounts of a validated [`WalletConfig`], in wei
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Amounts {
    pub deposit: U256,
    pub api_payment: U256,
    pub transfer: U256,
}

impl WalletConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            WalletError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        let config: WalletConfig = toml::from_str(&content).map_err(|e| {
            WalletError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check every field and return the parsed amounts.
    pub fn validate(&self) -> Result<Amounts> {
        if self.agent_name.trim().is_empty() {
            return Err(WalletError::Config("agent_name must not be empty".to_string()));
        }
        if !(0.0..=1.0).contains(&self.decision_threshold) {
            return Err(WalletError::Config(format!(
                "decision_threshold must be within [0, 1], got {}",
                self.decision_threshold
            )));
        }
        if self.confirmation_timeout_secs == Some(0) {
            return Err(WalletError::Config(
                "confirmation_timeout_secs must be positive".to_string(),
            ));
        }
        Ok(Amounts {
            deposit: parse_ether(&self.deposit_amount)?,
            api_payment: parse_ether(&self.api_payment_amount)?,
            transfer: parse_ether(&self.transfer_amount)?,
        })
    }

    pub fn confirmation_timeout(&self) -> Option<Duration> {
        self.confirmation_timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = WalletConfig::default();
        assert_eq!(config.agent_name, "My AI Agent");
        assert_eq!(config.decision_threshold, 0.5);
        assert!(config.confirmation_timeout().is_none());

        let amounts = config.validate().unwrap();
        assert_eq!(amounts.deposit, U256::from(50_000_000_000_000_000u64));
        assert_eq!(amounts.api_payment, U256::from(10_000_000_000_000_000u64));
        assert_eq!(amounts.transfer, U256::from(5_000_000_000_000_000u64));
    }

    #[test]
    fn test_config_deserialize_partial() {
        let config: WalletConfig = toml::from_str(
            r#"
            agent_name = "Scout"
            confirmation_timeout_secs = 90
            "#,
        )
        .unwrap();
        assert_eq!(config.agent_name, "Scout");
        assert_eq!(config.deposit_amount, "0.05");
        assert_eq!(config.confirmation_timeout(), Some(Duration::from_secs(90)));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let bad_threshold = WalletConfig {
            decision_threshold: 1.5,
            ..Default::default()
        };
        assert!(bad_threshold.validate().is_err());

        let bad_amount = WalletConfig {
            deposit_amount: "five".into(),
            ..Default::default()
        };
        assert!(matches!(bad_amount.validate(), Err(WalletError::Config(_))));

        let zero_timeout = WalletConfig {
            confirmation_timeout_secs: Some(0),
            ..Default::default()
        };
        assert!(zero_timeout.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "transfer_amount = \"0.5\"").unwrap();

        let config = WalletConfig::from_file(file.path()).unwrap();
        assert_eq!(config.transfer_amount, "0.5");
        assert!(WalletConfig::from_file(Path::new("/nonexistent/wallet.toml")).is_err());
    }
}
