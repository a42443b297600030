//! Deployment artifact: where the factory contract lives
//!
//! The artifact is a small JSON record `{ "factory": "0x…" }` written by
//! the factory deployment tool and read at startup. It is the only state
//! persisted to disk.

use crate::error::{Result, WalletError};
use crate::provider::WalletProvider;
use crate::types::TransactionRequest;
use alloy_primitives::{Address, Bytes};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default artifact location, relative to the working directory
pub const DEFAULT_ARTIFACT_PATH: &str = "deployed.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentArtifact {
    pub factory: Address,
}

impl DeploymentArtifact {
    pub fn new(factory: Address) -> Self {
        Self { factory }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            WalletError::Config(format!(
                "Failed to read deployment artifact {}: {}",
                path.display(),
                e
            ))
        })?;

        let artifact: Self = serde_json::from_str(&json).map_err(|e| {
            WalletError::Config(format!(
                "Failed to parse deployment artifact {}: {}",
                path.display(),
                e
            ))
        })?;

        tracing::debug!(path = %path.display(), factory = %artifact.factory, "Deployment artifact loaded");
        Ok(artifact)
    }

    /// Write the artifact atomically (temp file, then rename)
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let tmp_path = path.with_extension("tmp");

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                WalletError::Config(format!(
                    "Failed to create artifact directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        std::fs::write(&tmp_path, json).map_err(|e| {
            WalletError::Config(format!(
                "Failed to write artifact {}: {}",
                tmp_path.display(),
                e
            ))
        })?;

        std::fs::rename(&tmp_path, path).map_err(|e| {
            WalletError::Config(format!(
                "Failed to rename artifact {} → {}: {}",
                tmp_path.display(),
                path.display(),
                e
            ))
        })?;

        tracing::debug!(path = %path.display(), "Deployment artifact saved");
        Ok(())
    }
}

/// Extract creation bytecode from a compiler output file
///
/// Accepts bare hex (with or without `0x`) or a JSON artifact whose
/// `bytecode` field is either a hex string or an object with `object`.
pub fn parse_bytecode(raw: &str) -> Result<Bytes> {
    let trimmed = raw.trim();
    let hex_text = if trimmed.starts_with('{') {
        let value: serde_json::Value = serde_json::from_str(trimmed)?;
        let field = &value["bytecode"];
        field
            .as_str()
            .or_else(|| field["object"].as_str())
            .ok_or_else(|| WalletError::Config("artifact has no bytecode field".to_string()))?
            .to_string()
    } else {
        trimmed.to_string()
    };

    let digits = hex_text.strip_prefix("0x").unwrap_or(&hex_text);
    if digits.is_empty() {
        return Err(WalletError::Config("bytecode is empty".to_string()));
    }
    let bytes = hex::decode(digits)
        .map_err(|e| WalletError::Config(format!("bytecode is not valid hex: {}", e)))?;
    Ok(Bytes::from(bytes))
}

/// Deploy the factory contract and record its address
///
/// Sends from the first authorized account and waits for the receipt
/// without a deadline.
pub async fn deploy_factory(
    provider: &dyn WalletProvider,
    bytecode: Bytes,
    artifact_path: &Path,
) -> Result<Address> {
    let deployer = provider
        .request_accounts()
        .await?
        .first()
        .copied()
        .ok_or_else(|| WalletError::ConnectionFailed("wallet returned no accounts".to_string()))?;

    tracing::info!(deployer = %deployer, size = bytecode.len(), "Deploying factory");
    let tx = provider
        .send_transaction(TransactionRequest::create(bytecode).with_from(deployer))
        .await?;
    let receipt = provider.wait_for_confirmation(tx).await?;
    if !receipt.success {
        return Err(WalletError::TransactionFailed("transaction reverted".to_string()));
    }

    let factory = receipt.contract_address.ok_or_else(|| {
        WalletError::Decode(format!("receipt for {} has no contract address", tx))
    })?;

    DeploymentArtifact::new(factory).save(artifact_path)?;
    tracing::info!(factory = %factory, path = %artifact_path.display(), "Factory deployed");
    Ok(factory)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::ContractCall;
    use crate::provider::memory::MemoryChain;

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("deployed.json");
        let artifact = DeploymentArtifact::new(Address::repeat_byte(0xfa));

        artifact.save(&path).unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("tmp").exists());

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("\"factory\""));
        assert_eq!(DeploymentArtifact::load(&path).unwrap(), artifact);
    }

    #[test]
    fn test_load_missing_or_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");
        assert!(matches!(
            DeploymentArtifact::load(&missing),
            Err(WalletError::Config(_))
        ));

        let bad = dir.path().join("bad.json");
        std::fs::write(&bad, r#"{"factory": "nope"}"#).unwrap();
        assert!(DeploymentArtifact::load(&bad).is_err());
    }

    #[test]
    fn test_parse_bytecode_formats() {
        assert_eq!(parse_bytecode("0x6080\n").unwrap().to_vec(), vec![0x60, 0x80]);
        assert_eq!(parse_bytecode("6080").unwrap().len(), 2);
        assert_eq!(
            parse_bytecode(r#"{"bytecode": "0x6080"}"#).unwrap().to_vec(),
            vec![0x60, 0x80]
        );
        assert_eq!(
            parse_bytecode(r#"{"bytecode": {"object": "0x60806040"}}"#).unwrap().len(),
            4
        );

        assert!(parse_bytecode("0x").is_err());
        assert!(parse_bytecode("0xzz").is_err());
        assert!(parse_bytecode(r#"{"abi": []}"#).is_err());
    }

    #[tokio::test]
    async fn test_deploy_factory_writes_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deployed.json");
        let chain = MemoryChain::default();

        let factory = deploy_factory(&chain, Bytes::from(vec![0x60, 0x80]), &path)
            .await
            .unwrap();

        assert_eq!(DeploymentArtifact::load(&path).unwrap().factory, factory);
        assert!(chain.call(factory, &ContractCall::GetDeployedAgents).await.is_ok());
    }

    #[tokio::test]
    async fn test_deploy_factory_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deployed.json");
        let chain = MemoryChain::default();
        chain.reject_next_submission("user rejected transaction");

        let err = deploy_factory(&chain, Bytes::from(vec![0x60]), &path)
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::TransactionFailed(_)));
        assert!(!path.exists());
    }
}
