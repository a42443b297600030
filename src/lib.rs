//! # a3s-agent-wallet
//!
//! Operator client for autonomous on-chain agent wallets.
//!
//! ## Overview
//!
//! `a3s-agent-wallet` connects a wallet, deploys a dedicated agent contract
//! through a factory, funds it, and drives agent-initiated payments and
//! transfers. A stand-in decision routine occasionally spends on the
//! agent's behalf through the same transaction protocol.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use a3s_agent_wallet::{AgentWallet, WalletConfig};
//! use a3s_agent_wallet::provider::memory::MemoryChain;
//! use a3s_agent_wallet::provider::WalletProvider;
//!
//! # async fn example() -> a3s_agent_wallet::Result<()> {
//! let chain = Arc::new(MemoryChain::default());
//! let factory = chain.install_factory();
//! let provider: Arc<dyn WalletProvider> = chain;
//!
//! let wallet = AgentWallet::new(Some(provider), Some(factory), WalletConfig::default())?;
//! wallet.connection().connect().await?;
//!
//! let deployed = wallet.orchestrator().deploy_agent().await?;
//! println!("{}", deployed.status);
//!
//! wallet.orchestrator().deposit().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Providers
//!
//! - **memory**: in-process simulated chain for tests and demos
//! - **rpc**: Ethereum JSON-RPC node with node-managed accounts
//!
//! ## Architecture
//!
//! - **WalletProvider** trait: the injected wallet capability
//! - **StateHandle**: shared state, changed only through `Transition`s
//! - **ConnectionManager**: session detection and authorization
//! - **AgentOrchestrator**: the agent lifecycle and its transaction protocol

pub mod abi;
pub mod artifact;
pub mod client;
pub mod config;
pub mod connection;
pub mod decision;
pub mod error;
pub mod orchestrator;
pub mod provider;
pub mod state;
pub mod types;
pub mod units;

// Re-export core types
pub use client::AgentWallet;
pub use config::{Amounts, WalletConfig};
pub use connection::ConnectionManager;
pub use decision::{Decision, FixedRandom, RandomSource, StdRandom};
pub use error::{ErrorKind, Result, WalletError};
pub use orchestrator::{AgentOrchestrator, DecisionReport, OperationReport};
pub use provider::{Signer, WalletProvider};
pub use state::{AgentRef, AppState, Notice, OperationState, Session, StateHandle, Transition};
pub use types::{Action, PostAction, TransactionReceipt, TransactionRequest, TxHash};

// Re-export providers for convenience
pub use provider::memory::{MemoryChain, MemoryConfig};
pub use provider::rpc::{RpcConfig, RpcProvider};
