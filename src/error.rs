//! Error types for a3s-agent-wallet

use thiserror::Error;

/// Errors that can occur while driving a wallet session or an agent contract
#[derive(Debug, Error)]
pub enum WalletError {
    /// No wallet capability was detected
    #[error("No wallet provider detected. Install a wallet (or start a local node) and retry.")]
    ProviderUnavailable,

    /// Account authorization was rejected or errored
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// An operation was invoked without its required state
    ///
    /// Raised before any network call is made.
    #[error("{0}")]
    PreconditionFailed(String),

    /// Submission or confirmation of a chain transaction failed
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Confirmation did not arrive within the configured timeout
    #[error("Transaction {tx} not confirmed within {secs}s")]
    TransactionTimeout { tx: String, secs: u64 },

    /// A read-only call failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// A call result, event, or receipt could not be decoded
    #[error("Decode error: {0}")]
    Decode(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification of a [`WalletError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    ProviderUnavailable,
    ConnectionFailed,
    PreconditionFailed,
    TransactionFailed,
    TransactionTimeout,
    QueryFailed,
    Decode,
    Config,
    Io,
}

impl WalletError {
    /// Stable kind for callers that branch on the failure class
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::ProviderUnavailable => ErrorKind::ProviderUnavailable,
            Self::ConnectionFailed(_) => ErrorKind::ConnectionFailed,
            Self::PreconditionFailed(_) => ErrorKind::PreconditionFailed,
            Self::TransactionFailed(_) => ErrorKind::TransactionFailed,
            Self::TransactionTimeout { .. } => ErrorKind::TransactionTimeout,
            Self::QueryFailed(_) => ErrorKind::QueryFailed,
            Self::Decode(_) => ErrorKind::Decode,
            Self::Config(_) => ErrorKind::Config,
            Self::Serialization(_) => ErrorKind::Decode,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    /// True when the operation was refused before touching the network
    pub fn is_precondition(&self) -> bool {
        matches!(self, Self::PreconditionFailed(_))
    }
}

/// Result type alias for wallet operations
pub type Result<T> = std::result::Result<T, WalletError>;
