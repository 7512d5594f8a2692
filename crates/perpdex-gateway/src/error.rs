//! Gateway error types.

use thiserror::Error;

/// JSON-RPC error code the node returns when it is congested.
pub const RPC_TRY_AGAIN_LATER: i64 = -32005;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractError {
    #[error("Unknown contract method: {0}")]
    UnknownMethod(String),

    #[error("Invalid arguments for {method}: {reason}")]
    InvalidArguments { method: String, reason: String },

    #[error("Transport error: {0}")]
    Transport(String),

    /// The contract or node refused the call (insufficient balance, validation
    /// reject, paused market, congestion).
    #[error("Contract rejected call ({code}): {message}")]
    Rejected { code: i64, message: String },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Invalid interface descriptor: {0}")]
    Descriptor(String),
}

impl ContractError {
    pub fn invalid_arguments(method: &str, reason: impl Into<String>) -> Self {
        Self::InvalidArguments {
            method: method.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether resubmitting the same call may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Rejected { code, .. } => *code == RPC_TRY_AGAIN_LATER,
            _ => false,
        }
    }
}

pub type ContractResult<T> = Result<T, ContractError>;
