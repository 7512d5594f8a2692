//! Registry error types.

use std::path::PathBuf;
use thiserror::Error;

/// Deployment configuration problems.
///
/// Loading never fails outright: these are collected as issues next to a
/// (possibly partial or empty) registry. Only [`ConfigurationError::MissingRole`]
/// is returned directly, when a caller requires an address that is not set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("Deployment file not found: {}", path.display())]
    MissingFile { path: PathBuf },

    #[error("Malformed deployment file {}: {reason}", path.display())]
    Malformed { path: PathBuf, reason: String },

    #[error("Unknown contract role: {0}")]
    UnknownRole(String),

    #[error("Invalid address for {role}: {reason}")]
    InvalidAddress { role: String, reason: String },

    #[error("No {role} contract configured for {network}")]
    MissingRole { role: String, network: String },
}

pub type RegistryResult<T> = Result<T, ConfigurationError>;
