//! Error types for perpdex-core.

use thiserror::Error;

/// Core error types.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid symbol: {0}")]
    InvalidSymbol(String),

    #[error("Invalid interval: {0} (expected one of 1m, 5m, 15m, 1h, 4h, 1d, 1w)")]
    InvalidInterval(String),

    #[error("Invalid price '{0}': {1}")]
    InvalidPrice(String, rust_decimal::Error),

    #[error("Invalid size '{0}': {1}")]
    InvalidSize(String, rust_decimal::Error),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;
