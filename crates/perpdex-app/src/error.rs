//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Deployment error: {0}")]
    Deployment(#[from] perpdex_registry::ConfigurationError),

    #[error("Data source error: {0}")]
    DataSource(#[from] perpdex_feed::DataSourceError),

    #[error("Contract error: {0}")]
    Contract(#[from] perpdex_gateway::ContractError),

    #[error("Trade error: {0}")]
    Trade(#[from] perpdex_gateway::TradeError),

    #[error("Invalid input: {0}")]
    Core(#[from] perpdex_core::CoreError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] perpdex_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
