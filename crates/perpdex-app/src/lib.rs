//! perpdex client application.
//!
//! Wires the market data feed, deployment registry and contract gateway
//! together behind [`Application`], configured by [`AppConfig`].

pub mod app;
pub mod config;
pub mod error;
pub mod metrics_server;

pub use app::Application;
pub use config::AppConfig;
pub use error::{AppError, AppResult};
