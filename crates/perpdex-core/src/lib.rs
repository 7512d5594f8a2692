//! Core domain types for the perpdex client.
//!
//! This crate provides fundamental types used throughout the client:
//! - `Candle`, `Ticker`: canonical market data records
//! - `Symbol`, `Interval`: stream and REST addressing
//! - `Price`, `Size`: precision-safe numeric types
//! - `TradeForm`: local validation of the leveraged trade panel

pub mod decimal;
pub mod error;
pub mod trade;
pub mod types;

pub use decimal::{Price, Size};
pub use error::{CoreError, Result};
pub use trade::{
    from_base_units, from_scaled_price, to_base_units, to_scaled_price, TradeForm,
    TradeRequestId, TradeSide, TradeValidationError, ValidatedTrade, LEVERAGE_OPTIONS,
    MAX_LEVERAGE, MIN_LEVERAGE, PRICE_DECIMALS,
};
pub use types::{Candle, Interval, Symbol, Ticker};
