//! Trade panel types and local validation.
//!
//! A trade form is validated entirely on the client before anything is
//! submitted to the position manager contract. Each rejection carries its own
//! user-facing message.

use crate::{Price, Size};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

/// Lowest leverage the trade panel offers.
pub const MIN_LEVERAGE: u32 = 5;
/// Highest leverage the trade panel offers.
pub const MAX_LEVERAGE: u32 = 20;
/// Leverage presets shown in the panel.
pub const LEVERAGE_OPTIONS: [u32; 4] = [5, 10, 15, 20];
/// Fractional digits of on-chain prices.
pub const PRICE_DECIMALS: u32 = 7;

/// Position direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Long,
    Short,
}

impl TradeSide {
    pub fn is_long(&self) -> bool {
        matches!(self, Self::Long)
    }
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Long => write!(f, "long"),
            Self::Short => write!(f, "short"),
        }
    }
}

/// Client-side identifier for one trade submission, used to correlate logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TradeRequestId(Uuid);

impl TradeRequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TradeRequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TradeRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trade_{}", self.0.simple())
    }
}

/// Reasons a trade form is blocked before submission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TradeValidationError {
    #[error("Enter a collateral amount")]
    MissingCollateral,

    #[error("Collateral must be a positive number, got '{0}'")]
    InvalidCollateral(String),

    #[error("Leverage {requested}x is out of range: choose between {min}x and {max}x")]
    LeverageOutOfRange { requested: u32, min: u32, max: u32 },

    #[error("Insufficient balance: {required} required, {available} available")]
    InsufficientBalance { required: Size, available: Size },
}

/// Raw trade panel input.
///
/// Collateral is kept as the text the user typed so that an empty field and a
/// malformed number produce different messages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeForm {
    pub market_id: u32,
    pub side: TradeSide,
    pub collateral: String,
    pub leverage: u32,
}

/// A trade form that passed local validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedTrade {
    pub request_id: TradeRequestId,
    pub market_id: u32,
    pub side: TradeSide,
    pub collateral: Size,
    pub leverage: u32,
    /// Position size: collateral * leverage.
    pub size: Size,
}

impl TradeForm {
    /// Validate against the wallet balance.
    ///
    /// Checks run in panel order: collateral presence, collateral format,
    /// leverage bounds, then balance.
    pub fn validate(&self, balance: Size) -> Result<ValidatedTrade, TradeValidationError> {
        let raw = self.collateral.trim();
        if raw.is_empty() {
            return Err(TradeValidationError::MissingCollateral);
        }

        let collateral: Size = raw
            .parse()
            .map_err(|_| TradeValidationError::InvalidCollateral(raw.to_string()))?;
        if !collateral.is_positive() {
            return Err(TradeValidationError::InvalidCollateral(raw.to_string()));
        }

        if !(MIN_LEVERAGE..=MAX_LEVERAGE).contains(&self.leverage) {
            return Err(TradeValidationError::LeverageOutOfRange {
                requested: self.leverage,
                min: MIN_LEVERAGE,
                max: MAX_LEVERAGE,
            });
        }

        if collateral > balance {
            return Err(TradeValidationError::InsufficientBalance {
                required: collateral,
                available: balance,
            });
        }

        Ok(ValidatedTrade {
            request_id: TradeRequestId::new(),
            market_id: self.market_id,
            side: self.side,
            collateral,
            leverage: self.leverage,
            size: collateral * Decimal::from(self.leverage),
        })
    }
}

/// Convert a token amount into integer base units (`decimals` fractional digits).
///
/// Returns `None` for negative amounts, amounts with more precision than the
/// token supports, or values that overflow `u128`.
pub fn to_base_units(amount: Size, decimals: u32) -> Option<u128> {
    let value = amount.inner();
    if value.is_sign_negative() {
        return None;
    }
    let scaled = value.checked_mul(Decimal::from(10u64.checked_pow(decimals)?))?;
    if !scaled.fract().is_zero() {
        return None;
    }
    scaled.trunc().to_u128()
}

/// Inverse of [`to_base_units`]. `None` if `units` overflows a decimal.
pub fn from_base_units(units: u128, decimals: u32) -> Option<Size> {
    let units = i128::try_from(units).ok()?;
    Decimal::try_from_i128_with_scale(units, decimals)
        .ok()
        .map(|d| Size::new(d.normalize()))
}

/// Price from the contract's fixed-point form.
pub fn from_scaled_price(scaled: i128) -> Option<Price> {
    Decimal::try_from_i128_with_scale(scaled, PRICE_DECIMALS)
        .ok()
        .map(|d| Price::new(d.normalize()))
}

/// Convert a price into the contract's fixed-point form ([`PRICE_DECIMALS`]).
///
/// Returns `None` for non-positive prices or digits past the seventh decimal.
pub fn to_scaled_price(price: Price) -> Option<i128> {
    let value = price.inner();
    if value.is_sign_negative() || value.is_zero() {
        return None;
    }
    let scaled = value.checked_mul(Decimal::from(10u64.pow(PRICE_DECIMALS)))?;
    if !scaled.fract().is_zero() {
        return None;
    }
    scaled.trunc().to_i128()
}
