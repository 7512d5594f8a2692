//! Trade submission.
//!
//! [`TradeService`] validates the trade panel locally, submits through the
//! position manager, and records positions and orders in the local
//! [`PositionBook`] only after the contract reports success.

use crate::error::ContractError;
use crate::position_manager::{
    LimitOrderParams, Order, OrderKind, Position, PositionManagerClient, TriggerOrderParams,
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use perpdex_core::{
    from_base_units, from_scaled_price, to_base_units, to_scaled_price, Price, Size, TradeForm,
    TradeRequestId, TradeSide, TradeValidationError,
};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// Fractional digits of the collateral token.
pub const DEFAULT_TOKEN_DECIMALS: u32 = 7;
/// Keeper fee attached to each conditional order, in token base units.
pub const DEFAULT_EXECUTION_FEE: u128 = 1_000_000;
/// Close percentage meaning the whole position, in basis points.
pub const FULL_CLOSE_BPS: u32 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TradeError {
    #[error(transparent)]
    Validation(#[from] TradeValidationError),

    #[error("Collateral {0} cannot be expressed in token units")]
    Precision(Size),

    #[error("Amount {0} cannot be expressed in token units")]
    AmountPrecision(Size),

    #[error("Trigger price {0} must be positive with at most 7 decimals")]
    InvalidPrice(Price),

    #[error("Close percentage {0} bps is out of range: choose between 1 and 10000")]
    ClosePercentage(u32),

    #[error("Enter a collateral or size change")]
    EmptyAdjustment,

    #[error(transparent)]
    Contract(#[from] ContractError),

    #[error("Unknown position: {0}")]
    UnknownPosition(u64),

    #[error("Unknown order: {0}")]
    UnknownOrder(u64),
}

impl TradeError {
    /// Whether resubmitting may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Contract(e) => e.is_retryable(),
            _ => false,
        }
    }
}

/// A position opened from this client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedPosition {
    pub position_id: u64,
    pub request_id: TradeRequestId,
    pub market_id: u32,
    pub side: TradeSide,
    pub collateral: Size,
    pub leverage: u32,
    pub size: Size,
    pub opened_at: DateTime<Utc>,
}

/// A conditional order placed from this client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlacedOrder {
    pub order_id: u64,
    pub kind: OrderKind,
    pub market_id: u32,
    /// Position the order closes; `None` for limit orders.
    pub position_id: Option<u64>,
    pub trigger_price: Price,
    pub placed_at: DateTime<Utc>,
}

/// Positions and pending orders this client placed.
#[derive(Debug, Default)]
pub struct PositionBook {
    positions: RwLock<BTreeMap<u64, OpenedPosition>>,
    orders: RwLock<BTreeMap<u64, PlacedOrder>>,
}

impl PositionBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, position: OpenedPosition) {
        self.positions.write().insert(position.position_id, position);
    }

    /// Remove a position along with the orders attached to it.
    pub fn remove(&self, position_id: u64) -> Option<OpenedPosition> {
        self.orders
            .write()
            .retain(|_, order| order.position_id != Some(position_id));
        self.positions.write().remove(&position_id)
    }

    /// Apply `change` to a recorded position and return the result.
    pub fn update(
        &self,
        position_id: u64,
        change: impl FnOnce(&mut OpenedPosition),
    ) -> Option<OpenedPosition> {
        let mut positions = self.positions.write();
        let position = positions.get_mut(&position_id)?;
        change(position);
        Some(position.clone())
    }

    pub fn record_order(&self, order: PlacedOrder) {
        self.orders.write().insert(order.order_id, order);
    }

    pub fn remove_order(&self, order_id: u64) -> Option<PlacedOrder> {
        self.orders.write().remove(&order_id)
    }

    pub fn order(&self, order_id: u64) -> Option<PlacedOrder> {
        self.orders.read().get(&order_id).cloned()
    }

    /// Pending orders, by ID.
    pub fn orders(&self) -> Vec<PlacedOrder> {
        self.orders.read().values().cloned().collect()
    }

    pub fn get(&self, position_id: u64) -> Option<OpenedPosition> {
        self.positions.read().get(&position_id).cloned()
    }

    /// All positions, by ID.
    pub fn positions(&self) -> Vec<OpenedPosition> {
        self.positions.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.positions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.read().is_empty()
    }
}

/// Entries added to the book by [`TradeService::sync`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub positions: usize,
    pub orders: usize,
}

pub struct TradeService {
    client: PositionManagerClient,
    trader: String,
    token_decimals: u32,
    execution_fee: u128,
    book: Arc<PositionBook>,
}

impl TradeService {
    pub fn new(client: PositionManagerClient, trader: impl Into<String>, book: Arc<PositionBook>) -> Self {
        Self {
            client,
            trader: trader.into(),
            token_decimals: DEFAULT_TOKEN_DECIMALS,
            execution_fee: DEFAULT_EXECUTION_FEE,
            book,
        }
    }

    pub fn with_token_decimals(mut self, decimals: u32) -> Self {
        self.token_decimals = decimals;
        self
    }

    pub fn with_execution_fee(mut self, fee: u128) -> Self {
        self.execution_fee = fee;
        self
    }

    pub fn book(&self) -> &Arc<PositionBook> {
        &self.book
    }

    pub fn trader(&self) -> &str {
        &self.trader
    }

    /// Validate and submit a trade form.
    ///
    /// Validation failures never reach the contract. The position book is
    /// updated only when the contract returns a position ID.
    pub async fn open_position(
        &self,
        form: &TradeForm,
        balance: Size,
    ) -> Result<OpenedPosition, TradeError> {
        let trade = form.validate(balance).map_err(|e| {
            warn!(market_id = form.market_id, error = %e, "Trade form rejected");
            e
        })?;
        let collateral_units = to_base_units(trade.collateral, self.token_decimals)
            .ok_or(TradeError::Precision(trade.collateral))?;

        info!(
            request_id = %trade.request_id,
            market_id = trade.market_id,
            side = %trade.side,
            collateral = %trade.collateral,
            leverage = trade.leverage,
            "Submitting trade"
        );

        let position_id = self
            .client
            .open_position(
                &self.trader,
                trade.market_id,
                collateral_units,
                trade.leverage,
                trade.side.is_long(),
            )
            .await
            .map_err(|e| {
                warn!(
                    request_id = %trade.request_id,
                    error = %e,
                    retryable = e.is_retryable(),
                    "Trade submission failed"
                );
                e
            })?;

        let position = OpenedPosition {
            position_id,
            request_id: trade.request_id,
            market_id: trade.market_id,
            side: trade.side,
            collateral: trade.collateral,
            leverage: trade.leverage,
            size: trade.size,
            opened_at: Utc::now(),
        };
        self.book.record(position.clone());
        info!(position_id, request_id = %position.request_id, "Position opened");
        Ok(position)
    }

    /// Load the trader's open positions and pending orders from the contract.
    ///
    /// Entries already in the book are left alone.
    pub async fn sync(&self) -> Result<SyncOutcome, TradeError> {
        let mut outcome = SyncOutcome::default();

        for position_id in self.client.get_user_open_positions(&self.trader).await? {
            if self.book.get(position_id).is_some() {
                continue;
            }
            let position = self.client.get_position(position_id).await?;
            self.book.record(self.opened_from_chain(position_id, &position)?);
            outcome.positions += 1;
        }

        for order_id in self.client.get_user_orders(&self.trader).await? {
            if self.book.order(order_id).is_some() {
                continue;
            }
            let order = self.client.get_order(order_id).await?;
            self.book.record_order(placed_from_chain(&order)?);
            outcome.orders += 1;
        }

        info!(
            positions = outcome.positions,
            orders = outcome.orders,
            "Synced trader state from contract"
        );
        Ok(outcome)
    }

    fn opened_from_chain(
        &self,
        position_id: u64,
        position: &Position,
    ) -> Result<OpenedPosition, TradeError> {
        let amount = |units: u128| {
            from_base_units(units, self.token_decimals).ok_or_else(|| {
                ContractError::Decode(format!("position {position_id}: amount {units} out of range"))
            })
        };
        let leverage = position
            .size
            .checked_div(position.collateral)
            .and_then(|l| u32::try_from(l).ok())
            .unwrap_or(0);
        Ok(OpenedPosition {
            position_id,
            request_id: TradeRequestId::new(),
            market_id: position.market_id,
            side: if position.is_long {
                TradeSide::Long
            } else {
                TradeSide::Short
            },
            collateral: amount(position.collateral)?,
            leverage,
            size: amount(position.size)?,
            opened_at: unix_time(position.last_interaction),
        })
    }

    /// Close a position this client opened. Returns realized PnL in base units.
    pub async fn close_position(&self, position_id: u64) -> Result<i128, TradeError> {
        if self.book.get(position_id).is_none() {
            return Err(TradeError::UnknownPosition(position_id));
        }
        let pnl = self.client.close_position(&self.trader, position_id).await?;
        self.book.remove(position_id);
        info!(position_id, pnl, "Position closed");
        Ok(pnl)
    }

    /// Add collateral and/or size to a position this client opened.
    pub async fn increase_position(
        &self,
        position_id: u64,
        collateral: Size,
        size: Size,
    ) -> Result<OpenedPosition, TradeError> {
        let (collateral_units, size_units) = self.adjustment_units(position_id, collateral, size)?;
        self.client
            .increase_position(&self.trader, position_id, collateral_units, size_units)
            .await?;

        let updated = self
            .book
            .update(position_id, |p| {
                p.collateral = Size::new(p.collateral.inner() + collateral.inner());
                p.size = Size::new(p.size.inner() + size.inner());
            })
            .ok_or(TradeError::UnknownPosition(position_id))?;
        info!(position_id, collateral = %collateral, size = %size, "Position increased");
        Ok(updated)
    }

    /// Remove collateral and/or size from a position this client opened.
    ///
    /// A position reduced to zero size leaves the book.
    pub async fn decrease_position(
        &self,
        position_id: u64,
        collateral: Size,
        size: Size,
    ) -> Result<Option<OpenedPosition>, TradeError> {
        let (collateral_units, size_units) = self.adjustment_units(position_id, collateral, size)?;
        self.client
            .decrease_position(&self.trader, position_id, collateral_units, size_units)
            .await?;

        let updated = self
            .book
            .update(position_id, |p| {
                let remaining = |held: Size, removed: Size| {
                    Size::new((held.inner() - removed.inner()).max(Decimal::ZERO))
                };
                p.collateral = remaining(p.collateral, collateral);
                p.size = remaining(p.size, size);
            })
            .ok_or(TradeError::UnknownPosition(position_id))?;
        info!(position_id, collateral = %collateral, size = %size, "Position decreased");
        if updated.size.is_positive() {
            Ok(Some(updated))
        } else {
            self.book.remove(position_id);
            Ok(None)
        }
    }

    fn adjustment_units(
        &self,
        position_id: u64,
        collateral: Size,
        size: Size,
    ) -> Result<(u128, u128), TradeError> {
        if self.book.get(position_id).is_none() {
            return Err(TradeError::UnknownPosition(position_id));
        }
        let collateral_units = to_base_units(collateral, self.token_decimals)
            .ok_or(TradeError::AmountPrecision(collateral))?;
        let size_units =
            to_base_units(size, self.token_decimals).ok_or(TradeError::AmountPrecision(size))?;
        if collateral_units == 0 && size_units == 0 {
            return Err(TradeError::EmptyAdjustment);
        }
        Ok((collateral_units, size_units))
    }

    /// Validate a trade form and place it as a limit order at `trigger_price`.
    pub async fn create_limit_order(
        &self,
        form: &TradeForm,
        balance: Size,
        trigger_price: Price,
    ) -> Result<PlacedOrder, TradeError> {
        let trade = form.validate(balance).map_err(|e| {
            warn!(market_id = form.market_id, error = %e, "Limit order rejected");
            e
        })?;
        let collateral = to_base_units(trade.collateral, self.token_decimals)
            .ok_or(TradeError::Precision(trade.collateral))?;
        let trigger = to_scaled_price(trigger_price).ok_or(TradeError::InvalidPrice(trigger_price))?;

        let params = LimitOrderParams {
            market_id: trade.market_id,
            trigger_price: trigger,
            acceptable_price: 0,
            collateral,
            leverage: trade.leverage,
            is_long: trade.side.is_long(),
            execution_fee: self.execution_fee,
            expiration: 0,
        };
        let order_id = self.client.create_limit_order(&self.trader, &params).await?;

        let order = PlacedOrder {
            order_id,
            kind: OrderKind::Limit,
            market_id: trade.market_id,
            position_id: None,
            trigger_price,
            placed_at: Utc::now(),
        };
        self.book.record_order(order.clone());
        info!(order_id, request_id = %trade.request_id, trigger = %trigger_price, "Limit order placed");
        Ok(order)
    }

    /// Place a stop loss closing `close_bps` of a position.
    pub async fn create_stop_loss(
        &self,
        position_id: u64,
        trigger_price: Price,
        close_bps: u32,
    ) -> Result<PlacedOrder, TradeError> {
        self.create_trigger_order(OrderKind::StopLoss, position_id, trigger_price, close_bps)
            .await
    }

    /// Place a take profit closing `close_bps` of a position.
    pub async fn create_take_profit(
        &self,
        position_id: u64,
        trigger_price: Price,
        close_bps: u32,
    ) -> Result<PlacedOrder, TradeError> {
        self.create_trigger_order(OrderKind::TakeProfit, position_id, trigger_price, close_bps)
            .await
    }

    async fn create_trigger_order(
        &self,
        kind: OrderKind,
        position_id: u64,
        trigger_price: Price,
        close_bps: u32,
    ) -> Result<PlacedOrder, TradeError> {
        let position = self
            .book
            .get(position_id)
            .ok_or(TradeError::UnknownPosition(position_id))?;
        if close_bps == 0 || close_bps > FULL_CLOSE_BPS {
            return Err(TradeError::ClosePercentage(close_bps));
        }
        let trigger = to_scaled_price(trigger_price).ok_or(TradeError::InvalidPrice(trigger_price))?;

        let params = TriggerOrderParams {
            position_id,
            trigger_price: trigger,
            acceptable_price: 0,
            close_percentage: close_bps,
            execution_fee: self.execution_fee,
            expiration: 0,
        };
        let order_id = self
            .client
            .create_trigger_order(kind, &self.trader, &params)
            .await?;

        let order = PlacedOrder {
            order_id,
            kind,
            market_id: position.market_id,
            position_id: Some(position_id),
            trigger_price,
            placed_at: Utc::now(),
        };
        self.book.record_order(order.clone());
        info!(order_id, position_id, kind = %kind, trigger = %trigger_price, close_bps, "Order placed");
        Ok(order)
    }

    /// Cancel an order this client placed.
    pub async fn cancel_order(&self, order_id: u64) -> Result<PlacedOrder, TradeError> {
        if self.book.order(order_id).is_none() {
            return Err(TradeError::UnknownOrder(order_id));
        }
        self.client.cancel_order(&self.trader, order_id).await?;
        let order = self
            .book
            .remove_order(order_id)
            .ok_or(TradeError::UnknownOrder(order_id))?;
        info!(order_id, kind = %order.kind, "Order cancelled");
        Ok(order)
    }
}

fn placed_from_chain(order: &Order) -> Result<PlacedOrder, TradeError> {
    let trigger_price = from_scaled_price(order.trigger_price).ok_or_else(|| {
        ContractError::Decode(format!(
            "order {}: trigger price {} out of range",
            order.order_id, order.trigger_price
        ))
    })?;
    Ok(PlacedOrder {
        order_id: order.order_id,
        kind: order.kind,
        market_id: order.market_id,
        position_id: (order.kind != OrderKind::Limit).then_some(order.position_id),
        trigger_price,
        placed_at: unix_time(order.created_at),
    })
}

fn unix_time(secs: u64) -> DateTime<Utc> {
    i64::try_from(secs)
        .ok()
        .and_then(|s| DateTime::from_timestamp(s, 0))
        .unwrap_or_else(Utc::now)
}
