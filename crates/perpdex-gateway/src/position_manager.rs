//! Typed client for the position manager contract.

use crate::error::{ContractError, ContractResult};
use crate::gateway::ContractGateway;
use crate::value::ContractValue;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// On-chain position record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Position {
    pub trader: String,
    pub market_id: u32,
    /// Collateral in token base units.
    pub collateral: u128,
    /// Notional size in token base units.
    pub size: u128,
    pub is_long: bool,
    pub entry_price: i128,
    pub entry_funding_long: i128,
    pub entry_funding_short: i128,
    /// Unix seconds of the last interaction.
    pub last_interaction: u64,
    pub liquidation_price: i128,
}

impl Position {
    pub fn from_value(value: &ContractValue) -> ContractResult<Self> {
        Ok(Self {
            trader: field(value, "trader", |v| v.as_address().map(str::to_string))?,
            market_id: field(value, "market_id", ContractValue::as_u32)?,
            collateral: field(value, "collateral", ContractValue::as_u128)?,
            size: field(value, "size", ContractValue::as_u128)?,
            is_long: field(value, "is_long", ContractValue::as_bool)?,
            entry_price: field(value, "entry_price", ContractValue::as_i128)?,
            entry_funding_long: field(value, "entry_funding_long", ContractValue::as_i128)?,
            entry_funding_short: field(value, "entry_funding_short", ContractValue::as_i128)?,
            last_interaction: field(value, "last_interaction", ContractValue::as_u64)?,
            liquidation_price: field(value, "liquidation_price", ContractValue::as_i128)?,
        })
    }
}

/// Conditional order type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum OrderKind {
    /// Opens a position when the trigger price is reached.
    Limit,
    /// Closes part of a position to cap losses.
    StopLoss,
    /// Closes part of a position to lock in gains.
    TakeProfit,
}

impl OrderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Limit => "Limit",
            Self::StopLoss => "StopLoss",
            Self::TakeProfit => "TakeProfit",
        }
    }

    fn create_method(&self) -> &'static str {
        match self {
            Self::Limit => "create_limit_order",
            Self::StopLoss => "create_stop_loss",
            Self::TakeProfit => "create_take_profit",
        }
    }
}

impl fmt::Display for OrderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for OrderKind {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Limit" => Ok(Self::Limit),
            "StopLoss" => Ok(Self::StopLoss),
            "TakeProfit" => Ok(Self::TakeProfit),
            other => Err(ContractError::Decode(format!("unknown order type '{other}'"))),
        }
    }
}

/// On-chain conditional order record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Order {
    pub order_id: u64,
    pub kind: OrderKind,
    pub trader: String,
    pub market_id: u32,
    /// Zero for limit orders.
    pub position_id: u64,
    /// Trigger price, 1e7 scaled.
    pub trigger_price: i128,
    /// Worst accepted fill price, 1e7 scaled. Zero means no limit.
    pub acceptable_price: i128,
    pub collateral: u128,
    pub size: u128,
    pub leverage: u32,
    pub is_long: bool,
    /// Share of the position to close, in basis points.
    pub close_percentage: u32,
    pub execution_fee: u128,
    /// Unix seconds; zero never expires.
    pub expiration: u64,
    pub created_at: u64,
}

impl Order {
    pub fn from_value(value: &ContractValue) -> ContractResult<Self> {
        let kind: OrderKind = order_field(value, "order_type", |v| v.as_string().map(str::to_string))?
            .parse()?;
        Ok(Self {
            order_id: order_field(value, "order_id", ContractValue::as_u64)?,
            kind,
            trader: order_field(value, "trader", |v| v.as_address().map(str::to_string))?,
            market_id: order_field(value, "market_id", ContractValue::as_u32)?,
            position_id: order_field(value, "position_id", ContractValue::as_u64)?,
            trigger_price: order_field(value, "trigger_price", ContractValue::as_i128)?,
            acceptable_price: order_field(value, "acceptable_price", ContractValue::as_i128)?,
            collateral: order_field(value, "collateral", ContractValue::as_u128)?,
            size: order_field(value, "size", ContractValue::as_u128)?,
            leverage: order_field(value, "leverage", ContractValue::as_u32)?,
            is_long: order_field(value, "is_long", ContractValue::as_bool)?,
            close_percentage: order_field(value, "close_percentage", ContractValue::as_u32)?,
            execution_fee: order_field(value, "execution_fee", ContractValue::as_u128)?,
            expiration: order_field(value, "expiration", ContractValue::as_u64)?,
            created_at: order_field(value, "created_at", ContractValue::as_u64)?,
        })
    }
}

/// Arguments of `create_limit_order`, amounts in base units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LimitOrderParams {
    pub market_id: u32,
    pub trigger_price: i128,
    pub acceptable_price: i128,
    pub collateral: u128,
    pub leverage: u32,
    pub is_long: bool,
    pub execution_fee: u128,
    pub expiration: u64,
}

/// Arguments of `create_stop_loss` and `create_take_profit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerOrderParams {
    pub position_id: u64,
    pub trigger_price: i128,
    pub acceptable_price: i128,
    /// Basis points, 1..=10000.
    pub close_percentage: u32,
    pub execution_fee: u128,
    pub expiration: u64,
}

fn field<T>(
    value: &ContractValue,
    name: &str,
    extract: impl Fn(&ContractValue) -> Option<T>,
) -> ContractResult<T> {
    struct_field("Position", value, name, extract)
}

fn order_field<T>(
    value: &ContractValue,
    name: &str,
    extract: impl Fn(&ContractValue) -> Option<T>,
) -> ContractResult<T> {
    struct_field("Order", value, name, extract)
}

fn struct_field<T>(
    ty: &str,
    value: &ContractValue,
    name: &str,
    extract: impl Fn(&ContractValue) -> Option<T>,
) -> ContractResult<T> {
    value
        .field(name)
        .and_then(extract)
        .ok_or_else(|| ContractError::Decode(format!("{ty}.{name} missing or mistyped")))
}

fn u64_list(v: &ContractValue) -> Option<Vec<u64>> {
    v.as_vec()?.iter().map(ContractValue::as_u64).collect()
}

fn extract_result<T>(
    method: &str,
    value: ContractValue,
    extract: impl Fn(&ContractValue) -> Option<T>,
) -> ContractResult<T> {
    extract(&value).ok_or_else(|| {
        ContractError::Decode(format!("{method} returned {}", value.type_tag()))
    })
}

/// Position manager calls with Rust types in and out.
#[derive(Clone)]
pub struct PositionManagerClient {
    gateway: ContractGateway,
}

impl PositionManagerClient {
    pub fn new(gateway: ContractGateway) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &ContractGateway {
        &self.gateway
    }

    /// Returns the new position ID.
    pub async fn open_position(
        &self,
        trader: &str,
        market_id: u32,
        collateral: u128,
        leverage: u32,
        is_long: bool,
    ) -> ContractResult<u64> {
        let value = self
            .gateway
            .invoke(
                "open_position",
                vec![
                    ContractValue::Address(trader.to_string()),
                    ContractValue::U32(market_id),
                    ContractValue::U128(collateral),
                    ContractValue::U32(leverage),
                    ContractValue::Bool(is_long),
                ],
            )
            .await?;
        extract_result("open_position", value, ContractValue::as_u64)
    }

    /// Returns realized PnL in base units.
    pub async fn close_position(&self, trader: &str, position_id: u64) -> ContractResult<i128> {
        let value = self
            .gateway
            .invoke(
                "close_position",
                vec![
                    ContractValue::Address(trader.to_string()),
                    ContractValue::U64(position_id),
                ],
            )
            .await?;
        extract_result("close_position", value, ContractValue::as_i128)
    }

    pub async fn get_position(&self, position_id: u64) -> ContractResult<Position> {
        let value = self
            .gateway
            .invoke("get_position", vec![ContractValue::U64(position_id)])
            .await?;
        Position::from_value(&value)
    }

    pub async fn get_user_open_positions(&self, trader: &str) -> ContractResult<Vec<u64>> {
        let value = self
            .gateway
            .invoke(
                "get_user_open_positions",
                vec![ContractValue::Address(trader.to_string())],
            )
            .await?;
        extract_result("get_user_open_positions", value, u64_list)
    }

    /// Unrealized PnL in base units.
    pub async fn calculate_pnl(&self, position_id: u64) -> ContractResult<i128> {
        let value = self
            .gateway
            .invoke("calculate_pnl", vec![ContractValue::U64(position_id)])
            .await?;
        extract_result("calculate_pnl", value, ContractValue::as_i128)
    }

    /// Add collateral and/or size to an open position.
    pub async fn increase_position(
        &self,
        trader: &str,
        position_id: u64,
        additional_collateral: u128,
        additional_size: u128,
    ) -> ContractResult<()> {
        self.adjust_position(
            "increase_position",
            trader,
            position_id,
            additional_collateral,
            additional_size,
        )
        .await
    }

    /// Remove collateral and/or size from an open position, realizing PnL pro rata.
    pub async fn decrease_position(
        &self,
        trader: &str,
        position_id: u64,
        collateral_to_remove: u128,
        size_to_reduce: u128,
    ) -> ContractResult<()> {
        self.adjust_position(
            "decrease_position",
            trader,
            position_id,
            collateral_to_remove,
            size_to_reduce,
        )
        .await
    }

    async fn adjust_position(
        &self,
        method: &str,
        trader: &str,
        position_id: u64,
        collateral: u128,
        size: u128,
    ) -> ContractResult<()> {
        let value = self
            .gateway
            .invoke(
                method,
                vec![
                    ContractValue::Address(trader.to_string()),
                    ContractValue::U64(position_id),
                    ContractValue::U128(collateral),
                    ContractValue::U128(size),
                ],
            )
            .await?;
        extract_result(method, value, ContractValue::as_void)
    }

    /// Returns the new order ID.
    pub async fn create_limit_order(
        &self,
        trader: &str,
        params: &LimitOrderParams,
    ) -> ContractResult<u64> {
        let method = OrderKind::Limit.create_method();
        let value = self
            .gateway
            .invoke(
                method,
                vec![
                    ContractValue::Address(trader.to_string()),
                    ContractValue::U32(params.market_id),
                    ContractValue::I128(params.trigger_price),
                    ContractValue::I128(params.acceptable_price),
                    ContractValue::U128(params.collateral),
                    ContractValue::U32(params.leverage),
                    ContractValue::Bool(params.is_long),
                    ContractValue::U128(params.execution_fee),
                    ContractValue::U64(params.expiration),
                ],
            )
            .await?;
        extract_result(method, value, ContractValue::as_u64)
    }

    /// Returns the new order ID.
    pub async fn create_stop_loss(
        &self,
        trader: &str,
        params: &TriggerOrderParams,
    ) -> ContractResult<u64> {
        self.create_trigger_order(OrderKind::StopLoss, trader, params).await
    }

    /// Returns the new order ID.
    pub async fn create_take_profit(
        &self,
        trader: &str,
        params: &TriggerOrderParams,
    ) -> ContractResult<u64> {
        self.create_trigger_order(OrderKind::TakeProfit, trader, params).await
    }

    pub(crate) async fn create_trigger_order(
        &self,
        kind: OrderKind,
        trader: &str,
        params: &TriggerOrderParams,
    ) -> ContractResult<u64> {
        let method = kind.create_method();
        let value = self
            .gateway
            .invoke(
                method,
                vec![
                    ContractValue::Address(trader.to_string()),
                    ContractValue::U64(params.position_id),
                    ContractValue::I128(params.trigger_price),
                    ContractValue::I128(params.acceptable_price),
                    ContractValue::U32(params.close_percentage),
                    ContractValue::U128(params.execution_fee),
                    ContractValue::U64(params.expiration),
                ],
            )
            .await?;
        extract_result(method, value, ContractValue::as_u64)
    }

    /// Cancel a pending order. The contract refunds the execution fee.
    pub async fn cancel_order(&self, trader: &str, order_id: u64) -> ContractResult<()> {
        let value = self
            .gateway
            .invoke(
                "cancel_order",
                vec![
                    ContractValue::Address(trader.to_string()),
                    ContractValue::U64(order_id),
                ],
            )
            .await?;
        extract_result("cancel_order", value, ContractValue::as_void)
    }

    pub async fn get_order(&self, order_id: u64) -> ContractResult<Order> {
        let value = self
            .gateway
            .invoke("get_order", vec![ContractValue::U64(order_id)])
            .await?;
        Order::from_value(&value)
    }

    /// IDs of the trader's pending orders.
    pub async fn get_user_orders(&self, trader: &str) -> ContractResult<Vec<u64>> {
        let value = self
            .gateway
            .invoke("get_user_orders", vec![ContractValue::Address(trader.to_string())])
            .await?;
        extract_result("get_user_orders", value, u64_list)
    }
}
