//! Contract gateway for the perpdex client.
//!
//! Every on-chain call goes through [`ContractGateway::invoke`], which checks
//! the method and its arguments against an [`InterfaceDescriptor`] before
//! anything is sent over the [`RpcTransport`].
//!
//! # Key Components
//!
//! - [`InterfaceDescriptor`]: base64 JSON method table, builds call payloads
//! - [`ContractValue`]: typed arguments and results
//! - [`HttpRpcTransport`] / [`MockRpcTransport`]: JSON-RPC 2.0 and test transports
//! - [`PositionManagerClient`]: typed position manager and order calls
//! - [`LiquidityPoolClient`]: deposits, withdrawals and share queries
//! - [`TradeService`]: validate, submit, then record in the [`PositionBook`]

pub mod descriptor;
pub mod error;
pub mod gateway;
pub mod liquidity_pool;
pub mod position_manager;
pub mod trade;
pub mod transport;
pub mod value;

pub use descriptor::{EncodedCall, FieldSpec, InterfaceDescriptor, MethodSpec};
pub use error::{ContractError, ContractResult, RPC_TRY_AGAIN_LATER};
pub use gateway::ContractGateway;
pub use liquidity_pool::LiquidityPoolClient;
pub use position_manager::{
    LimitOrderParams, Order, OrderKind, Position, PositionManagerClient, TriggerOrderParams,
};
pub use trade::{
    OpenedPosition, PlacedOrder, PositionBook, SyncOutcome, TradeError, TradeService,
    DEFAULT_EXECUTION_FEE, DEFAULT_TOKEN_DECIMALS, FULL_CLOSE_BPS,
};
pub use transport::{
    BoxFuture, DynRpcTransport, HttpRpcTransport, MockRpcTransport, RpcTransport,
    DEFAULT_RPC_TIMEOUT,
};
pub use value::{is_strkey_address, ArgType, ContractValue};
