//! Typed client for the liquidity pool contract.
//!
//! Amounts and shares are signed token base units, as the pool reports them.

use crate::error::{ContractError, ContractResult};
use crate::gateway::ContractGateway;
use crate::value::ContractValue;
use tracing::info;

#[derive(Clone)]
pub struct LiquidityPoolClient {
    gateway: ContractGateway,
}

impl LiquidityPoolClient {
    pub fn new(gateway: ContractGateway) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &ContractGateway {
        &self.gateway
    }

    /// Deposit `amount` and return the shares minted.
    pub async fn deposit(&self, user: &str, amount: i128) -> ContractResult<i128> {
        check_positive("deposit", "amount", amount)?;
        let shares = self.user_call("deposit", user, Some(amount)).await?;
        info!(amount, shares, "Liquidity deposited");
        Ok(shares)
    }

    /// Burn `shares` and return the amount paid out.
    pub async fn withdraw(&self, user: &str, shares: i128) -> ContractResult<i128> {
        check_positive("withdraw", "shares", shares)?;
        let amount = self.user_call("withdraw", user, Some(shares)).await?;
        info!(shares, amount, "Liquidity withdrawn");
        Ok(amount)
    }

    pub async fn get_shares(&self, user: &str) -> ContractResult<i128> {
        self.user_call("get_shares", user, None).await
    }

    pub async fn get_total_shares(&self) -> ContractResult<i128> {
        self.pool_call("get_total_shares").await
    }

    pub async fn get_total_deposits(&self) -> ContractResult<i128> {
        self.pool_call("get_total_deposits").await
    }

    async fn user_call(&self, method: &str, user: &str, amount: Option<i128>) -> ContractResult<i128> {
        let mut args = vec![ContractValue::Address(user.to_string())];
        args.extend(amount.map(ContractValue::I128));
        let value = self.gateway.invoke(method, args).await?;
        i128_result(method, &value)
    }

    async fn pool_call(&self, method: &str) -> ContractResult<i128> {
        let value = self.gateway.invoke(method, Vec::new()).await?;
        i128_result(method, &value)
    }
}

/// The pool rejects non-positive amounts; catch them before a round trip.
fn check_positive(method: &str, name: &str, value: i128) -> ContractResult<()> {
    if value > 0 {
        Ok(())
    } else {
        Err(ContractError::invalid_arguments(
            method,
            format!("{name}: must be positive, got {value}"),
        ))
    }
}

fn i128_result(method: &str, value: &ContractValue) -> ContractResult<i128> {
    value
        .as_i128()
        .ok_or_else(|| ContractError::Decode(format!("{method} returned {}", value.type_tag())))
}
