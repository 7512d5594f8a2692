//! Networks and contract roles.

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Target network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Testnet,
    Mainnet,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Testnet => "testnet",
            Self::Mainnet => "mainnet",
        }
    }

    /// Deployment document file name, e.g. `testnet.json`.
    pub fn file_name(&self) -> String {
        format!("{}.json", self.as_str())
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "testnet" => Ok(Self::Testnet),
            "mainnet" => Ok(Self::Mainnet),
            other => Err(format!("unknown network '{other}' (expected testnet or mainnet)")),
        }
    }
}

/// Deployed contract the client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractRole {
    PositionManager,
    ConfigManager,
    MarketManager,
    LiquidityPool,
    OracleIntegrator,
    Token,
}

impl ContractRole {
    pub const ALL: [ContractRole; 6] = [
        Self::PositionManager,
        Self::ConfigManager,
        Self::MarketManager,
        Self::LiquidityPool,
        Self::OracleIntegrator,
        Self::Token,
    ];

    /// Key used in deployment documents.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PositionManager => "position_manager",
            Self::ConfigManager => "config_manager",
            Self::MarketManager => "market_manager",
            Self::LiquidityPool => "liquidity_pool",
            Self::OracleIntegrator => "oracle_integrator",
            Self::Token => "token",
        }
    }
}

impl fmt::Display for ContractRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContractRole {
    type Err = ConfigurationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| ConfigurationError::UnknownRole(s.to_string()))
    }
}
