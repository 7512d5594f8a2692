//! Application configuration.
//!
//! Layered with the `config` crate: built-in defaults, then the TOML file,
//! then `PERPDEX__*` environment overrides (`PERPDEX__MARKET__INTERVAL=4h`).

use crate::error::{AppError, AppResult};
use config::{Config, Environment, File, FileFormat};
use perpdex_core::{Interval, Symbol};
use perpdex_feed::{ReconnectPolicy, DEFAULT_CANDLE_LIMIT, DEFAULT_MAX_CANDLES, MAX_CANDLE_LIMIT};
use perpdex_registry::Network;
use perpdex_ws::BackoffPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "PERPDEX_CONFIG";

/// Config file used when neither `--config` nor [`CONFIG_ENV`] is given.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

const ENV_PREFIX: &str = "PERPDEX";
const ENV_SEPARATOR: &str = "__";

/// Default chart and ticker selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketConfig {
    /// Symbols for the ticker view; the first one is the default chart.
    pub symbols: Vec<Symbol>,
    pub interval: Interval,
    /// Candles requested per seed (at most 1000).
    pub candle_limit: u32,
    /// Candles kept per series before the oldest are evicted.
    pub max_candles: usize,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            symbols: ["BTCUSDT", "ETHUSDT", "SOLUSDT"]
                .iter()
                .filter_map(|s| Symbol::new(s).ok())
                .collect(),
            interval: Interval::OneHour,
            candle_limit: DEFAULT_CANDLE_LIMIT,
            max_candles: DEFAULT_MAX_CANDLES,
        }
    }
}

/// Stream reconnect settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectConfig {
    pub enabled: bool,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_jitter_ms: u64,
    /// Consecutive failed attempts before giving up (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        let backoff = BackoffPolicy::default();
        Self {
            enabled: true,
            base_delay_ms: backoff.base_delay_ms,
            max_delay_ms: backoff.max_delay_ms,
            max_jitter_ms: backoff.max_jitter_ms,
            max_attempts: 0,
        }
    }
}

impl ReconnectConfig {
    pub fn policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            backoff: BackoffPolicy {
                base_delay_ms: self.base_delay_ms,
                max_delay_ms: self.max_delay_ms,
                max_jitter_ms: self.max_jitter_ms,
            },
            max_attempts: self.max_attempts,
        }
    }
}

/// Contract access.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContractConfig {
    /// Trader account (G... strkey). Required for trading commands.
    #[serde(default)]
    pub trader: Option<String>,
    /// Fractional digits of the collateral token.
    pub token_decimals: u32,
    /// Base64 interface descriptor overriding the built-in position manager one.
    #[serde(default)]
    pub descriptor: Option<String>,
    /// Keeper fee attached to conditional orders, in token base units.
    #[serde(default = "default_execution_fee")]
    pub execution_fee: u64,
}

fn default_execution_fee() -> u64 {
    perpdex_gateway::DEFAULT_EXECUTION_FEE as u64
}

/// Telemetry configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Serve Prometheus metrics on this port while streaming.
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    pub network: Network,
    /// REST base, e.g. `https://api.binance.com/api/v3`.
    pub rest_base_url: String,
    /// Stream base, e.g. `wss://stream.binance.com:9443`.
    pub ws_base_url: String,
    /// Directory holding `{network}.json` deployment files.
    pub deployments_dir: String,
    /// JSON-RPC endpoint for contract invocations.
    pub rpc_url: String,
    pub market: MarketConfig,
    pub reconnect: ReconnectConfig,
    pub contract: ContractConfig,
    pub telemetry: TelemetryConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            network: Network::Testnet,
            rest_base_url: "https://api.binance.com/api/v3".to_string(),
            ws_base_url: "wss://stream.binance.com:9443".to_string(),
            deployments_dir: "deployments".to_string(),
            rpc_url: "https://soroban-testnet.stellar.org".to_string(),
            market: MarketConfig::default(),
            reconnect: ReconnectConfig::default(),
            contract: ContractConfig {
                token_decimals: perpdex_gateway::DEFAULT_TOKEN_DECIMALS,
                execution_fee: default_execution_fee(),
                ..ContractConfig::default()
            },
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration.
    ///
    /// Path resolution: `path` argument, then [`CONFIG_ENV`], then
    /// [`DEFAULT_CONFIG_PATH`]. A missing file falls back to defaults.
    pub fn load(path: Option<&str>) -> AppResult<Self> {
        let path = path
            .map(str::to_string)
            .or_else(|| std::env::var(CONFIG_ENV).ok())
            .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
        Self::load_with_env(Path::new(&path), None)
    }

    /// Load from `path` with environment overrides taken from `env`
    /// (`None` reads the process environment).
    pub fn load_with_env(
        path: &Path,
        env: Option<config::Map<String, String>>,
    ) -> AppResult<Self> {
        if path.exists() {
            info!(path = %path.display(), "Loading configuration");
        } else {
            warn!(path = %path.display(), "Config file not found, using defaults");
        }

        let defaults = Config::try_from(&AppConfig::default())
            .map_err(|e| AppError::Config(format!("Failed to build defaults: {e}")))?;

        let settings = Config::builder()
            .add_source(defaults)
            .add_source(File::from(path).format(FileFormat::Toml).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true)
                    .source(env),
            )
            .build()
            .map_err(|e| AppError::Config(format!("Failed to load config: {e}")))?;

        let config: AppConfig = settings
            .try_deserialize()
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no component can work with.
    pub fn validate(&self) -> AppResult<()> {
        if self.market.candle_limit == 0 || self.market.candle_limit > MAX_CANDLE_LIMIT {
            return Err(AppError::Config(format!(
                "market.candle_limit must be between 1 and {MAX_CANDLE_LIMIT}, got {}",
                self.market.candle_limit
            )));
        }
        if self.market.max_candles == 0 {
            return Err(AppError::Config("market.max_candles must be positive".to_string()));
        }
        if self.reconnect.base_delay_ms > self.reconnect.max_delay_ms {
            return Err(AppError::Config(format!(
                "reconnect.base_delay_ms ({}) exceeds reconnect.max_delay_ms ({})",
                self.reconnect.base_delay_ms, self.reconnect.max_delay_ms
            )));
        }
        Ok(())
    }

    /// First configured symbol, used when a command names none.
    pub fn default_symbol(&self) -> Option<&Symbol> {
        self.market.symbols.first()
    }
}
