//! Application wiring.
//!
//! Owns the scoped [`MarketStore`] and builds every component from
//! [`AppConfig`]:
//! - REST loader and stream synchronizer (with reconnects when enabled)
//! - Deployment registry for the configured network
//! - Trade service over the position manager contract
//! - Liquidity pool client

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use perpdex_core::{Candle, Interval, Symbol, Ticker};
use perpdex_feed::{
    ChartSession, DataSourceError, HistoricalLoader, MarketStore, MarketStreams, OpenOutcome,
    ResilientSynchronizer, StreamSynchronizer,
};
use perpdex_gateway::{
    ContractGateway, DynRpcTransport, HttpRpcTransport, InterfaceDescriptor,
    LiquidityPoolClient, PositionManagerClient, PositionBook, TradeService,
};
use perpdex_registry::{ConfigurationError, ContractRole, DeploymentRegistry, LoadedDeployment};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How often streaming commands log a summary line.
const REPORT_INTERVAL: Duration = Duration::from_secs(10);

pub struct Application {
    config: AppConfig,
    store: Arc<MarketStore>,
    loader: Arc<HistoricalLoader>,
    streams: Arc<dyn MarketStreams>,
    deployment: LoadedDeployment,
    positions: Arc<PositionBook>,
}

impl Application {
    /// Build every component. Deployment issues are logged, not fatal.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let loader = Arc::new(HistoricalLoader::new(&config.rest_base_url)?);

        let synchronizer = StreamSynchronizer::new(&config.ws_base_url);
        let streams: Arc<dyn MarketStreams> = if config.reconnect.enabled {
            Arc::new(ResilientSynchronizer::new(
                synchronizer,
                config.reconnect.policy(),
            ))
        } else {
            Arc::new(synchronizer)
        };

        let store = Arc::new(MarketStore::new(config.market.max_candles));

        let deployment = DeploymentRegistry::load(&config.deployments_dir, config.network);
        for issue in &deployment.issues {
            warn!(network = %config.network.as_str(), issue = %issue, "Deployment issue");
        }
        info!(
            network = %config.network.as_str(),
            contracts = deployment.registry.len(),
            issues = deployment.issues.len(),
            "Deployment loaded"
        );

        Ok(Self {
            config,
            store,
            loader,
            streams,
            deployment,
            positions: Arc::new(PositionBook::new()),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<MarketStore> {
        &self.store
    }

    pub fn deployments(&self) -> &DeploymentRegistry {
        &self.deployment.registry
    }

    pub fn deployment_issues(&self) -> &[ConfigurationError] {
        &self.deployment.issues
    }

    /// Positions opened through [`Self::trade_service`] during this run.
    pub fn positions(&self) -> &Arc<PositionBook> {
        &self.positions
    }

    /// One-shot candle history, not merged into the store.
    pub async fn fetch_candles(
        &self,
        symbol: &Symbol,
        interval: Interval,
        limit: Option<u32>,
    ) -> AppResult<Vec<Candle>> {
        let limit = limit.unwrap_or(self.config.market.candle_limit);
        Ok(self.loader.fetch_candles(symbol, interval, Some(limit)).await?)
    }

    /// Chart session over the shared store.
    pub fn chart_session(&self) -> ChartSession {
        ChartSession::new(self.loader.clone(), self.streams.clone(), self.store.clone())
            .with_candle_limit(self.config.market.candle_limit)
    }

    /// Follow one chart until `shutdown` fires.
    pub async fn run_chart(
        &self,
        symbol: Symbol,
        interval: Interval,
        shutdown: CancellationToken,
    ) -> AppResult<()> {
        let session = self.chart_session();
        match session.open(symbol.clone(), interval).await? {
            OpenOutcome::Ready { seeded } => {
                info!(symbol = %symbol, interval = %interval, seeded, "Chart ready");
            }
            OpenOutcome::Superseded => {
                debug!(symbol = %symbol, interval = %interval, "Chart superseded before ready");
                return Ok(());
            }
        }

        let mut report = tokio::time::interval(REPORT_INTERVAL);
        report.tick().await;

        loop {
            tokio::select! {
                _ = report.tick() => {
                    let last = self.store.last_candle(&symbol, interval);
                    info!(
                        symbol = %symbol,
                        interval = %interval,
                        candles = session.candles().len(),
                        state = ?session.state(),
                        close = ?last.as_ref().map(|c| c.close.to_string()),
                        "Chart update"
                    );
                    if let Some(error) = session.last_error() {
                        warn!(symbol = %symbol, error = %error, "Chart stream error");
                    }
                }
                _ = shutdown.cancelled() => {
                    info!(symbol = %symbol, interval = %interval, "Closing chart");
                    break;
                }
            }
        }

        session.close();
        Ok(())
    }

    /// Seed 24h tickers over REST, then follow the ticker stream until
    /// `shutdown` fires.
    pub async fn run_tickers(
        &self,
        symbols: Vec<Symbol>,
        shutdown: CancellationToken,
    ) -> AppResult<()> {
        for ticker in self.fetch_tickers(&symbols).await {
            self.store.apply_ticker(ticker);
        }

        let store = self.store.clone();
        let handle = self.streams.open_tickers(
            symbols.clone(),
            Box::new(move |ticker: Ticker| store.apply_ticker(ticker)),
            Box::new(|error: DataSourceError| {
                warn!(error = %error, "Ticker stream error");
            }),
        )?;
        info!(channel = %handle.channel(), symbols = symbols.len(), "Ticker stream opened");

        let mut report = tokio::time::interval(REPORT_INTERVAL);
        report.tick().await;

        loop {
            tokio::select! {
                _ = report.tick() => {
                    for ticker in self.store.tickers() {
                        info!(
                            symbol = %ticker.symbol,
                            price = %ticker.price,
                            change_24h = %ticker.change_24h,
                            "Ticker"
                        );
                    }
                }
                _ = shutdown.cancelled() => {
                    info!("Closing ticker stream");
                    break;
                }
            }
        }

        handle.close();
        Ok(())
    }

    /// 24h snapshots for `symbols`. Symbols that fail are logged and skipped.
    pub async fn fetch_tickers(&self, symbols: &[Symbol]) -> Vec<Ticker> {
        let mut tickers = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            match self.loader.fetch_ticker_24hr(symbol).await {
                Ok(ticker) => tickers.push(ticker),
                Err(e) => warn!(symbol = %symbol, error = %e, "Ticker snapshot failed"),
            }
        }
        tickers
    }

    /// Trader account from `contract.trader`.
    pub fn trader(&self) -> AppResult<&str> {
        self.config
            .contract
            .trader
            .as_deref()
            .ok_or_else(|| AppError::Config("contract.trader is not set".to_string()))
    }

    /// Trade service over the configured RPC endpoint.
    pub fn trade_service(&self) -> AppResult<TradeService> {
        self.trade_service_with(self.rpc_transport()?)
    }

    /// Trade service over a caller-supplied transport.
    pub fn trade_service_with(&self, transport: DynRpcTransport) -> AppResult<TradeService> {
        let trader = self.trader()?.to_string();
        let contract_id = self
            .deployment
            .registry
            .require(ContractRole::PositionManager)?
            .clone();
        let descriptor = match &self.config.contract.descriptor {
            Some(encoded) => InterfaceDescriptor::from_base64(encoded)?,
            None => InterfaceDescriptor::position_manager()?,
        };

        let gateway = ContractGateway::new(Arc::new(descriptor), contract_id, transport);
        Ok(
            TradeService::new(PositionManagerClient::new(gateway), trader, self.positions.clone())
                .with_token_decimals(self.config.contract.token_decimals)
                .with_execution_fee(u128::from(self.config.contract.execution_fee)),
        )
    }

    /// Liquidity pool client over the configured RPC endpoint.
    pub fn liquidity_pool(&self) -> AppResult<LiquidityPoolClient> {
        self.liquidity_pool_with(self.rpc_transport()?)
    }

    /// Liquidity pool client over a caller-supplied transport.
    pub fn liquidity_pool_with(&self, transport: DynRpcTransport) -> AppResult<LiquidityPoolClient> {
        let contract_id = self
            .deployment
            .registry
            .require(ContractRole::LiquidityPool)?
            .clone();
        let descriptor = InterfaceDescriptor::liquidity_pool()?;
        Ok(LiquidityPoolClient::new(ContractGateway::new(
            Arc::new(descriptor),
            contract_id,
            transport,
        )))
    }

    fn rpc_transport(&self) -> AppResult<DynRpcTransport> {
        Ok(Arc::new(HttpRpcTransport::new(&self.config.rpc_url)?))
    }

    /// Drop all market state.
    pub fn shutdown(&self) {
        self.store.clear();
        info!("Market store cleared");
    }
}
