//! perpdex client entry point.

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand, ValueEnum};
use perpdex_app::metrics_server::run_metrics_server;
use perpdex_app::{AppConfig, Application};
use perpdex_core::{to_base_units, Interval, Price, Size, Symbol, TradeForm, TradeSide};
use perpdex_gateway::{PlacedOrder, TradeService, FULL_CLOSE_BPS};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Perpetual DEX market data and trading client
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via PERPDEX_CONFIG env var)
    #[arg(short, long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Seed a chart from REST and follow its candle stream
    Chart {
        /// Defaults to the first configured symbol
        #[arg(short, long)]
        symbol: Option<String>,
        /// Defaults to market.interval
        #[arg(short, long)]
        interval: Option<String>,
    },
    /// Follow 24h tickers
    Tickers {
        /// Defaults to market.symbols
        symbols: Vec<String>,
    },
    /// Print candle history as JSON lines
    Candles {
        symbol: String,
        #[arg(short, long)]
        interval: Option<String>,
        #[arg(short, long)]
        limit: Option<u32>,
    },
    /// Open a position through the position manager contract
    OpenPosition {
        #[arg(long)]
        market_id: u32,
        #[arg(long, value_enum)]
        side: Side,
        /// Collateral in token units, e.g. 100.5
        #[arg(long)]
        collateral: String,
        #[arg(long)]
        leverage: u32,
        /// Available token balance
        #[arg(long)]
        balance: String,
    },
    /// Add collateral and/or size to an open position
    IncreasePosition {
        #[arg(long)]
        position_id: u64,
        /// Collateral to add, in token units
        #[arg(long, default_value = "0")]
        collateral: String,
        /// Size to add, in token units
        #[arg(long, default_value = "0")]
        size: String,
    },
    /// Remove collateral and/or size from an open position
    DecreasePosition {
        #[arg(long)]
        position_id: u64,
        #[arg(long, default_value = "0")]
        collateral: String,
        #[arg(long, default_value = "0")]
        size: String,
    },
    /// Place a limit order that opens a position at a trigger price
    LimitOrder {
        #[arg(long)]
        market_id: u32,
        #[arg(long, value_enum)]
        side: Side,
        #[arg(long)]
        collateral: String,
        #[arg(long)]
        leverage: u32,
        #[arg(long)]
        balance: String,
        #[arg(long)]
        trigger_price: String,
    },
    /// Place a stop loss on an open position
    StopLoss {
        #[arg(long)]
        position_id: u64,
        #[arg(long)]
        trigger_price: String,
        /// Share of the position to close, in basis points
        #[arg(long, default_value_t = FULL_CLOSE_BPS)]
        close_bps: u32,
    },
    /// Place a take profit on an open position
    TakeProfit {
        #[arg(long)]
        position_id: u64,
        #[arg(long)]
        trigger_price: String,
        #[arg(long, default_value_t = FULL_CLOSE_BPS)]
        close_bps: u32,
    },
    /// Cancel a pending order
    CancelOrder {
        #[arg(long)]
        order_id: u64,
    },
    /// List the trader's open positions and pending orders
    Positions,
    /// Deposit collateral tokens into the liquidity pool
    Deposit {
        /// Amount in token units
        amount: String,
    },
    /// Redeem liquidity pool shares
    Withdraw {
        /// Shares in token units
        shares: String,
    },
    /// Show the trader's liquidity pool shares
    PoolShares,
    /// Show contract addresses for the configured network
    Deployments,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Side {
    Long,
    Short,
}

impl From<Side> for TradeSide {
    fn from(side: Side) -> Self {
        match side {
            Side::Long => TradeSide::Long,
            Side::Short => TradeSide::Short,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // TLS provider must be installed before any stream connects.
    perpdex_ws::init_crypto();

    let args = Args::parse();
    perpdex_telemetry::init_logging()?;
    info!("Starting perpdex v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load(args.config.as_deref())?;
    info!(
        network = %config.network.as_str(),
        rest = %config.rest_base_url,
        ws = %config.ws_base_url,
        "Configuration loaded"
    );
    let app = Application::new(config)?;

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
        }
        signal_token.cancel();
    });

    let result = run(&app, args.command, shutdown.clone()).await;
    shutdown.cancel();
    app.shutdown();
    result
}

async fn run(app: &Application, command: Command, shutdown: CancellationToken) -> Result<()> {
    match command {
        Command::Chart { symbol, interval } => {
            let symbol = match symbol {
                Some(raw) => Symbol::new(raw)?,
                None => app
                    .config()
                    .default_symbol()
                    .cloned()
                    .ok_or_else(|| anyhow!("no symbol given and market.symbols is empty"))?,
            };
            let interval = parse_interval(app, interval)?;
            spawn_metrics(app, &shutdown);
            app.run_chart(symbol, interval, shutdown).await?;
        }
        Command::Tickers { symbols } => {
            let symbols = if symbols.is_empty() {
                app.config().market.symbols.clone()
            } else {
                symbols
                    .iter()
                    .map(Symbol::new)
                    .collect::<perpdex_core::Result<Vec<_>>>()?
            };
            spawn_metrics(app, &shutdown);
            app.run_tickers(symbols, shutdown).await?;
        }
        Command::Candles {
            symbol,
            interval,
            limit,
        } => {
            let symbol = Symbol::new(symbol)?;
            let interval = parse_interval(app, interval)?;
            let candles = app.fetch_candles(&symbol, interval, limit).await?;
            for candle in &candles {
                println!("{}", serde_json::to_string(candle)?);
            }
            info!(symbol = %symbol, interval = %interval, count = candles.len(), "Candles fetched");
        }
        Command::OpenPosition {
            market_id,
            side,
            collateral,
            leverage,
            balance,
        } => {
            let balance: Size = balance.parse()?;
            let form = TradeForm {
                market_id,
                side: side.into(),
                collateral,
                leverage,
            };
            let service = app.trade_service()?;
            let position = service
                .open_position(&form, balance)
                .await
                .map_err(|e| trade_failed("Open position", e))?;
            println!(
                "Opened position {} ({} {}x, size {})",
                position.position_id, position.side, position.leverage, position.size
            );
        }
        Command::IncreasePosition {
            position_id,
            collateral,
            size,
        } => {
            let service = synced_trade_service(app).await?;
            let position = service
                .increase_position(position_id, collateral.parse()?, size.parse()?)
                .await
                .map_err(|e| trade_failed("Increase position", e))?;
            println!(
                "Position {}: collateral {}, size {}",
                position.position_id, position.collateral, position.size
            );
        }
        Command::DecreasePosition {
            position_id,
            collateral,
            size,
        } => {
            let service = synced_trade_service(app).await?;
            let remaining = service
                .decrease_position(position_id, collateral.parse()?, size.parse()?)
                .await
                .map_err(|e| trade_failed("Decrease position", e))?;
            match remaining {
                Some(position) => println!(
                    "Position {}: collateral {}, size {}",
                    position.position_id, position.collateral, position.size
                ),
                None => println!("Position {position_id} fully reduced"),
            }
        }
        Command::LimitOrder {
            market_id,
            side,
            collateral,
            leverage,
            balance,
            trigger_price,
        } => {
            let balance: Size = balance.parse()?;
            let trigger: Price = trigger_price.parse()?;
            let form = TradeForm {
                market_id,
                side: side.into(),
                collateral,
                leverage,
            };
            let service = app.trade_service()?;
            let order = service
                .create_limit_order(&form, balance, trigger)
                .await
                .map_err(|e| trade_failed("Limit order", e))?;
            print_order(&order);
        }
        Command::StopLoss {
            position_id,
            trigger_price,
            close_bps,
        } => {
            let service = synced_trade_service(app).await?;
            let order = service
                .create_stop_loss(position_id, trigger_price.parse()?, close_bps)
                .await
                .map_err(|e| trade_failed("Stop loss", e))?;
            print_order(&order);
        }
        Command::TakeProfit {
            position_id,
            trigger_price,
            close_bps,
        } => {
            let service = synced_trade_service(app).await?;
            let order = service
                .create_take_profit(position_id, trigger_price.parse()?, close_bps)
                .await
                .map_err(|e| trade_failed("Take profit", e))?;
            print_order(&order);
        }
        Command::CancelOrder { order_id } => {
            let service = synced_trade_service(app).await?;
            let order = service
                .cancel_order(order_id)
                .await
                .map_err(|e| trade_failed("Cancel order", e))?;
            println!("Cancelled {} order {}", order.kind, order.order_id);
        }
        Command::Positions => {
            let service = synced_trade_service(app).await?;
            for position in service.book().positions() {
                println!(
                    "position {:<6} market {:<3} {} collateral {} size {} ({}x)",
                    position.position_id,
                    position.market_id,
                    position.side,
                    position.collateral,
                    position.size,
                    position.leverage
                );
            }
            for order in service.book().orders() {
                print_order(&order);
            }
        }
        Command::Deposit { amount } => {
            let amount = token_units(app, &amount)?;
            let pool = app.liquidity_pool()?;
            let shares = pool.deposit(app.trader()?, amount).await?;
            println!("Deposited {amount} units for {shares} shares");
        }
        Command::Withdraw { shares } => {
            let shares = token_units(app, &shares)?;
            let pool = app.liquidity_pool()?;
            let amount = pool.withdraw(app.trader()?, shares).await?;
            println!("Redeemed {shares} shares for {amount} units");
        }
        Command::PoolShares => {
            let pool = app.liquidity_pool()?;
            let shares = pool.get_shares(app.trader()?).await?;
            let total = pool.get_total_shares().await?;
            println!("shares: {shares} of {total}");
        }
        Command::Deployments => {
            let registry = app.deployments();
            println!("network: {}", registry.network().as_str());
            for (role, address) in registry.iter() {
                println!("{:<18} {}", role.as_str(), address.as_str());
            }
            for role in registry.missing_roles() {
                println!("{:<18} (not configured)", role.as_str());
            }
            for issue in app.deployment_issues() {
                warn!(issue = %issue, "Deployment issue");
            }
        }
    }
    Ok(())
}

/// Trade service with the trader's on-chain positions and orders loaded.
async fn synced_trade_service(app: &Application) -> Result<TradeService> {
    let service = app.trade_service()?;
    service.sync().await?;
    Ok(service)
}

fn trade_failed(action: &str, e: perpdex_gateway::TradeError) -> anyhow::Error {
    error!(error = %e, retryable = e.is_retryable(), "{action} failed");
    e.into()
}

fn print_order(order: &PlacedOrder) {
    match order.position_id {
        Some(position_id) => println!(
            "order {:<6} {:<10} market {:<3} position {} trigger {}",
            order.order_id, order.kind, order.market_id, position_id, order.trigger_price
        ),
        None => println!(
            "order {:<6} {:<10} market {:<3} trigger {}",
            order.order_id, order.kind, order.market_id, order.trigger_price
        ),
    }
}

/// Token amount in base units, signed as the pool takes it.
fn token_units(app: &Application, raw: &str) -> Result<i128> {
    let amount: Size = raw.parse()?;
    let units = to_base_units(amount, app.config().contract.token_decimals)
        .ok_or_else(|| anyhow!("{raw} cannot be expressed in token units"))?;
    Ok(i128::try_from(units)?)
}

fn parse_interval(app: &Application, raw: Option<String>) -> Result<Interval> {
    Ok(match raw {
        Some(raw) => raw.parse()?,
        None => app.config().market.interval,
    })
}

fn spawn_metrics(app: &Application, shutdown: &CancellationToken) {
    if let Some(port) = app.config().telemetry.metrics_port {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = run_metrics_server(port, shutdown).await {
                error!(error = %e, port, "Metrics server failed");
            }
        });
    }
}
