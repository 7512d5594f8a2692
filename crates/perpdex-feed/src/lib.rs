//! Market data feed for the perpdex client.
//!
//! - [`HistoricalLoader`]: REST candle and 24h ticker bootstrap
//! - [`StreamSynchronizer`]: decoded per-subscription streams
//! - [`ResilientSynchronizer`]: auto-reconnect decorator
//! - [`MarketStore`]: scoped candle series and ticker snapshots
//! - [`ChartSession`]: seed-then-stream chart view

pub mod chart;
pub mod error;
pub mod history;
pub mod normalizer;
pub mod resilient;
pub mod series;
pub mod store;
pub mod synchronizer;

pub use chart::{ChartSession, OpenOutcome};
pub use error::{DataSourceError, FeedResult};
pub use history::{effective_limit, HistoricalLoader, DEFAULT_CANDLE_LIMIT, MAX_CANDLE_LIMIT};
pub use normalizer::{normalize_candle, normalize_ticker, KlinePayload};
pub use resilient::{ReconnectPolicy, ResilientSynchronizer};
pub use series::{CandleSeries, MergeOutcome, DEFAULT_MAX_CANDLES};
pub use store::MarketStore;
pub use synchronizer::{
    CandleCallback, CloseTrigger, ErrorCallback, MarketStreams, RetryTrigger, StreamSynchronizer,
    SubscriptionHandle, TickerCallback,
};
