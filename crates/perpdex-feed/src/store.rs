//! Scoped market state.
//!
//! One store per application, shared as `Arc<MarketStore>`. Candle series are
//! keyed by (symbol, interval) and merged with the rules in [`crate::series`];
//! tickers are one snapshot per symbol, replaced wholesale.

use crate::series::{CandleSeries, MergeOutcome, DEFAULT_MAX_CANDLES};
use dashmap::DashMap;
use parking_lot::RwLock;
use perpdex_core::{Candle, Interval, Symbol, Ticker};
use std::sync::Arc;
use tracing::debug;

type SeriesKey = (Symbol, Interval);
type SeriesEntry = Arc<RwLock<CandleSeries>>;

/// Candle and ticker state shared between streams and readers.
pub struct MarketStore {
    series: DashMap<SeriesKey, SeriesEntry>,
    tickers: DashMap<Symbol, Ticker>,
    max_candles: usize,
}

impl Default for MarketStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CANDLES)
    }
}

impl MarketStore {
    /// Create a store keeping at most `max_candles` per series.
    pub fn new(max_candles: usize) -> Self {
        Self {
            series: DashMap::new(),
            tickers: DashMap::new(),
            max_candles,
        }
    }

    fn get_or_create(&self, symbol: &Symbol, interval: Interval) -> SeriesEntry {
        self.series
            .entry((symbol.clone(), interval))
            .or_insert_with(|| Arc::new(RwLock::new(CandleSeries::new(self.max_candles))))
            .clone()
    }

    fn get(&self, symbol: &Symbol, interval: Interval) -> Option<SeriesEntry> {
        self.series
            .get(&(symbol.clone(), interval))
            .map(|entry| entry.clone())
    }

    /// Merge one candle into its series.
    pub fn apply_candle(&self, symbol: &Symbol, interval: Interval, candle: Candle) -> MergeOutcome {
        self.get_or_create(symbol, interval).write().merge(candle)
    }

    /// Merge a REST seed. Safe to call after streaming has started.
    ///
    /// Returns the number of candles that changed the series.
    pub fn seed_candles(&self, symbol: &Symbol, interval: Interval, candles: Vec<Candle>) -> usize {
        let count = candles.len();
        let entry = self.get_or_create(symbol, interval);
        let changed = entry.write().merge_all(candles);
        debug!(symbol = %symbol, interval = %interval, count, changed, "Seeded candles");
        changed
    }

    /// Replace the ticker snapshot for its symbol.
    pub fn apply_ticker(&self, ticker: Ticker) {
        self.tickers.insert(ticker.symbol.clone(), ticker);
    }

    /// Copy of the series, oldest first.
    pub fn candles(&self, symbol: &Symbol, interval: Interval) -> Vec<Candle> {
        self.get(symbol, interval)
            .map(|entry| {
                let guard = entry.read();
                guard.candles().to_vec()
            })
            .unwrap_or_default()
    }

    pub fn last_candle(&self, symbol: &Symbol, interval: Interval) -> Option<Candle> {
        self.get(symbol, interval).and_then(|entry| {
            let guard = entry.read();
            guard.last().cloned()
        })
    }

    pub fn ticker(&self, symbol: &Symbol) -> Option<Ticker> {
        self.tickers.get(symbol).map(|t| t.clone())
    }

    /// All tickers, sorted by symbol.
    pub fn tickers(&self) -> Vec<Ticker> {
        let mut tickers: Vec<Ticker> = self.tickers.iter().map(|t| t.value().clone()).collect();
        tickers.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        tickers
    }

    pub fn series_count(&self) -> usize {
        self.series.len()
    }

    pub fn max_candles(&self) -> usize {
        self.max_candles
    }

    /// Drop all state (shutdown or account switch).
    pub fn clear(&self) {
        self.series.clear();
        self.tickers.clear();
        debug!("Market store cleared");
    }
}
