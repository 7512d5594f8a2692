//! Chart session: seed from REST, then follow the candle stream.
//!
//! Only one (symbol, interval) view is live per session. Opening a new view
//! closes the previous subscription and bumps a generation counter; a seed
//! that arrives after the view has moved on is discarded.

use crate::error::{DataSourceError, FeedResult};
use crate::history::HistoricalLoader;
use crate::store::MarketStore;
use crate::synchronizer::{MarketStreams, SubscriptionHandle};
use parking_lot::Mutex;
use perpdex_core::{Candle, Interval, Symbol};
use perpdex_ws::ConnectionState;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Result of [`ChartSession::open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    /// View is live. `seeded` candles from the REST seed changed the series.
    Ready { seeded: usize },
    /// Another `open` or `close` happened while this one was in flight.
    Superseded,
}

struct ActiveChart {
    symbol: Symbol,
    interval: Interval,
    handle: SubscriptionHandle,
}

/// One chart view over a shared [`MarketStore`].
pub struct ChartSession {
    loader: Arc<HistoricalLoader>,
    streams: Arc<dyn MarketStreams>,
    store: Arc<MarketStore>,
    candle_limit: Option<u32>,
    generation: AtomicU64,
    current: Mutex<Option<ActiveChart>>,
    last_error: Arc<Mutex<Option<DataSourceError>>>,
}

impl ChartSession {
    pub fn new(
        loader: Arc<HistoricalLoader>,
        streams: Arc<dyn MarketStreams>,
        store: Arc<MarketStore>,
    ) -> Self {
        Self {
            loader,
            streams,
            store,
            candle_limit: None,
            generation: AtomicU64::new(0),
            current: Mutex::new(None),
            last_error: Arc::new(Mutex::new(None)),
        }
    }

    /// Candles requested for each seed (default 500, capped at 1000).
    pub fn with_candle_limit(mut self, limit: u32) -> Self {
        self.candle_limit = Some(limit);
        self
    }

    pub fn store(&self) -> &Arc<MarketStore> {
        &self.store
    }

    /// Switch the session to `symbol`/`interval`.
    ///
    /// Loader failures are returned; the previous view stays closed.
    pub async fn open(&self, symbol: Symbol, interval: Interval) -> FeedResult<OpenOutcome> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.close_current();
        *self.last_error.lock() = None;
        info!(symbol = %symbol, interval = %interval, generation, "Opening chart");

        let seed = self
            .loader
            .fetch_candles(&symbol, interval, self.candle_limit)
            .await;

        if !self.is_current(generation) {
            debug!(symbol = %symbol, interval = %interval, generation, "Discarding stale seed");
            return Ok(OpenOutcome::Superseded);
        }

        let seed = match seed {
            Ok(seed) => seed,
            Err(e) => {
                warn!(symbol = %symbol, interval = %interval, error = %e, "Chart seed failed");
                *self.last_error.lock() = Some(e.clone());
                return Err(e);
            }
        };
        let seeded = self.store.seed_candles(&symbol, interval, seed);

        let store = self.store.clone();
        let stream_symbol = symbol.clone();
        let last_error = self.last_error.clone();
        let handle = self.streams.open_candles(
            symbol.clone(),
            interval,
            Box::new(move |candle: Candle| {
                store.apply_candle(&stream_symbol, interval, candle);
            }),
            Box::new(move |error: DataSourceError| {
                *last_error.lock() = Some(error);
            }),
        );

        let mut current = self.current.lock();
        if !self.is_current(generation) {
            handle.close();
            debug!(symbol = %symbol, interval = %interval, generation, "Chart superseded while subscribing");
            return Ok(OpenOutcome::Superseded);
        }
        *current = Some(ActiveChart {
            symbol,
            interval,
            handle,
        });

        Ok(OpenOutcome::Ready { seeded })
    }

    /// Tear the current view down. In-flight `open` calls are superseded.
    pub fn close(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.close_current();
    }

    /// Live view, if any.
    pub fn current(&self) -> Option<(Symbol, Interval)> {
        self.current
            .lock()
            .as_ref()
            .map(|chart| (chart.symbol.clone(), chart.interval))
    }

    /// Stream state of the live view.
    pub fn state(&self) -> Option<ConnectionState> {
        self.current.lock().as_ref().map(|chart| chart.handle.state())
    }

    /// Retry the live view's stream after a transport failure.
    pub fn retry(&self) -> bool {
        self.current
            .lock()
            .as_ref()
            .is_some_and(|chart| chart.handle.retry())
    }

    /// Candles of the live view, oldest first.
    pub fn candles(&self) -> Vec<Candle> {
        match self.current() {
            Some((symbol, interval)) => self.store.candles(&symbol, interval),
            None => Vec::new(),
        }
    }

    /// Most recent error from the seed or the stream.
    pub fn last_error(&self) -> Option<DataSourceError> {
        self.last_error.lock().clone()
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    fn close_current(&self) {
        let previous = self.current.lock().take();
        if let Some(chart) = previous {
            chart.handle.close();
            debug!(symbol = %chart.symbol, interval = %chart.interval, "Closed previous chart");
        }
    }
}

impl Drop for ChartSession {
    fn drop(&mut self) {
        self.close_current();
    }
}
