//! Auto-reconnect decorator for the streaming synchronizer.
//!
//! Wraps the error callback: after each transport failure the error is
//! forwarded, then a retry is scheduled after an exponential backoff delay.
//! A successfully decoded frame resets the attempt counter. Decode errors
//! never trigger retries.

use crate::error::{DataSourceError, FeedResult};
use crate::synchronizer::{
    kind_label, CandleCallback, ErrorCallback, MarketStreams, RetryTrigger, StreamSynchronizer,
    SubscriptionHandle, TickerCallback,
};
use perpdex_core::{Candle, Interval, Symbol, Ticker};
use perpdex_telemetry::Metrics;
use perpdex_ws::{BackoffPolicy, SubscriptionKind};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{error, info};

/// Reconnect settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub backoff: BackoffPolicy,
    /// Consecutive failed attempts before giving up (0 = unlimited).
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::default(),
            max_attempts: 0,
        }
    }
}

/// [`StreamSynchronizer`] with automatic reconnects.
#[derive(Debug, Clone)]
pub struct ResilientSynchronizer {
    inner: StreamSynchronizer,
    policy: ReconnectPolicy,
}

impl ResilientSynchronizer {
    pub fn new(inner: StreamSynchronizer, policy: ReconnectPolicy) -> Self {
        Self { inner, policy }
    }

    pub fn policy(&self) -> ReconnectPolicy {
        self.policy
    }

    pub fn subscribe_candles<U, E>(
        &self,
        symbol: Symbol,
        interval: Interval,
        mut on_update: U,
        on_error: E,
    ) -> SubscriptionHandle
    where
        U: FnMut(Candle) + Send + 'static,
        E: FnMut(DataSourceError) + Send + 'static,
    {
        let attempts = Arc::new(AtomicU32::new(0));
        let reset = attempts.clone();
        let on_error = self.retrying(SubscriptionKind::Candles(interval), attempts, on_error);
        self.inner.subscribe_candles_with_retry(
            symbol,
            interval,
            move |candle| {
                reset.store(0, Ordering::Relaxed);
                on_update(candle);
            },
            on_error,
        )
    }

    pub fn subscribe_tickers<U, E>(
        &self,
        symbols: Vec<Symbol>,
        mut on_update: U,
        on_error: E,
    ) -> FeedResult<SubscriptionHandle>
    where
        U: FnMut(Ticker) + Send + 'static,
        E: FnMut(DataSourceError) + Send + 'static,
    {
        let attempts = Arc::new(AtomicU32::new(0));
        let reset = attempts.clone();
        let on_error = self.retrying(SubscriptionKind::Ticker, attempts, on_error);
        self.inner.subscribe_tickers_with_retry(
            symbols,
            move |ticker| {
                reset.store(0, Ordering::Relaxed);
                on_update(ticker);
            },
            on_error,
        )
    }

    /// Wrap `on_error` so transport failures schedule a delayed retry.
    fn retrying<E>(
        &self,
        kind: SubscriptionKind,
        attempts: Arc<AtomicU32>,
        mut on_error: E,
    ) -> impl FnMut(DataSourceError, &RetryTrigger) + Send + 'static
    where
        E: FnMut(DataSourceError) + Send + 'static,
    {
        let policy = self.policy;
        let kind = kind_label(kind);

        move |err: DataSourceError, trigger: &RetryTrigger| {
            let is_transport = err.is_transport();
            on_error(err);
            if !is_transport || trigger.is_closed() {
                return;
            }

            let attempt = attempts.fetch_add(1, Ordering::Relaxed) + 1;
            if policy.max_attempts > 0 && attempt > policy.max_attempts {
                error!(
                    channel = %trigger.channel(),
                    attempts = attempt - 1,
                    "Giving up on subscription after repeated failures"
                );
                return;
            }

            let delay = policy.backoff.delay(attempt);
            Metrics::stream_reconnect(kind);
            info!(
                channel = %trigger.channel(),
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Scheduling reconnect"
            );

            let trigger = trigger.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                trigger.retry();
            });
        }
    }
}

impl MarketStreams for ResilientSynchronizer {
    fn open_candles(
        &self,
        symbol: Symbol,
        interval: Interval,
        on_update: CandleCallback,
        on_error: ErrorCallback,
    ) -> SubscriptionHandle {
        self.subscribe_candles(symbol, interval, on_update, on_error)
    }

    fn open_tickers(
        &self,
        symbols: Vec<Symbol>,
        on_update: TickerCallback,
        on_error: ErrorCallback,
    ) -> FeedResult<SubscriptionHandle> {
        self.subscribe_tickers(symbols, on_update, on_error)
    }
}
