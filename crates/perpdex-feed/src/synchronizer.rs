//! Streaming synchronizer.
//!
//! Opens one stream connection per subscription, decodes every inbound frame
//! through the normalizer and hands the result to the caller's update callback.
//! Decode failures go to the error callback and the frame is dropped; the
//! connection stays up. Transport failures are reported once and the
//! subscription parks until the caller retries or closes it.
//!
//! Callbacks run inside the subscription's connection task, serialized per
//! subscription. After [`SubscriptionHandle::close`] returns, no callback is
//! running and none will start.

use crate::error::{DataSourceError, FeedResult};
use crate::normalizer::{decode_stream_candle, decode_stream_ticker};
use perpdex_core::{Candle, Interval, Symbol, Ticker};
use perpdex_telemetry::Metrics;
use perpdex_ws::{
    channel_name, ConnectionControl, ConnectionHandle, ConnectionState, FrameSink,
    StreamConnection, StreamFrame, Subscription, SubscriptionKind, WsError,
};
use serde_json::Value;
use tracing::{debug, info, warn};

/// Boxed candle update callback.
pub type CandleCallback = Box<dyn FnMut(Candle) + Send>;
/// Boxed ticker update callback.
pub type TickerCallback = Box<dyn FnMut(Ticker) + Send>;
/// Boxed error callback.
pub type ErrorCallback = Box<dyn FnMut(DataSourceError) + Send>;

/// Retry handle usable from inside callbacks and by decorators.
#[derive(Clone)]
pub struct RetryTrigger(ConnectionControl);

impl RetryTrigger {
    /// Reconnect a failed subscription. Returns `false` if it is not failed.
    pub fn retry(&self) -> bool {
        self.0.retry()
    }

    pub fn state(&self) -> ConnectionState {
        self.0.state()
    }

    pub fn is_closed(&self) -> bool {
        self.0.is_closed()
    }

    pub fn channel(&self) -> &str {
        self.0.channel()
    }
}

/// Close handle usable from inside callbacks.
#[derive(Clone)]
pub struct CloseTrigger(ConnectionControl);

impl CloseTrigger {
    pub fn close(&self) {
        self.0.close();
    }

    pub fn is_closed(&self) -> bool {
        self.0.is_closed()
    }
}

/// A live subscription. Dropping it closes the stream.
pub struct SubscriptionHandle {
    subscription: Subscription,
    connection: ConnectionHandle,
}

impl SubscriptionHandle {
    /// Canonical channel key (`btcusdt@kline_1h`, or `a@ticker/b@ticker`).
    pub fn channel(&self) -> &str {
        self.connection.channel()
    }

    pub fn subscription(&self) -> &Subscription {
        &self.subscription
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Reconnect after a transport failure. Returns `false` if not failed.
    pub fn retry(&self) -> bool {
        self.connection.retry()
    }

    /// Tear the subscription down. Idempotent.
    pub fn close(&self) {
        self.connection.close();
    }

    pub fn is_closed(&self) -> bool {
        self.connection.is_closed()
    }

    pub fn retry_trigger(&self) -> RetryTrigger {
        RetryTrigger(self.connection.control())
    }

    pub fn close_trigger(&self) -> CloseTrigger {
        CloseTrigger(self.connection.control())
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("channel", &self.channel())
            .field("state", &self.state())
            .finish()
    }
}

/// Sources of live candle and ticker streams.
///
/// Implemented by [`StreamSynchronizer`] and by decorators around it.
pub trait MarketStreams: Send + Sync {
    fn open_candles(
        &self,
        symbol: Symbol,
        interval: Interval,
        on_update: CandleCallback,
        on_error: ErrorCallback,
    ) -> SubscriptionHandle;

    fn open_tickers(
        &self,
        symbols: Vec<Symbol>,
        on_update: TickerCallback,
        on_error: ErrorCallback,
    ) -> FeedResult<SubscriptionHandle>;
}

/// Opens decoded market data subscriptions under one stream base URL.
#[derive(Debug, Clone)]
pub struct StreamSynchronizer {
    ws_base_url: String,
}

impl StreamSynchronizer {
    pub fn new(ws_base_url: impl Into<String>) -> Self {
        Self {
            ws_base_url: ws_base_url.into(),
        }
    }

    pub fn ws_base_url(&self) -> &str {
        &self.ws_base_url
    }

    /// Stream candles for one symbol and interval.
    pub fn subscribe_candles<U, E>(
        &self,
        symbol: Symbol,
        interval: Interval,
        on_update: U,
        mut on_error: E,
    ) -> SubscriptionHandle
    where
        U: FnMut(Candle) + Send + 'static,
        E: FnMut(DataSourceError) + Send + 'static,
    {
        self.subscribe_candles_with_retry(symbol, interval, on_update, move |e, _| on_error(e))
    }

    /// Stream tickers for a set of symbols over one connection.
    ///
    /// Fails only for an empty symbol set.
    pub fn subscribe_tickers<U, E>(
        &self,
        symbols: Vec<Symbol>,
        on_update: U,
        mut on_error: E,
    ) -> FeedResult<SubscriptionHandle>
    where
        U: FnMut(Ticker) + Send + 'static,
        E: FnMut(DataSourceError) + Send + 'static,
    {
        self.subscribe_tickers_with_retry(symbols, on_update, move |e, _| on_error(e))
    }

    /// Like [`Self::subscribe_candles`], with the error callback also given a
    /// [`RetryTrigger`] for its own subscription.
    pub fn subscribe_candles_with_retry<U, E>(
        &self,
        symbol: Symbol,
        interval: Interval,
        on_update: U,
        on_error: E,
    ) -> SubscriptionHandle
    where
        U: FnMut(Candle) + Send + 'static,
        E: FnMut(DataSourceError, &RetryTrigger) + Send + 'static,
    {
        let subscription = Subscription::candles(symbol, interval);
        self.spawn(subscription, decode_candle_frame, on_update, on_error)
    }

    /// Like [`Self::subscribe_tickers`], with a [`RetryTrigger`] in the error callback.
    pub fn subscribe_tickers_with_retry<U, E>(
        &self,
        symbols: Vec<Symbol>,
        on_update: U,
        on_error: E,
    ) -> FeedResult<SubscriptionHandle>
    where
        U: FnMut(Ticker) + Send + 'static,
        E: FnMut(DataSourceError, &RetryTrigger) + Send + 'static,
    {
        let subscription = Subscription::tickers(symbols)?;
        Ok(self.spawn(subscription, decode_ticker_frame, on_update, on_error))
    }

    fn spawn<T, U, E>(
        &self,
        subscription: Subscription,
        decode: fn(&StreamFrame) -> FeedResult<T>,
        on_update: U,
        on_error: E,
    ) -> SubscriptionHandle
    where
        T: 'static,
        U: FnMut(T) + Send + 'static,
        E: FnMut(DataSourceError, &RetryTrigger) + Send + 'static,
    {
        let kind = kind_label(subscription.kind);
        info!(channel = %subscription, kind, "Opening subscription");
        Metrics::subscription_opened();

        let sink_subscription = subscription.clone();
        let connection = StreamConnection::for_subscription(&subscription, &self.ws_base_url)
            .spawn_with(move |control| {
                let sink: Box<dyn FrameSink> = Box::new(DecodingSink {
                    subscription: sink_subscription,
                    kind,
                    decode,
                    on_update,
                    on_error,
                    trigger: RetryTrigger(control),
                });
                sink
            });

        SubscriptionHandle {
            subscription,
            connection,
        }
    }
}

impl MarketStreams for StreamSynchronizer {
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

pub(crate) fn kind_label(kind: SubscriptionKind) -> &'static str {
    match kind {
        SubscriptionKind::Candles(_) => "candles",
        SubscriptionKind::Ticker => "ticker",
    }
}

/// Decode a kline frame whose symbol and interval match its channel.
fn decode_candle_frame(frame: &StreamFrame) -> FeedResult<Candle> {
    let channel = kline_channel(&frame.data).ok_or_else(|| {
        DataSourceError::field("k", "kline does not name its symbol and interval")
    })?;
    check_channel(frame, &channel)?;
    decode_stream_candle(&frame.data)
}

/// Decode a ticker frame whose symbol matches its channel.
fn decode_ticker_frame(frame: &StreamFrame) -> FeedResult<Ticker> {
    let ticker = decode_stream_ticker(&frame.data)?;
    check_channel(frame, &channel_name(&ticker.symbol, SubscriptionKind::Ticker))?;
    Ok(ticker)
}

/// Channel named by a kline payload's `s` and `i` fields.
fn kline_channel(data: &Value) -> Option<String> {
    let kline = data.get("k")?;
    let symbol = kline.get("s").or_else(|| data.get("s"))?.as_str()?;
    let interval = kline.get("i")?.as_str()?;
    let symbol = Symbol::new(symbol).ok()?;
    let interval = interval.parse::<Interval>().ok()?;
    Some(channel_name(&symbol, SubscriptionKind::Candles(interval)))
}

fn check_channel(frame: &StreamFrame, payload_channel: &str) -> FeedResult<()> {
    if payload_channel == frame.channel {
        Ok(())
    } else {
        Err(DataSourceError::Decode(format!(
            "payload for '{payload_channel}' arrived on '{}'",
            frame.channel
        )))
    }
}

/// Frame sink that decodes and dispatches one subscription's frames.
struct DecodingSink<T, U, E> {
    subscription: Subscription,
    kind: &'static str,
    decode: fn(&StreamFrame) -> FeedResult<T>,
    on_update: U,
    on_error: E,
    trigger: RetryTrigger,
}

impl<T, U, E> DecodingSink<T, U, E>
where
    E: FnMut(DataSourceError, &RetryTrigger),
{
    fn report(&mut self, error: DataSourceError) {
        (self.on_error)(error, &self.trigger);
    }
}

impl<T, U, E> FrameSink for DecodingSink<T, U, E>
where
    T: 'static,
    U: FnMut(T) + Send + 'static,
    E: FnMut(DataSourceError, &RetryTrigger) + Send + 'static,
{
    fn on_connected(&mut self) {
        debug!(channel = %self.subscription, "Subscription live");
    }

    fn on_text(&mut self, text: &str) {
        let decoded = StreamFrame::parse(text, &self.subscription)
            .map_err(DataSourceError::from)
            .and_then(|frame| (self.decode)(&frame));

        match decoded {
            Ok(value) => {
                Metrics::stream_frame(self.kind);
                (self.on_update)(value);
            }
            Err(error) => {
                Metrics::stream_decode_error(self.kind);
                warn!(channel = %self.subscription, error = %error, "Dropping undecodable frame");
                self.report(error);
            }
        }
    }

    fn on_transport_error(&mut self, error: WsError) {
        Metrics::stream_transport_error(self.kind);
        warn!(channel = %self.subscription, error = %error, "Subscription transport failed");
        self.report(DataSourceError::from(error));
    }
}

impl<T, U, E> Drop for DecodingSink<T, U, E> {
    fn drop(&mut self) {
        Metrics::subscription_closed();
        debug!(channel = %self.subscription, "Subscription released");
    }
}
