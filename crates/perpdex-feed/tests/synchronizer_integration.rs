//! Streaming synchronizer tests against a local mock stream server.

mod common;
use common::mock_ws::MockStreamServer;

use parking_lot::Mutex;
use perpdex_core::{Candle, Interval, Price, Symbol, Ticker};
use perpdex_feed::{DataSourceError, ReconnectPolicy, ResilientSynchronizer, StreamSynchronizer};
use perpdex_ws::{BackoffPolicy, ConnectionState};
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

fn sym(s: &str) -> Symbol {
    Symbol::new(s).unwrap()
}

async fn wait_until<F: Fn() -> bool>(condition: F) -> bool {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}

fn kline_frame(open_time_ms: i64, close: &str, closed: bool) -> String {
    format!(
        r#"{{"e":"kline","E":{open_time_ms},"s":"BTCUSDT","k":{{"t":{open_time_ms},"T":{},"s":"BTCUSDT","i":"1h","o":"100","c":"{close}","h":"120","l":"90","v":"7.5","n":12,"x":{closed}}}}}"#,
        open_time_ms + 3_599_999
    )
}

fn ticker_frame(symbol: &str, price: &str) -> String {
    format!(
        r#"{{"stream":"{}@ticker","data":{{"e":"24hrTicker","E":1,"s":"{symbol}","p":"1","P":"0.5","c":"{price}","h":"{price}","l":"{price}","v":"100"}}}}"#,
        symbol.to_ascii_lowercase()
    )
}

struct Recorded<T> {
    updates: Arc<Mutex<Vec<T>>>,
    errors: Arc<Mutex<Vec<DataSourceError>>>,
}

impl<T> Default for Recorded<T> {
    fn default() -> Self {
        Self {
            updates: Arc::new(Mutex::new(Vec::new())),
            errors: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<T: Send + 'static> Recorded<T> {
    fn on_update(&self) -> impl FnMut(T) + Send + 'static {
        let updates = self.updates.clone();
        move |value| updates.lock().push(value)
    }

    fn on_error(&self) -> impl FnMut(DataSourceError) + Send + 'static {
        let errors = self.errors.clone();
        move |error| errors.lock().push(error)
    }
}

#[tokio::test]
async fn test_candle_frames_decoded_and_dispatched() {
    let server = MockStreamServer::start().await;
    let sync = StreamSynchronizer::new(server.url());
    let recorded: Recorded<Candle> = Recorded::default();

    let handle = sync.subscribe_candles(
        sym("BTCUSDT"),
        Interval::OneHour,
        recorded.on_update(),
        recorded.on_error(),
    );
    assert_eq!(handle.channel(), "btcusdt@kline_1h");
    assert!(server.wait_for_connections(1).await);
    assert!(wait_until(|| handle.state() == ConnectionState::Connected).await);
    assert_eq!(server.requested_paths().await, vec!["/ws/btcusdt@kline_1h"]);

    server.push(kline_frame(1_700_000_000_000, "110", false));
    assert!(wait_until(|| recorded.updates.lock().len() == 1).await);

    let candle = recorded.updates.lock()[0].clone();
    assert_eq!(candle.time, 1_700_000_000);
    assert_eq!(candle.close, Price::new(dec!(110)));
    assert!(!candle.closed);
    assert!(recorded.errors.lock().is_empty());

    handle.close();
    server.shutdown().await;
}

#[tokio::test]
async fn test_decode_error_keeps_subscription_alive() {
    let server = MockStreamServer::start().await;
    let sync = StreamSynchronizer::new(server.url());
    let recorded: Recorded<Candle> = Recorded::default();

    let handle = sync.subscribe_candles(
        sym("BTCUSDT"),
        Interval::OneHour,
        recorded.on_update(),
        recorded.on_error(),
    );
    assert!(server.wait_for_connections(1).await);
    assert!(wait_until(|| handle.state() == ConnectionState::Connected).await);

    server.push(kline_frame(1_700_000_000_000, "not-a-price", false));
    assert!(wait_until(|| recorded.errors.lock().len() == 1).await);
    assert!(matches!(
        recorded.errors.lock()[0],
        DataSourceError::Decode(_)
    ));

    server.push(kline_frame(1_700_000_000_000, "111", true));
    assert!(wait_until(|| recorded.updates.lock().len() == 1).await);
    assert_eq!(handle.state(), ConnectionState::Connected);
    assert_eq!(server.connection_count().await, 1);

    handle.close();
    server.shutdown().await;
}

#[tokio::test]
async fn test_no_callback_after_close() {
    let server = MockStreamServer::start().await;
    let sync = StreamSynchronizer::new(server.url());
    let recorded: Recorded<Candle> = Recorded::default();

    let handle = sync.subscribe_candles(
        sym("BTCUSDT"),
        Interval::OneHour,
        recorded.on_update(),
        recorded.on_error(),
    );
    assert!(server.wait_for_connections(1).await);
    assert!(wait_until(|| handle.state() == ConnectionState::Connected).await);

    server.push(kline_frame(1_700_000_000_000, "110", false));
    assert!(wait_until(|| recorded.updates.lock().len() == 1).await);

    handle.close();
    assert!(handle.is_closed());
    assert!(server.wait_for_live(0).await);

    server.push(kline_frame(1_700_000_000_000, "112", false));
    server.push(kline_frame(1_700_003_600_000, "113", false));
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(recorded.updates.lock().len(), 1);
    assert!(recorded.errors.lock().is_empty());

    server.shutdown().await;
}

#[tokio::test]
async fn test_combined_tickers_dispatched_per_symbol() {
    let server = MockStreamServer::start().await;
    let sync = StreamSynchronizer::new(server.url());
    let recorded: Recorded<Ticker> = Recorded::default();

    let handle = sync
        .subscribe_tickers(
            vec![sym("BTCUSDT"), sym("ETHUSDT"), sym("BTCUSDT")],
            recorded.on_update(),
            recorded.on_error(),
        )
        .unwrap();
    assert_eq!(handle.channel(), "btcusdt@ticker/ethusdt@ticker");
    assert!(server.wait_for_connections(1).await);
    assert!(wait_until(|| handle.state() == ConnectionState::Connected).await);
    assert_eq!(
        server.requested_paths().await,
        vec!["/stream?streams=btcusdt@ticker/ethusdt@ticker"]
    );

    server.push(ticker_frame("ETHUSDT", "2400.5"));
    server.push(ticker_frame("BTCUSDT", "64000"));
    server.push(ticker_frame("SOLUSDT", "150"));
    assert!(wait_until(|| recorded.updates.lock().len() == 2).await);
    assert!(wait_until(|| recorded.errors.lock().len() == 1).await);

    let updates = recorded.updates.lock().clone();
    assert_eq!(updates[0].symbol.as_str(), "ETHUSDT");
    assert_eq!(updates[0].price, Price::new(dec!(2400.5)));
    assert_eq!(updates[1].symbol.as_str(), "BTCUSDT");
    assert!(matches!(
        recorded.errors.lock()[0],
        DataSourceError::Decode(_)
    ));

    handle.close();
    server.shutdown().await;
}

#[tokio::test]
async fn test_empty_ticker_set_rejected() {
    let sync = StreamSynchronizer::new("ws://127.0.0.1:1");
    let result = sync.subscribe_tickers(Vec::new(), |_: Ticker| {}, |_: DataSourceError| {});
    assert!(matches!(result, Err(DataSourceError::InvalidRequest(_))));
}

#[tokio::test]
async fn test_transport_failure_parks_until_retry() {
    let server = MockStreamServer::start().await;
    let sync = StreamSynchronizer::new(server.url());
    let recorded: Recorded<Candle> = Recorded::default();

    let handle = sync.subscribe_candles(
        sym("BTCUSDT"),
        Interval::OneHour,
        recorded.on_update(),
        recorded.on_error(),
    );
    assert!(server.wait_for_connections(1).await);
    assert!(wait_until(|| handle.state() == ConnectionState::Connected).await);

    server.drop_clients();
    assert!(wait_until(|| recorded.errors.lock().len() == 1).await);
    assert!(recorded.errors.lock()[0].is_transport());
    assert_eq!(handle.state(), ConnectionState::Failed);

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(server.connection_count().await, 1);

    assert!(handle.retry());
    assert!(server.wait_for_connections(2).await);
    assert!(wait_until(|| handle.state() == ConnectionState::Connected).await);

    server.push(kline_frame(1_700_000_000_000, "110", false));
    assert!(wait_until(|| recorded.updates.lock().len() == 1).await);

    handle.close();
    server.shutdown().await;
}

fn fast_policy(max_attempts: u32) -> ReconnectPolicy {
    ReconnectPolicy {
        backoff: BackoffPolicy {
            base_delay_ms: 20,
            max_delay_ms: 100,
            max_jitter_ms: 0,
        },
        max_attempts,
    }
}

#[tokio::test]
async fn test_resilient_reconnects_after_server_close() {
    let server = MockStreamServer::start().await;
    let sync = ResilientSynchronizer::new(StreamSynchronizer::new(server.url()), fast_policy(0));
    let recorded: Recorded<Candle> = Recorded::default();

    let handle = sync.subscribe_candles(
        sym("BTCUSDT"),
        Interval::OneHour,
        recorded.on_update(),
        recorded.on_error(),
    );
    assert!(server.wait_for_connections(1).await);
    assert!(wait_until(|| handle.state() == ConnectionState::Connected).await);

    server.drop_clients();
    assert!(wait_until(|| recorded.errors.lock().len() == 1).await);
    assert!(server.wait_for_connections(2).await);
    assert!(wait_until(|| handle.state() == ConnectionState::Connected).await);

    server.push(kline_frame(1_700_000_000_000, "110", false));
    assert!(wait_until(|| recorded.updates.lock().len() == 1).await);

    handle.close();
    server.shutdown().await;
}

#[tokio::test]
async fn test_resilient_gives_up_after_max_attempts() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let sync = ResilientSynchronizer::new(
        StreamSynchronizer::new(format!("ws://{addr}")),
        fast_policy(2),
    );
    let recorded: Recorded<Candle> = Recorded::default();

    let handle = sync.subscribe_candles(
        sym("BTCUSDT"),
        Interval::OneHour,
        recorded.on_update(),
        recorded.on_error(),
    );

    // Initial failure plus two retries, each reported once.
    assert!(wait_until(|| recorded.errors.lock().len() == 3).await);
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(recorded.errors.lock().len(), 3);
    assert_eq!(handle.state(), ConnectionState::Failed);
    assert!(recorded.errors.lock().iter().all(|e| e.is_transport()));

    handle.close();
}
