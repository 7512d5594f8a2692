//! Chart session tests: REST seed from axum, live updates from the mock stream.

mod common;
use common::mock_rest::{MockRestServer, LAST_OPEN_TIME_MS};
use common::mock_ws::MockStreamServer;

use perpdex_core::{Interval, Price, Symbol};
use perpdex_feed::{
    ChartSession, DataSourceError, HistoricalLoader, MarketStore, MarketStreams, OpenOutcome,
    StreamSynchronizer,
};
use perpdex_ws::ConnectionState;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

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

fn kline_frame(symbol: &str, open_time_ms: i64, close: &str) -> String {
    format!(
        r#"{{"e":"kline","E":{open_time_ms},"s":"{symbol}","k":{{"t":{open_time_ms},"T":{},"s":"{symbol}","i":"1h","o":"600","c":"{close}","h":"700","l":"590","v":"3","n":4,"x":false}}}}"#,
        open_time_ms + 3_599_999
    )
}

struct Harness {
    rest: MockRestServer,
    ws: MockStreamServer,
    store: Arc<MarketStore>,
    session: ChartSession,
}

async fn harness(candle_limit: u32) -> Harness {
    let rest = MockRestServer::start().await;
    let ws = MockStreamServer::start().await;
    let loader = Arc::new(HistoricalLoader::new(rest.base_url()).unwrap());
    let streams: Arc<dyn MarketStreams> = Arc::new(StreamSynchronizer::new(ws.url()));
    let store = Arc::new(MarketStore::default());
    let session =
        ChartSession::new(loader, streams, store.clone()).with_candle_limit(candle_limit);
    Harness {
        rest,
        ws,
        store,
        session,
    }
}

#[tokio::test]
async fn test_seed_then_stream() {
    let h = harness(100).await;
    let btc = sym("BTCUSDT");

    let outcome = h.session.open(btc.clone(), Interval::OneHour).await.unwrap();
    assert_eq!(outcome, OpenOutcome::Ready { seeded: 100 });
    assert_eq!(h.session.current(), Some((btc.clone(), Interval::OneHour)));
    assert_eq!(h.session.candles().len(), 100);

    assert!(h.ws.wait_for_connections(1).await);
    assert!(wait_until(|| h.session.state() == Some(ConnectionState::Connected)).await);
    assert_eq!(h.ws.requested_paths().await, vec!["/ws/btcusdt@kline_1h"]);

    // Live update of the open bar replaces it in place.
    h.ws.push(kline_frame("BTCUSDT", LAST_OPEN_TIME_MS, "650"));
    assert!(
        wait_until(|| h
            .store
            .last_candle(&btc, Interval::OneHour)
            .is_some_and(|c| c.close == Price::new(dec!(650))))
        .await
    );
    assert_eq!(h.store.candles(&btc, Interval::OneHour).len(), 100);

    // Next bar appends.
    h.ws.push(kline_frame("BTCUSDT", LAST_OPEN_TIME_MS + 3_600_000, "655"));
    assert!(wait_until(|| h.store.candles(&btc, Interval::OneHour).len() == 101).await);

    h.session.close();
    assert_eq!(h.session.current(), None);
    h.ws.shutdown().await;
}

#[tokio::test]
async fn test_stale_seed_discarded() {
    let h = harness(50).await;

    let (slow, eth) = tokio::join!(
        h.session.open(sym("SLOWUSDT"), Interval::OneHour),
        async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            h.session.open(sym("ETHUSDT"), Interval::OneHour).await
        }
    );

    assert_eq!(slow.unwrap(), OpenOutcome::Superseded);
    assert_eq!(eth.unwrap(), OpenOutcome::Ready { seeded: 50 });
    assert_eq!(
        h.session.current(),
        Some((sym("ETHUSDT"), Interval::OneHour))
    );
    assert!(h.store.candles(&sym("SLOWUSDT"), Interval::OneHour).is_empty());
    assert_eq!(h.rest.kline_requests().len(), 2);

    assert!(h.ws.wait_for_connections(1).await);
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.ws.requested_paths().await, vec!["/ws/ethusdt@kline_1h"]);

    h.ws.shutdown().await;
}

#[tokio::test]
async fn test_switch_closes_previous_subscription() {
    let h = harness(10).await;

    h.session.open(sym("BTCUSDT"), Interval::OneHour).await.unwrap();
    assert!(wait_until(|| h.session.state() == Some(ConnectionState::Connected)).await);

    h.session.open(sym("ETHUSDT"), Interval::FourHours).await.unwrap();
    assert!(h.ws.wait_for_connections(2).await);
    assert!(wait_until(|| h.session.state() == Some(ConnectionState::Connected)).await);
    assert_eq!(
        h.ws.requested_paths().await,
        vec!["/ws/btcusdt@kline_1h", "/ws/ethusdt@kline_4h"]
    );

    // The shared store keeps the earlier series.
    assert_eq!(h.store.candles(&sym("BTCUSDT"), Interval::OneHour).len(), 10);
    assert_eq!(h.session.candles().len(), 10);

    assert!(h.ws.wait_for_live(1).await);

    h.session.close();
    assert_eq!(h.session.state(), None);
    assert!(h.ws.wait_for_live(0).await);

    h.ws.push(kline_frame("ETHUSDT", LAST_OPEN_TIME_MS + 14_400_000, "650"));
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(h.store.candles(&sym("ETHUSDT"), Interval::FourHours).len(), 10);

    h.ws.shutdown().await;
}

#[tokio::test]
async fn test_seed_failure_surfaces_error() {
    let h = harness(10).await;

    let err = h
        .session
        .open(sym("FAILUSDT"), Interval::OneHour)
        .await
        .unwrap_err();
    assert!(matches!(err, DataSourceError::Status { code: 503, .. }));
    assert_eq!(h.session.current(), None);
    assert_eq!(h.session.last_error(), Some(err));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.ws.connection_count().await, 0);
}
