//! Mock market data REST server for integration tests.
//!
//! Serves `/api/v3/klines` and `/api/v3/ticker/24hr` with generated data.
//! A few reserved symbols trigger failure modes:
//! - `FAILUSDT`: 503 with a text body
//! - `BADUSDT`: kline rows with a non-numeric price
//! - `BIGUSDT`: 1200 rows regardless of `limit`
//! - `SLOWUSDT`: responds after 300ms

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Last open time served, in milliseconds.
pub const LAST_OPEN_TIME_MS: i64 = 1_700_000_000_000;

#[derive(Debug, Clone, Deserialize)]
pub struct KlineQuery {
    pub symbol: String,
    pub interval: String,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct TickerQuery {
    symbol: String,
}

#[derive(Default)]
struct MockState {
    kline_requests: Mutex<Vec<KlineQuery>>,
}

pub struct MockRestServer {
    addr: SocketAddr,
    state: Arc<MockState>,
    task: JoinHandle<()>,
}

impl MockRestServer {
    pub async fn start() -> Self {
        let state = Arc::new(MockState::default());
        let app = Router::new()
            .route("/api/v3/klines", get(klines))
            .route("/api/v3/ticker/24hr", get(ticker_24hr))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state, task }
    }

    /// REST base, e.g. `http://127.0.0.1:1234/api/v3`.
    pub fn base_url(&self) -> String {
        format!("http://{}/api/v3", self.addr)
    }

    pub fn kline_requests(&self) -> Vec<KlineQuery> {
        self.state.kline_requests.lock().clone()
    }
}

impl Drop for MockRestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

fn interval_ms(interval: &str) -> i64 {
    match interval {
        "1m" => 60_000,
        "5m" => 300_000,
        "15m" => 900_000,
        "1h" => 3_600_000,
        "4h" => 14_400_000,
        "1d" => 86_400_000,
        _ => 60_000,
    }
}

/// One consistent kline row, open time `time_ms`.
pub fn kline_row(time_ms: i64, step: i64, interval_ms: i64) -> Value {
    let open = 100 + step;
    json!([
        time_ms,
        format!("{open}.00"),
        format!("{}.00", open + 2),
        format!("{}.00", open - 1),
        format!("{open}.50"),
        "10.5",
        time_ms + interval_ms - 1,
        "1050.0",
        42,
        "5.0",
        "500.0",
        "0"
    ])
}

async fn klines(State(state): State<Arc<MockState>>, Query(query): Query<KlineQuery>) -> Response {
    state.kline_requests.lock().push(query.clone());

    match query.symbol.as_str() {
        "FAILUSDT" => {
            return (StatusCode::SERVICE_UNAVAILABLE, "maintenance").into_response();
        }
        "BADUSDT" => {
            let rows = json!([[LAST_OPEN_TIME_MS, "abc", "2", "1", "1.5", "1", 0]]);
            return Json(rows).into_response();
        }
        "SLOWUSDT" => tokio::time::sleep(Duration::from_millis(300)).await,
        _ => {}
    }

    let step_ms = interval_ms(&query.interval);
    let count = if query.symbol == "BIGUSDT" {
        1200
    } else {
        query.limit.unwrap_or(500) as i64
    };

    // Newest first, with the newest row repeated, so the client must sort and dedup.
    let mut rows: Vec<Value> = (0..count)
        .map(|i| {
            let time = LAST_OPEN_TIME_MS - i * step_ms;
            kline_row(time, count - i, step_ms)
        })
        .collect();
    if count > 0 {
        rows.insert(1, kline_row(LAST_OPEN_TIME_MS, count + 1, step_ms));
    }

    Json(Value::Array(rows)).into_response()
}

async fn ticker_24hr(Query(query): Query<TickerQuery>) -> Response {
    if query.symbol == "FAILUSDT" {
        return (StatusCode::SERVICE_UNAVAILABLE, "maintenance").into_response();
    }
    Json(json!({
        "symbol": query.symbol,
        "lastPrice": "64250.10",
        "priceChangePercent": "-1.25",
        "volume": "18234.5",
        "highPrice": "65000.00",
        "lowPrice": "63500.00",
        "openTime": 1699913600000i64,
        "closeTime": 1700000000000i64
    }))
    .into_response()
}
