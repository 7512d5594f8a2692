//! Mock market data upstream: REST over axum and streams over tungstenite.

use axum::extract::Query;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response as WsResponse};
use tokio_tungstenite::{accept_hdr_async, tungstenite::Message};

/// Open time of the newest served candle, in milliseconds.
pub const LAST_OPEN_TIME_MS: i64 = 1_700_000_000_000;

#[derive(Debug, Deserialize)]
struct KlineQuery {
    limit: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct TickerQuery {
    symbol: String,
}

/// REST and stream endpoints on two local ports.
pub struct MockUpstream {
    rest_addr: SocketAddr,
    ws_addr: SocketAddr,
    frames: broadcast::Sender<String>,
    paths: Arc<parking_lot::Mutex<Vec<String>>>,
    tasks: Vec<JoinHandle<()>>,
}

impl MockUpstream {
    pub async fn start() -> Self {
        let app = Router::new()
            .route("/api/v3/klines", get(klines))
            .route("/api/v3/ticker/24hr", get(ticker_24hr));
        let rest = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let rest_addr = rest.local_addr().unwrap();
        let rest_task = tokio::spawn(async move {
            axum::serve(rest, app).await.unwrap();
        });

        let ws = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let ws_addr = ws.local_addr().unwrap();
        let (frames, _) = broadcast::channel::<String>(64);
        let paths = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let frames_clone = frames.clone();
        let paths_clone = paths.clone();
        let ws_task = tokio::spawn(async move {
            while let Ok((stream, _)) = ws.accept().await {
                tokio::spawn(handle_stream(
                    stream,
                    frames_clone.subscribe(),
                    paths_clone.clone(),
                ));
            }
        });

        Self {
            rest_addr,
            ws_addr,
            frames,
            paths,
            tasks: vec![rest_task, ws_task],
        }
    }

    pub fn rest_base_url(&self) -> String {
        format!("http://{}/api/v3", self.rest_addr)
    }

    pub fn ws_base_url(&self) -> String {
        format!("ws://{}", self.ws_addr)
    }

    /// Request paths of completed stream handshakes.
    pub fn stream_paths(&self) -> Vec<String> {
        self.paths.lock().clone()
    }

    /// Send a text frame to every connected stream client.
    pub fn push(&self, frame: impl Into<String>) {
        let _ = self.frames.send(frame.into());
    }
}

impl Drop for MockUpstream {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

async fn klines(Query(query): Query<KlineQuery>) -> Response {
    let count = query.limit.unwrap_or(500);
    let rows: Vec<Value> = (0..count)
        .rev()
        .map(|i| {
            let time = LAST_OPEN_TIME_MS - i * 3_600_000;
            json!([time, "100.0", "110.0", "95.0", "105.0", "12.5", time + 3_599_999])
        })
        .collect();
    Json(Value::Array(rows)).into_response()
}

async fn ticker_24hr(Query(query): Query<TickerQuery>) -> Response {
    Json(json!({
        "symbol": query.symbol,
        "lastPrice": "100.00",
        "priceChangePercent": "1.50",
        "volume": "5000",
        "highPrice": "101.00",
        "lowPrice": "98.00"
    }))
    .into_response()
}

async fn handle_stream(
    stream: TcpStream,
    mut frames: broadcast::Receiver<String>,
    paths: Arc<parking_lot::Mutex<Vec<String>>>,
) {
    let captured = Arc::new(parking_lot::Mutex::new(String::new()));
    let captured_clone = captured.clone();
    let callback = move |req: &Request, resp: WsResponse| -> Result<WsResponse, ErrorResponse> {
        *captured_clone.lock() = req.uri().to_string();
        Ok(resp)
    };
    let Ok(ws_stream) = accept_hdr_async(stream, callback).await else {
        return;
    };
    let path = captured.lock().clone();
    paths.lock().push(path);

    let (mut write, mut read) = ws_stream.split();
    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Ok(text) => {
                    if write.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            },
            msg = read.next() => match msg {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                _ => {}
            },
        }
    }
}

pub fn kline_frame(symbol: &str, open_time_ms: i64, close: &str) -> String {
    format!(
        r#"{{"e":"kline","E":{open_time_ms},"s":"{symbol}","k":{{"t":{open_time_ms},"T":{},"s":"{symbol}","i":"1h","o":"100","c":"{close}","h":"200","l":"90","v":"3","n":4,"x":false}}}}"#,
        open_time_ms + 3_599_999
    )
}

pub fn ticker_frame(symbol: &str, price: &str) -> String {
    format!(
        r#"{{"stream":"{}@ticker","data":{{"e":"24hrTicker","E":1,"s":"{symbol}","p":"1","P":"0.5","c":"{price}","h":"{price}","l":"{price}","v":"100"}}}}"#,
        symbol.to_ascii_lowercase()
    )
}
