//! Mock market data stream server for integration tests.
//!
//! Accepts connections, records the requested path of each one, and pushes
//! frames (or close frames) to every connected client on demand.

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, Mutex};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::{accept_hdr_async, tungstenite::Message};

#[derive(Debug, Clone)]
enum Command {
    Text(String),
    Close,
}

/// A mock stream server for testing.
pub struct MockStreamServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
    commands: broadcast::Sender<Command>,
    paths: Arc<Mutex<Vec<String>>>,
}

impl MockStreamServer {
    /// Start a new mock server on an available port.
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (commands, _) = broadcast::channel::<Command>(64);
        let paths: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let commands_clone = commands.clone();
        let paths_clone = paths.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    Ok((stream, _)) = listener.accept() => {
                        let rx = commands_clone.subscribe();
                        tokio::spawn(handle_connection(stream, rx, paths_clone.clone()));
                    }
                    _ = shutdown_rx.recv() => {
                        break;
                    }
                }
            }
        });

        Self {
            addr,
            shutdown_tx,
            commands,
            paths,
        }
    }

    /// Base URL to build stream URLs under.
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Number of completed handshakes.
    pub async fn connection_count(&self) -> usize {
        self.paths.lock().await.len()
    }

    /// Wait up to three seconds for at least `count` handshakes.
    pub async fn wait_for_connections(&self, count: usize) -> bool {
        for _ in 0..150 {
            if self.connection_count().await >= count {
                return true;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        false
    }

    /// Request path (with query) of each connection, in order.
    pub async fn requested_paths(&self) -> Vec<String> {
        self.paths.lock().await.clone()
    }

    /// Send a text frame to every connected client.
    pub fn push(&self, text: impl Into<String>) {
        let _ = self.commands.send(Command::Text(text.into()));
    }

    /// Close every connected client with a close frame.
    pub fn drop_clients(&self) {
        let _ = self.commands.send(Command::Close);
    }

    /// Shutdown the server.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
    }
}

async fn handle_connection(
    stream: TcpStream,
    mut commands: broadcast::Receiver<Command>,
    paths: Arc<Mutex<Vec<String>>>,
) {
    let captured = Arc::new(parking_lot::Mutex::new(String::new()));
    let captured_clone = captured.clone();
    let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        *captured_clone.lock() = req.uri().to_string();
        Ok(resp)
    };

    let ws_stream = match accept_hdr_async(stream, callback).await {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("WebSocket handshake failed: {}", e);
            return;
        }
    };
    let path = captured.lock().clone();
    paths.lock().await.push(path);

    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            command = commands.recv() => {
                match command {
                    Ok(Command::Text(text)) => {
                        if write.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Ok(Command::Close) => {
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        let _ = write.send(Message::Pong(data)).await;
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    _ => {}
                }
            }
        }
    }
}
