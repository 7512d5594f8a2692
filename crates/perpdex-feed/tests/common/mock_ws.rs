//! Mock market stream for feed tests.
//!
//! Records every handshake along with whether the client is still attached,
//! so tests can check that closing or switching a chart releases its stream.

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::{accept_hdr_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
enum Push {
    Frame(String),
    Hangup,
}

struct Client {
    path: String,
    attached: Arc<AtomicBool>,
}

pub struct MockStreamServer {
    addr: SocketAddr,
    pushes: broadcast::Sender<Push>,
    clients: Arc<parking_lot::Mutex<Vec<Client>>>,
    cancel: CancellationToken,
}

impl MockStreamServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (pushes, _) = broadcast::channel::<Push>(64);
        let clients: Arc<parking_lot::Mutex<Vec<Client>>> = Arc::default();
        let cancel = CancellationToken::new();

        let accept_pushes = pushes.clone();
        let accept_clients = clients.clone();
        let accept_cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                let stream = tokio::select! {
                    _ = accept_cancel.cancelled() => break,
                    accepted = listener.accept() => match accepted {
                        Ok((stream, _)) => stream,
                        Err(_) => continue,
                    },
                };
                let rx = accept_pushes.subscribe();
                let clients = accept_clients.clone();
                let cancel = accept_cancel.clone();
                tokio::spawn(async move {
                    let path = Arc::new(parking_lot::Mutex::new(String::new()));
                    let path_slot = path.clone();
                    let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                        *path_slot.lock() = req.uri().to_string();
                        Ok(resp)
                    };
                    let Ok(ws) = accept_hdr_async(stream, callback).await else {
                        return;
                    };
                    let attached = Arc::new(AtomicBool::new(true));
                    clients.lock().push(Client {
                        path: path.lock().clone(),
                        attached: attached.clone(),
                    });
                    serve(ws, rx, cancel).await;
                    attached.store(false, Ordering::SeqCst);
                });
            }
        });

        Self {
            addr,
            pushes,
            clients,
            cancel,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Handshakes completed so far, attached or not.
    pub async fn connection_count(&self) -> usize {
        self.clients.lock().len()
    }

    /// Clients still attached.
    pub fn live_connections(&self) -> usize {
        self.clients
            .lock()
            .iter()
            .filter(|c| c.attached.load(Ordering::SeqCst))
            .count()
    }

    pub async fn wait_for_connections(&self, count: usize) -> bool {
        self.wait(|s| s.clients.lock().len() >= count).await
    }

    /// Wait until exactly `count` clients remain attached.
    pub async fn wait_for_live(&self, count: usize) -> bool {
        self.wait(|s| s.live_connections() == count).await
    }

    pub async fn requested_paths(&self) -> Vec<String> {
        self.clients.lock().iter().map(|c| c.path.clone()).collect()
    }

    pub fn push(&self, text: impl Into<String>) {
        let _ = self.pushes.send(Push::Frame(text.into()));
    }

    /// Send a close frame to every attached client.
    pub fn drop_clients(&self) {
        let _ = self.pushes.send(Push::Hangup);
    }

    pub async fn shutdown(self) {
        self.cancel.cancel();
    }

    async fn wait(&self, done: impl Fn(&Self) -> bool) -> bool {
        for _ in 0..150 {
            if done(self) {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        done(self)
    }
}

async fn serve(
    ws: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    mut pushes: broadcast::Receiver<Push>,
    cancel: CancellationToken,
) {
    let (mut write, mut read) = ws.split();
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            push = pushes.recv() => match push {
                Ok(Push::Frame(text)) => {
                    if write.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Ok(Push::Hangup) => {
                    let _ = write.send(Message::Close(None)).await;
                    break;
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            },
            inbound = read.next() => match inbound {
                Some(Ok(Message::Ping(data))) => {
                    let _ = write.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                _ => {}
            },
        }
    }
}
