//! Per-subscription stream connection.
//!
//! Each subscription runs its own connection task. The task reads text frames
//! and hands them to a [`FrameSink`] synchronously, one at a time. On a
//! transport failure the task reports the error once and parks in
//! [`ConnectionState::Failed`]; it reconnects only when [`ConnectionControl::retry`]
//! is called.
//!
//! Teardown is deterministic: every sink call runs under a reentrant gate, and
//! [`ConnectionControl::close`] flips the gate under the same lock. Once `close`
//! returns no sink call is running and none will start, even for frames that
//! were already buffered. Because the gate is reentrant, `close` may be called
//! from inside a sink callback.

use crate::error::WsError;
use crate::subscription::Subscription;
use futures_util::{SinkExt, StreamExt};
use parking_lot::{ReentrantMutex, RwLock};
use std::cell::Cell;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    connect_async_tls_with_config, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Connected,
    /// Transport failed; waiting for `retry()` or `close()`.
    Failed,
    Closed,
}

/// Receives everything a connection produces.
///
/// Calls are serialized per connection and never overlap.
pub trait FrameSink: Send + 'static {
    /// Transport established (also after a retry).
    fn on_connected(&mut self) {}

    /// One inbound text frame.
    fn on_text(&mut self, text: &str);

    /// Transport failure. The connection is now parked.
    fn on_transport_error(&mut self, error: WsError);
}

/// Cloneable control surface shared by the handle and the connection task.
#[derive(Clone)]
pub struct ConnectionControl {
    channel: Arc<str>,
    state: Arc<RwLock<ConnectionState>>,
    /// `true` once closed. Held while a sink call runs.
    gate: Arc<ReentrantMutex<Cell<bool>>>,
    cancel: CancellationToken,
    retry: Arc<Notify>,
}

impl ConnectionControl {
    /// A control not yet bound to a running task.
    pub fn new(channel: &str) -> Self {
        Self {
            channel: Arc::from(channel),
            state: Arc::new(RwLock::new(ConnectionState::Connecting)),
            gate: Arc::new(ReentrantMutex::new(Cell::new(false))),
            cancel: CancellationToken::new(),
            retry: Arc::new(Notify::new()),
        }
    }

    /// Canonical channel key of the subscription.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Ask a failed connection to reconnect.
    ///
    /// Returns `false` (and does nothing) unless the connection is parked in
    /// [`ConnectionState::Failed`].
    pub fn retry(&self) -> bool {
        if self.is_closed() || self.state() != ConnectionState::Failed {
            return false;
        }
        debug!(channel = %self.channel, "Retry requested");
        self.retry.notify_one();
        true
    }

    /// Tear the connection down. Idempotent.
    ///
    /// Blocks until an in-flight sink call on another thread has returned.
    pub fn close(&self) {
        {
            let closed = self.gate.lock();
            if closed.replace(true) {
                return;
            }
        }
        self.cancel.cancel();
        *self.state.write() = ConnectionState::Closed;
        info!(channel = %self.channel, "Stream connection closed");
    }

    fn set_state(&self, next: ConnectionState) {
        let mut state = self.state.write();
        if *state != ConnectionState::Closed {
            *state = next;
        }
    }

    /// Run `f` against the sink unless the connection has been closed.
    ///
    /// Returns `false` when the gate is closed.
    fn deliver<F>(&self, sink: &mut dyn FrameSink, f: F) -> bool
    where
        F: FnOnce(&mut dyn FrameSink),
    {
        let closed = self.gate.lock();
        if closed.get() {
            return false;
        }
        f(sink);
        !closed.get()
    }
}

/// Owning handle for a running connection. Dropping it closes the connection.
pub struct ConnectionHandle {
    control: ConnectionControl,
    task: JoinHandle<()>,
}

impl ConnectionHandle {
    pub fn control(&self) -> ConnectionControl {
        self.control.clone()
    }

    pub fn channel(&self) -> &str {
        self.control.channel()
    }

    pub fn state(&self) -> ConnectionState {
        self.control.state()
    }

    pub fn is_closed(&self) -> bool {
        self.control.is_closed()
    }

    pub fn retry(&self) -> bool {
        self.control.retry()
    }

    pub fn close(&self) {
        self.control.close();
    }

    /// Whether the connection task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        self.control.close();
    }
}

/// Connection parameters for one subscription.
#[derive(Debug, Clone)]
pub struct StreamConnection {
    url: String,
    channel: String,
}

impl StreamConnection {
    pub fn new(url: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            channel: channel.into(),
        }
    }

    /// Connection for `subscription` under `ws_base`.
    pub fn for_subscription(subscription: &Subscription, ws_base: &str) -> Self {
        Self::new(subscription.stream_url(ws_base), subscription.key())
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Spawn the connection task on the current tokio runtime.
    pub fn spawn(self, sink: Box<dyn FrameSink>) -> ConnectionHandle {
        self.spawn_with(|_| sink)
    }

    /// Spawn with a sink that needs the connection's control surface, so the
    /// sink can retry or close its own connection.
    pub fn spawn_with<F>(self, build_sink: F) -> ConnectionHandle
    where
        F: FnOnce(ConnectionControl) -> Box<dyn FrameSink>,
    {
        let control = ConnectionControl::new(&self.channel);
        let sink = build_sink(control.clone());
        let task = tokio::spawn(run_connection(self.url, control.clone(), sink));
        ConnectionHandle { control, task }
    }
}

enum ReadOutcome {
    Closed,
    Failed(WsError),
}

async fn run_connection(url: String, control: ConnectionControl, mut sink: Box<dyn FrameSink>) {
    let mut attempt = 0u32;

    loop {
        if control.is_closed() {
            break;
        }

        attempt += 1;
        control.set_state(ConnectionState::Connecting);
        info!(channel = %control.channel, %url, attempt, "Connecting stream");

        let connected = tokio::select! {
            biased;
            () = control.cancel.cancelled() => break,
            result = connect_async_tls_with_config(url.as_str(), None, true, None) => result,
        };

        let error = match connected {
            Ok((ws_stream, _response)) => {
                control.set_state(ConnectionState::Connected);
                info!(channel = %control.channel, "Stream connected");
                if !control.deliver(sink.as_mut(), |s| s.on_connected()) {
                    break;
                }
                match read_loop(&control, ws_stream, sink.as_mut()).await {
                    ReadOutcome::Closed => break,
                    ReadOutcome::Failed(error) => error,
                }
            }
            Err(e) => WsError::ConnectionFailed(e.to_string()),
        };

        warn!(channel = %control.channel, error = %error, "Stream transport failed");
        control.set_state(ConnectionState::Failed);
        if !control.deliver(sink.as_mut(), |s| s.on_transport_error(error)) {
            break;
        }

        tokio::select! {
            biased;
            () = control.cancel.cancelled() => break,
            () = control.retry.notified() => {
                debug!(channel = %control.channel, "Leaving failed state");
            }
        }
    }

    control.set_state(ConnectionState::Closed);
    debug!(channel = %control.channel, "Stream task exited");
}

async fn read_loop(
    control: &ConnectionControl,
    ws_stream: WsStream,
    sink: &mut dyn FrameSink,
) -> ReadOutcome {
    let (mut write, mut read) = ws_stream.split();

    loop {
        tokio::select! {
            biased;

            () = control.cancel.cancelled() => {
                if let Err(e) = write.send(Message::Close(None)).await {
                    debug!(?e, "Failed to send Close frame during teardown");
                }
                return ReadOutcome::Closed;
            }

            msg = read.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if !control.deliver(sink, |s| s.on_text(&text)) {
                            return ReadOutcome::Closed;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = write.send(Message::Pong(data)).await {
                            return ReadOutcome::Failed(e.into());
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame
                            .map(|f| (f.code.into(), f.reason.to_string()))
                            .unwrap_or((1000, "Normal close".to_string()));
                        warn!(channel = %control.channel, code, %reason, "Stream closed by server");
                        return ReadOutcome::Failed(WsError::ConnectionClosed { code, reason });
                    }
                    Some(Err(e)) => {
                        return ReadOutcome::Failed(e.into());
                    }
                    None => {
                        return ReadOutcome::Failed(WsError::StreamEnded);
                    }
                    _ => {}
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct CountingSink {
        texts: Vec<String>,
        errors: usize,
        close_on_text: Option<ConnectionControl>,
    }

    impl FrameSink for CountingSink {
        fn on_text(&mut self, text: &str) {
            self.texts.push(text.to_string());
            if let Some(control) = &self.close_on_text {
                control.close();
            }
        }

        fn on_transport_error(&mut self, _error: WsError) {
            self.errors += 1;
        }
    }

    #[test]
    fn test_deliver_blocked_after_close() {
        let control = ConnectionControl::new("btcusdt@kline_1m");
        let mut sink = CountingSink::default();

        assert!(control.deliver(&mut sink, |s| s.on_text("a")));
        control.close();
        assert!(!control.deliver(&mut sink, |s| s.on_text("b")));

        assert_eq!(sink.texts, vec!["a"]);
        assert_eq!(control.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_close_from_inside_callback() {
        let control = ConnectionControl::new("btcusdt@ticker");
        let mut sink = CountingSink {
            close_on_text: Some(control.clone()),
            ..Default::default()
        };

        // Reentrant gate: close() inside the callback must not deadlock.
        assert!(!control.deliver(&mut sink, |s| s.on_text("a")));
        assert!(control.is_closed());
        assert!(!control.deliver(&mut sink, |s| s.on_text("b")));
        assert_eq!(sink.texts.len(), 1);
    }

    #[test]
    fn test_close_is_idempotent() {
        let control = ConnectionControl::new("btcusdt@ticker");
        control.close();
        control.close();
        assert!(control.is_closed());
        assert_eq!(control.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_retry_only_when_failed() {
        let control = ConnectionControl::new("btcusdt@ticker");
        assert!(!control.retry());

        control.set_state(ConnectionState::Connected);
        assert!(!control.retry());

        control.set_state(ConnectionState::Failed);
        assert!(control.retry());

        control.close();
        assert!(!control.retry());
    }

    #[test]
    fn test_closed_state_is_sticky() {
        let control = ConnectionControl::new("btcusdt@ticker");
        control.close();
        control.set_state(ConnectionState::Connected);
        assert_eq!(control.state(), ConnectionState::Closed);
    }
}
