//! Streaming transport for market data subscriptions.
//!
//! Every subscription owns exactly one WebSocket connection:
//! - Channel naming and stream URL construction (single and combined streams)
//! - Combined-stream envelope decoding
//! - A connection task per subscription with a deterministic teardown gate
//! - Exponential backoff policy for callers that opt into reconnects

pub mod backoff;
pub mod connection;
pub mod error;
pub mod message;
pub mod subscription;

pub use backoff::BackoffPolicy;
pub use connection::{ConnectionControl, ConnectionHandle, ConnectionState, FrameSink, StreamConnection};
pub use error::{WsError, WsResult};
pub use message::{CombinedEnvelope, StreamFrame};
pub use subscription::{channel_name, StreamTarget, Subscription, SubscriptionKind};

use std::sync::Once;

static INIT_CRYPTO: Once = Once::new();

/// Initialize the TLS crypto provider.
/// Must be called before any WebSocket connections are made.
pub fn init_crypto() {
    INIT_CRYPTO.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}
