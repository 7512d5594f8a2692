//! Inbound stream message framing.
//!
//! Plain streams deliver the event object directly. Combined streams wrap each
//! event as `{"stream": "<channel>", "data": {...}}`. Both are reduced to a
//! [`StreamFrame`] naming the channel the event belongs to.

use crate::error::{WsError, WsResult};
use crate::subscription::Subscription;
use serde::Deserialize;
use serde_json::Value;

/// Combined stream envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct CombinedEnvelope {
    pub stream: String,
    pub data: Value,
}

/// One event, tagged with its channel.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamFrame {
    pub channel: String,
    pub data: Value,
}

impl StreamFrame {
    /// Parse a text frame received on `subscription`'s connection.
    ///
    /// Envelopes naming a channel outside the subscription are rejected.
    pub fn parse(text: &str, subscription: &Subscription) -> WsResult<Self> {
        if !subscription.is_combined() {
            let data: Value = serde_json::from_str(text)?;
            return Ok(Self {
                channel: subscription.key(),
                data,
            });
        }

        let envelope: CombinedEnvelope = serde_json::from_str(text)?;
        if !subscription.channels().contains(&envelope.stream) {
            return Err(WsError::ParseError(format!(
                "unexpected stream '{}' on {}",
                envelope.stream, subscription
            )));
        }
        Ok(Self {
            channel: envelope.stream,
            data: envelope.data,
        })
    }

    /// Event type tag (`e` field), when present.
    pub fn event_type(&self) -> Option<&str> {
        self.data.get("e").and_then(Value::as_str)
    }
}
