//! WebSocket error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WsError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed: code={code}, reason={reason}")]
    ConnectionClosed { code: u16, reason: String },

    #[error("Stream ended without a close frame")]
    StreamEnded,

    #[error("Invalid subscription: {0}")]
    InvalidSubscription(String),

    #[error("Message parse error: {0}")]
    ParseError(String),

    #[error("Tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WsError {
    /// Whether the error came from the transport rather than from a payload.
    pub fn is_transport(&self) -> bool {
        !matches!(
            self,
            Self::ParseError(_) | Self::Json(_) | Self::InvalidSubscription(_)
        )
    }
}

pub type WsResult<T> = Result<T, WsError>;
