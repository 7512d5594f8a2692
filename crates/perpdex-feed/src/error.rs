//! Feed error types.

use perpdex_ws::WsError;
use thiserror::Error;

/// Failures from the REST loader and the streaming synchronizer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataSourceError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("HTTP {code} {status_text}: {body}")]
    Status {
        code: u16,
        status_text: String,
        body: String,
    },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl DataSourceError {
    /// Decode error naming the offending field.
    pub fn field(field: &str, reason: impl std::fmt::Display) -> Self {
        Self::Decode(format!("field '{field}': {reason}"))
    }

    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

impl From<WsError> for DataSourceError {
    fn from(error: WsError) -> Self {
        match error {
            WsError::InvalidSubscription(reason) => Self::InvalidRequest(reason),
            WsError::ParseError(reason) => Self::Decode(reason),
            WsError::Json(e) => Self::Decode(e.to_string()),
            other => Self::Transport(other.to_string()),
        }
    }
}

pub type FeedResult<T> = Result<T, DataSourceError>;
