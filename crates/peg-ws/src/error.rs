//! WebSocket error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WsError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed: code={code}, reason={reason}")]
    ConnectionClosed { code: u16, reason: String },

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Message parse error: {0}")]
    ParseError(String),

    #[error("Tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type WsResult<T> = Result<T, WsError>;

/// Failure reported by an event handler.
///
/// Contained to the invocation that produced it.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Handler failed: {0}")]
    Failed(String),
}

impl From<WsError> for HandlerError {
    fn from(e: WsError) -> Self {
        match e {
            WsError::ParseError(msg) => HandlerError::InvalidPayload(msg),
            other => HandlerError::Failed(other.to_string()),
        }
    }
}
