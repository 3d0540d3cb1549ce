//! Gateway error types.

use peg_executor::ExecutorError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl GatewayError {
    /// Whether a retry may succeed.
    ///
    /// Transport failures, throttling, server errors and malformed payloads
    /// are retried; other client errors and RPC errors are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::HttpClient(_) | Self::InvalidResponse(_) | Self::Json(_) => true,
            Self::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            Self::Rpc { .. } => false,
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(e: reqwest::Error) -> Self {
        Self::HttpClient(e.to_string())
    }
}

impl From<GatewayError> for ExecutorError {
    fn from(e: GatewayError) -> Self {
        ExecutorError::Gateway(e.to_string())
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(GatewayError::HttpClient("reset".into()).is_transient());
        assert!(GatewayError::InvalidResponse("missing".into()).is_transient());
        assert!(GatewayError::HttpStatus { status: 503, body: String::new() }.is_transient());
        assert!(GatewayError::HttpStatus { status: 429, body: String::new() }.is_transient());
        assert!(!GatewayError::HttpStatus { status: 400, body: String::new() }.is_transient());
        assert!(!GatewayError::Rpc { code: -32000, message: "reverted".into() }.is_transient());
    }
}
