//! Executor error types.

use thiserror::Error;

use crate::signer::KeyError;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Gateway error: {0}")]
    Gateway(String),

    #[error("Broadcast rejected: {0}")]
    BroadcastRejected(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Invalid contract response: {0}")]
    InvalidResponse(String),

    #[error("No trading key loaded")]
    NoSigner,

    #[error("Execution cancelled")]
    Cancelled,

    #[error("Key error: {0}")]
    Key(#[from] KeyError),
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;
