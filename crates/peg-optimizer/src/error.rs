//! Optimizer error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OptimizerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type OptimizerResult<T> = Result<T, OptimizerError>;
