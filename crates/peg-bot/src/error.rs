//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] peg_ws::WsError),

    #[error("Gateway error: {0}")]
    Gateway(#[from] peg_gateway::GatewayError),

    #[error("Risk error: {0}")]
    Risk(#[from] peg_risk::RiskError),

    #[error("Optimizer error: {0}")]
    Optimizer(#[from] peg_optimizer::OptimizerError),

    #[error("Executor error: {0}")]
    Executor(#[from] peg_executor::ExecutorError),

    #[error("Key error: {0}")]
    Key(#[from] peg_executor::KeyError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] peg_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
