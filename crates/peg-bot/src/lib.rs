//! Peg stabilization agent.
//!
//! Main application that orchestrates all components:
//! - Price feed ingestion over WebSocket
//! - Circuit breaker checks
//! - Trade sizing and execution planning
//! - Mint/burn execution through the gateway

pub mod app;
pub mod config;
pub mod error;
pub mod orchestrator;

pub use app::Application;
pub use config::{AppConfig, TradingConfig};
pub use error::{AppError, AppResult};
pub use orchestrator::{AbortReason, CycleOutcome, DecisionOrchestrator, OrchestratorParts};
