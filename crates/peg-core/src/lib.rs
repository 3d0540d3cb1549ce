//! Core domain types for the peg stabilization agent.
//!
//! This crate provides fundamental types used throughout the system:
//! - `Price`, `Size`: Precision-safe numeric types
//! - `Sample`, `RetentionBuffer`: Time-windowed sample storage
//! - `Clock`: Injectable time source
//! - `calculate_trade_size`: Pure mint/burn sizing policy
//! - `BoxFuture`: Future alias for collaborator traits

pub mod clock;
pub mod decimal;
pub mod error;
pub mod future;
pub mod retention;
pub mod sizing;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use decimal::{fixed_point_to_decimal, Price, Size};
pub use error::{CoreError, Result};
pub use future::BoxFuture;
pub use retention::{RetentionBuffer, Sample};
pub use sizing::{calculate_trade_size, TradeDirection, TradeSize, TradeSizingConfig};
