//! Execution optimizer for peg stabilization trades.
//!
//! Owns the 24h gas price history and answers three questions:
//! - What gas price to pay for a given urgency (`gas`)
//! - When to execute (`window`)
//! - Whether to split a trade into sequential sub-orders (`split`)
//!
//! `ExecutionOptimizer::plan_execution` combines them into an `ExecutionPlan`.

pub mod config;
pub mod error;
pub mod gas;
pub mod optimizer;
pub mod split;
pub mod window;

pub use config::OptimizerConfig;
pub use error::{OptimizerError, OptimizerResult};
pub use gas::{GasPercentiles, GasStrategy, GasStrategyTable, GasUrgency};
pub use optimizer::{ExecutionOptimizer, ExecutionPlan};
pub use split::SplitPolicy;
pub use window::{TradeWindow, WindowSearch};
