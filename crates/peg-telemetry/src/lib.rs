//! Prometheus metrics, trade statistics and structured logging.
//!
//! - [`Observability`]: collaborator trait the orchestrator reports through
//! - [`PrometheusObserver`]: registry-owning implementation with gauges, counters and [`TradeStats`]
//! - [`init_logging`]: one-time `tracing` subscriber setup

pub mod error;
pub mod logging;
pub mod metrics;
pub mod stats;

pub use error::{TelemetryError, TelemetryResult};
pub use logging::init_logging;
pub use metrics::{Observability, PrometheusObserver};
pub use stats::{TradeRecord, TradeStats};
