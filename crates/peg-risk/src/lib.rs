//! Circuit breaker risk gate for peg stabilization trading.
//!
//! Tracks rolling price, volume and trade history and halts trading when:
//! - Volatility: short-window coefficient of variation of price
//! - PriceChange: relative move across the retained price history
//! - VolumeChange: relative move across the retained volume history
//! - TradeFrequency: executed trades per minute
//!
//! A trip latches for a cooldown period and is broadcast to subscribers.

pub mod circuit_breaker;
pub mod error;
pub mod metrics;

pub use circuit_breaker::{
    BreakReason, CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStatus, Decision,
};
pub use error::{RiskError, RiskResult};
pub use metrics::VolatilityMetrics;
