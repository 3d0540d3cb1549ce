//! Circuit breaker with a cooldown latch.
//!
//! The breaker owns the price, volume and trade buffers. `evaluate()` is the
//! only place the latch changes state:
//!
//! - Armed: metrics are computed and compared against thresholds in a fixed
//!   order (volatility, price change, volume change, trade frequency). The
//!   first breach trips the latch.
//! - Tripped: every call is blocked until `cooldown` has elapsed since the
//!   trip; the first call after that re-arms and is allowed.
//!
//! Trips are broadcast on a `watch` channel so in-flight waits can abort.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use peg_core::{Price, RetentionBuffer, Sample, SharedClock, Size};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{RiskError, RiskResult};
use crate::metrics::{change_rate, coefficient_of_variation, cv_exceeds, per_minute, VolatilityMetrics};

// ============================================================================
// Config
// ============================================================================

/// Circuit breaker thresholds and windows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    /// Max coefficient of variation of recent prices.
    #[serde(default = "default_volatility_threshold")]
    pub volatility_threshold: Decimal,
    /// Max relative price move over retained history.
    #[serde(default = "default_price_change_threshold")]
    pub price_change_threshold: Decimal,
    /// Max relative volume move over retained history.
    #[serde(default = "default_volume_change_threshold")]
    pub volume_change_threshold: Decimal,
    /// Max trades per minute in the recent window.
    #[serde(default = "default_trade_frequency_threshold")]
    pub trade_frequency_threshold: Decimal,
    /// Window for volatility and trade frequency, in seconds.
    #[serde(default = "default_recent_window_secs")]
    pub recent_window_secs: u64,
    /// Retention horizon of all buffers, in seconds.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
    /// How long a trip stays latched, in seconds.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
}

fn default_volatility_threshold() -> Decimal {
    Decimal::new(5, 2)
}

fn default_price_change_threshold() -> Decimal {
    Decimal::new(10, 2)
}

fn default_volume_change_threshold() -> Decimal {
    Decimal::new(20, 2)
}

fn default_trade_frequency_threshold() -> Decimal {
    Decimal::from(10)
}

fn default_recent_window_secs() -> u64 {
    300
}

fn default_retention_secs() -> u64 {
    3600
}

fn default_cooldown_secs() -> u64 {
    900
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            volatility_threshold: default_volatility_threshold(),
            price_change_threshold: default_price_change_threshold(),
            volume_change_threshold: default_volume_change_threshold(),
            trade_frequency_threshold: default_trade_frequency_threshold(),
            recent_window_secs: default_recent_window_secs(),
            retention_secs: default_retention_secs(),
            cooldown_secs: default_cooldown_secs(),
        }
    }
}

impl CircuitBreakerConfig {
    pub fn recent_window(&self) -> Duration {
        Duration::seconds(self.recent_window_secs as i64)
    }

    pub fn retention(&self) -> Duration {
        Duration::seconds(self.retention_secs as i64)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::seconds(self.cooldown_secs as i64)
    }

    /// Reject configurations that would make the breaker meaningless.
    pub fn validate(&self) -> RiskResult<()> {
        let thresholds = [
            ("volatility_threshold", self.volatility_threshold),
            ("price_change_threshold", self.price_change_threshold),
            ("volume_change_threshold", self.volume_change_threshold),
            ("trade_frequency_threshold", self.trade_frequency_threshold),
        ];
        for (name, value) in thresholds {
            if value.is_sign_negative() {
                return Err(RiskError::ConfigError(format!(
                    "{name} must be non-negative, got {value}"
                )));
            }
        }
        if self.recent_window_secs == 0 {
            return Err(RiskError::ConfigError(
                "recent_window_secs must be positive".to_string(),
            ));
        }
        if self.retention_secs < self.recent_window_secs {
            return Err(RiskError::ConfigError(format!(
                "retention_secs ({}) shorter than recent_window_secs ({})",
                self.retention_secs, self.recent_window_secs
            )));
        }
        Ok(())
    }
}

// ============================================================================
// BreakReason / Decision
// ============================================================================

/// Why trading is blocked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BreakReason {
    HighVolatility(Decimal),
    ExcessivePriceChange(Decimal),
    ExcessiveVolumeChange(Decimal),
    HighTradeFrequency(Decimal),
    /// Latched from an earlier trip, cooldown not yet elapsed.
    BreakerActive,
}

fn pct(value: Decimal) -> Decimal {
    value
        .checked_mul(Decimal::ONE_HUNDRED)
        .unwrap_or(Decimal::MAX)
        .round_dp(2)
        .normalize()
}

impl fmt::Display for BreakReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HighVolatility(v) => write!(f, "High volatility detected: {}%", pct(*v)),
            Self::ExcessivePriceChange(v) => write!(f, "Excessive price change: {}%", pct(*v)),
            Self::ExcessiveVolumeChange(v) => write!(f, "Excessive volume change: {}%", pct(*v)),
            Self::HighTradeFrequency(v) => {
                write!(f, "High trade frequency: {} trades/min", v.round_dp(2).normalize())
            }
            Self::BreakerActive => write!(f, "circuit breaker active"),
        }
    }
}

/// Result of [`CircuitBreaker::evaluate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub blocked: bool,
    pub reason: Option<BreakReason>,
}

impl Decision {
    pub fn allow() -> Self {
        Self {
            blocked: false,
            reason: None,
        }
    }

    pub fn block(reason: BreakReason) -> Self {
        Self {
            blocked: true,
            reason: Some(reason),
        }
    }

    #[inline]
    pub fn is_allowed(&self) -> bool {
        !self.blocked
    }
}

/// Read-only view for status reporting.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitBreakerStatus {
    pub is_active: bool,
    pub last_break_time: Option<DateTime<Utc>>,
    pub metrics: VolatilityMetrics,
    pub thresholds: CircuitBreakerConfig,
}

// ============================================================================
// CircuitBreaker
// ============================================================================

struct BreakerState {
    prices: RetentionBuffer<Decimal>,
    volumes: RetentionBuffer<Decimal>,
    trades: RetentionBuffer<()>,
    is_active: bool,
    last_break_time: Option<DateTime<Utc>>,
}

impl BreakerState {
    fn new(retention: Duration) -> Self {
        Self {
            prices: RetentionBuffer::new(retention),
            volumes: RetentionBuffer::new(retention),
            trades: RetentionBuffer::new(retention),
            is_active: false,
            last_break_time: None,
        }
    }
}

/// Rolling-window risk gate.
///
/// Thread-safe: share via `Arc<CircuitBreaker>`. All buffer mutations and
/// reads happen under one lock so a concurrent prune is never half-visible.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    clock: SharedClock,
    state: Mutex<BreakerState>,
    /// Incremented on every trip.
    trips: watch::Sender<u64>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig, clock: SharedClock) -> Self {
        let (trips, _) = watch::channel(0);
        let state = Mutex::new(BreakerState::new(config.retention()));
        Self {
            config,
            clock,
            state,
            trips,
        }
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Receiver that observes a change on every trip.
    pub fn subscribe_trips(&self) -> watch::Receiver<u64> {
        self.trips.subscribe()
    }

    pub fn record_price(&self, price: Price, timestamp: Option<DateTime<Utc>>) {
        let now = self.clock.now();
        let sample = Sample::new(timestamp.unwrap_or(now), price.inner());
        self.state.lock().prices.push(sample, now);
    }

    pub fn record_volume(&self, volume: Size, timestamp: Option<DateTime<Utc>>) {
        let now = self.clock.now();
        let sample = Sample::new(timestamp.unwrap_or(now), volume.inner());
        self.state.lock().volumes.push(sample, now);
    }

    pub fn record_trade(&self, timestamp: Option<DateTime<Utc>>) {
        let now = self.clock.now();
        let sample = Sample::new(timestamp.unwrap_or(now), ());
        self.state.lock().trades.push(sample, now);
    }

    /// Drop expired samples from every buffer. Returns the number removed.
    pub fn prune(&self) -> usize {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.prices.prune(now) + state.volumes.prune(now) + state.trades.prune(now)
    }

    /// Decide whether trading is currently allowed.
    pub fn evaluate(&self) -> Decision {
        let now = self.clock.now();
        let mut state = self.state.lock();

        if state.is_active {
            let since_break = state
                .last_break_time
                .map(|t| now - t)
                .unwrap_or_else(Duration::zero);
            if since_break < self.config.cooldown() {
                return Decision::block(BreakReason::BreakerActive);
            }
            state.is_active = false;
            info!(
                tripped_at = ?state.last_break_time,
                "Circuit breaker cooldown elapsed, re-armed"
            );
            return Decision::allow();
        }

        let Some(reason) = self.check_thresholds(&state, now) else {
            return Decision::allow();
        };

        state.is_active = true;
        state.last_break_time = Some(now);
        drop(state);

        warn!(reason = %reason, "Circuit breaker tripped");
        self.trips.send_modify(|n| *n += 1);
        Decision::block(reason)
    }

    /// First breached threshold, in fixed priority order.
    fn check_thresholds(&self, state: &BreakerState, now: DateTime<Utc>) -> Option<BreakReason> {
        let recent_since = now - self.config.recent_window();

        let recent_prices = state.prices.values_since(recent_since, now);
        if cv_exceeds(&recent_prices, self.config.volatility_threshold) {
            return Some(BreakReason::HighVolatility(coefficient_of_variation(
                &recent_prices,
            )));
        }

        let price_change = retained_change(&state.prices, now);
        if price_change > self.config.price_change_threshold {
            return Some(BreakReason::ExcessivePriceChange(price_change));
        }

        let volume_change = retained_change(&state.volumes, now);
        if volume_change > self.config.volume_change_threshold {
            return Some(BreakReason::ExcessiveVolumeChange(volume_change));
        }

        let frequency = self.trade_frequency(state, now);
        if frequency > self.config.trade_frequency_threshold {
            return Some(BreakReason::HighTradeFrequency(frequency));
        }

        debug!(
            price_change = %price_change,
            volume_change = %volume_change,
            trade_frequency = %frequency,
            "Circuit breaker checks passed"
        );
        None
    }

    fn trade_frequency(&self, state: &BreakerState, now: DateTime<Utc>) -> Decimal {
        let since = now - self.config.recent_window();
        let count = state.trades.iter_since(since, now).count();
        per_minute(count, self.config.recent_window())
    }

    fn metrics_locked(&self, state: &BreakerState, now: DateTime<Utc>) -> VolatilityMetrics {
        let recent_prices = state
            .prices
            .values_since(now - self.config.recent_window(), now);
        VolatilityMetrics {
            current_volatility: coefficient_of_variation(&recent_prices),
            price_change_rate: retained_change(&state.prices, now),
            volume_change_rate: retained_change(&state.volumes, now),
            trade_frequency: self.trade_frequency(state, now),
        }
    }

    /// Current metrics without touching the latch.
    pub fn metrics(&self) -> VolatilityMetrics {
        let now = self.clock.now();
        let state = self.state.lock();
        self.metrics_locked(&state, now)
    }

    pub fn status(&self) -> CircuitBreakerStatus {
        let now = self.clock.now();
        let state = self.state.lock();
        CircuitBreakerStatus {
            is_active: state.is_active,
            last_break_time: state.last_break_time,
            metrics: self.metrics_locked(&state, now),
            thresholds: self.config.clone(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.state.lock().is_active
    }
}

fn retained_change(buffer: &RetentionBuffer<Decimal>, now: DateTime<Utc>) -> Decimal {
    change_rate(
        buffer.first_retained(now).map(|s| s.value),
        buffer.last_retained(now).map(|s| s.value),
    )
}
