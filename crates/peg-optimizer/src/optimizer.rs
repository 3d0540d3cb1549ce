//! Execution optimizer facade.

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use peg_core::{RetentionBuffer, Sample, SharedClock, Size};
use serde::Serialize;
use tracing::debug;

use crate::config::OptimizerConfig;
use crate::gas::{GasPercentiles, GasUrgency};
use crate::window::TradeWindow;

/// How to execute one sized trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionPlan {
    /// Sub-order sizes, executed in order. Sum to the requested size.
    pub sub_sizes: Vec<Size>,
    /// Gwei.
    pub gas_price: u64,
    pub wait_seconds: u64,
    /// The window the plan was derived from, if one was accepted.
    pub window: Option<TradeWindow>,
}

impl ExecutionPlan {
    pub fn wait(&self) -> StdDuration {
        StdDuration::from_secs(self.wait_seconds)
    }

    pub fn total_size(&self) -> Size {
        self.sub_sizes.iter().copied().sum()
    }
}

/// Owns the gas price history and derives gas, timing and split decisions.
///
/// Thread-safe: share via `Arc<ExecutionOptimizer>`.
pub struct ExecutionOptimizer {
    config: OptimizerConfig,
    clock: SharedClock,
    gas: Mutex<RetentionBuffer<u64>>,
}

impl ExecutionOptimizer {
    pub fn new(config: OptimizerConfig, clock: SharedClock) -> Self {
        let gas = Mutex::new(RetentionBuffer::new(config.gas_retention()));
        Self { config, clock, gas }
    }

    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }

    /// Record a gas price observation in gwei.
    pub fn record_gas_price(&self, gwei: u64, timestamp: Option<DateTime<Utc>>) {
        let now = self.clock.now();
        let sample = Sample::new(timestamp.unwrap_or(now), gwei);
        self.gas.lock().push(sample, now);
    }

    pub fn prune(&self) -> usize {
        let now = self.clock.now();
        self.gas.lock().prune(now)
    }

    pub fn latest_gas_price(&self) -> Option<u64> {
        let now = self.clock.now();
        self.gas.lock().last_retained(now).map(|s| s.value)
    }

    pub fn gas_percentiles(&self) -> GasPercentiles {
        let now = self.clock.now();
        let recent: Vec<u64> = self
            .gas
            .lock()
            .last_n(self.config.percentile_samples, now)
            .into_iter()
            .map(|s| s.value)
            .collect();
        GasPercentiles::from_values(&recent)
    }

    /// Gas price for `urgency`, in gwei.
    pub fn optimal_gas_price(&self, urgency: GasUrgency) -> u64 {
        let reference = self.gas_percentiles().for_urgency(urgency);
        self.config.strategies.get(urgency).price_from(reference)
    }

    /// Best window to execute `size` within `horizon`.
    ///
    /// Falls back to an immediate window at medium gas when no cheap interval
    /// qualifies. `None` only without any gas history.
    pub fn find_execution_window(&self, size: Size, horizon: Duration) -> Option<TradeWindow> {
        let now = self.clock.now();
        let (has_history, recent) = {
            let gas = self.gas.lock();
            let since = now - self.config.window.lookback();
            let recent: Vec<Sample<u64>> = gas
                .iter_retained(now)
                .filter(|s| s.timestamp > since)
                .copied()
                .collect();
            (gas.first_retained(now).is_some(), recent)
        };

        if !has_history {
            return None;
        }

        if let Some(window) = self.config.window.best_candidate(&recent, size, horizon, now) {
            debug!(
                start = %window.start_time,
                gas = window.estimated_gas_price,
                confidence = %window.confidence,
                "Execution window found"
            );
            return Some(window);
        }

        let gas = self.optimal_gas_price(GasUrgency::Medium);
        debug!(gas, samples = recent.len(), "No cheap window, using immediate fallback");
        Some(self.config.window.fallback(size, gas, now))
    }

    /// Sub-order sizes for `size` at `gas_price`.
    pub fn should_split(&self, size: Size, gas_price: u64) -> Vec<Size> {
        self.config.split.split(size, gas_price)
    }

    /// Plan gas, delay and splits for one trade.
    pub fn plan_execution(&self, size: Size, max_wait: Duration) -> ExecutionPlan {
        let window = self
            .find_execution_window(size, max_wait)
            .filter(|w| w.confidence >= self.config.min_confidence);

        match window {
            None => {
                let gas_price = self.optimal_gas_price(GasUrgency::Medium);
                ExecutionPlan {
                    sub_sizes: self.should_split(size, gas_price),
                    gas_price,
                    wait_seconds: 0,
                    window: None,
                }
            }
            Some(window) => {
                let now = self.clock.now();
                let wait_seconds = (window.start_time - now).num_seconds().max(0) as u64;
                let gas_price = window.estimated_gas_price;
                ExecutionPlan {
                    sub_sizes: self.should_split(size, gas_price),
                    gas_price,
                    wait_seconds,
                    window: Some(window),
                }
            }
        }
    }
}
