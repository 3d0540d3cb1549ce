//! Optimizer configuration.

use chrono::Duration;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{OptimizerError, OptimizerResult};
use crate::gas::GasStrategyTable;
use crate::split::SplitPolicy;
use crate::window::WindowSearch;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerConfig {
    #[serde(default)]
    pub strategies: GasStrategyTable,
    /// Windows below this confidence are ignored in favour of immediate execution.
    #[serde(default = "default_min_confidence")]
    pub min_confidence: Decimal,
    /// Most recent observations used for gas percentiles.
    #[serde(default = "default_percentile_samples")]
    pub percentile_samples: usize,
    /// Gas history retention, in seconds.
    #[serde(default = "default_gas_retention_secs")]
    pub gas_retention_secs: u64,
    #[serde(default)]
    pub window: WindowSearch,
    #[serde(default)]
    pub split: SplitPolicy,
}

fn default_min_confidence() -> Decimal {
    Decimal::new(7, 1)
}

fn default_percentile_samples() -> usize {
    100
}

fn default_gas_retention_secs() -> u64 {
    24 * 3600
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            strategies: GasStrategyTable::default(),
            min_confidence: default_min_confidence(),
            percentile_samples: default_percentile_samples(),
            gas_retention_secs: default_gas_retention_secs(),
            window: WindowSearch::default(),
            split: SplitPolicy::default(),
        }
    }
}

impl OptimizerConfig {
    pub fn gas_retention(&self) -> Duration {
        Duration::seconds(self.gas_retention_secs as i64)
    }

    pub fn validate(&self) -> OptimizerResult<()> {
        if self.window.smoothing_period == 0 {
            return Err(OptimizerError::ConfigError(
                "window.smoothing_period must be at least 1".to_string(),
            ));
        }
        if self.percentile_samples == 0 {
            return Err(OptimizerError::ConfigError(
                "percentile_samples must be at least 1".to_string(),
            ));
        }
        if self.min_confidence < Decimal::ZERO || self.min_confidence > Decimal::ONE {
            return Err(OptimizerError::ConfigError(format!(
                "min_confidence must be within [0, 1], got {}",
                self.min_confidence
            )));
        }
        if self.split.max_parts == 0 {
            return Err(OptimizerError::ConfigError(
                "split.max_parts must be at least 1".to_string(),
            ));
        }
        if self.gas_retention_secs < self.window.lookback_secs {
            return Err(OptimizerError::ConfigError(format!(
                "gas_retention_secs ({}) shorter than window.lookback_secs ({})",
                self.gas_retention_secs, self.window.lookback_secs
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(OptimizerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_zero_smoothing() {
        let mut config = OptimizerConfig::default();
        config.window.smoothing_period = 0;
        assert!(config.validate().is_err());
    }
}
