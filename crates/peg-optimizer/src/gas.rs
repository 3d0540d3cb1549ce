//! Urgency-tiered gas pricing.

use std::fmt;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Execution priority. Ordered from cheapest to most aggressive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GasUrgency {
    Low,
    Medium,
    High,
    Urgent,
}

impl GasUrgency {
    pub const ALL: [GasUrgency; 4] = [Self::Low, Self::Medium, Self::High, Self::Urgent];
}

impl fmt::Display for GasUrgency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Urgent => "urgent",
        };
        f.write_str(s)
    }
}

/// Price bounds and multiplier for one urgency tier. Prices in gwei.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasStrategy {
    pub base_gas_price: u64,
    pub max_gas_price: u64,
    pub priority_multiplier: Decimal,
    pub max_wait_seconds: u64,
}

impl GasStrategy {
    pub fn new(base: u64, max: u64, multiplier: Decimal, max_wait_seconds: u64) -> Self {
        Self {
            base_gas_price: base,
            max_gas_price: max,
            priority_multiplier: multiplier,
            max_wait_seconds,
        }
    }

    /// Apply the multiplier (truncated) and clamp into `[base, max]`.
    ///
    /// The floor wins if a misconfigured tier has `base > max`.
    pub fn price_from(&self, reference: u64) -> u64 {
        let scaled = (Decimal::from(reference) * self.priority_multiplier)
            .trunc()
            .to_u64()
            .unwrap_or(u64::MAX);
        scaled.min(self.max_gas_price).max(self.base_gas_price)
    }
}

/// One strategy per urgency tier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasStrategyTable {
    #[serde(default = "default_low")]
    pub low: GasStrategy,
    #[serde(default = "default_medium")]
    pub medium: GasStrategy,
    #[serde(default = "default_high")]
    pub high: GasStrategy,
    #[serde(default = "default_urgent")]
    pub urgent: GasStrategy,
}

fn default_low() -> GasStrategy {
    GasStrategy::new(30, 50, Decimal::ONE, 300)
}

fn default_medium() -> GasStrategy {
    GasStrategy::new(40, 70, Decimal::new(12, 1), 120)
}

fn default_high() -> GasStrategy {
    GasStrategy::new(50, 100, Decimal::new(15, 1), 30)
}

fn default_urgent() -> GasStrategy {
    GasStrategy::new(70, 150, Decimal::TWO, 0)
}

impl Default for GasStrategyTable {
    fn default() -> Self {
        Self {
            low: default_low(),
            medium: default_medium(),
            high: default_high(),
            urgent: default_urgent(),
        }
    }
}

impl GasStrategyTable {
    pub fn get(&self, urgency: GasUrgency) -> &GasStrategy {
        match urgency {
            GasUrgency::Low => &self.low,
            GasUrgency::Medium => &self.medium,
            GasUrgency::High => &self.high,
            GasUrgency::Urgent => &self.urgent,
        }
    }
}

/// Reference gas prices taken from recent history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasPercentiles {
    pub p25: u64,
    pub p50: u64,
    pub p75: u64,
}

impl Default for GasPercentiles {
    /// Used when no gas history exists yet.
    fn default() -> Self {
        Self {
            p25: 40,
            p50: 50,
            p75: 70,
        }
    }
}

impl GasPercentiles {
    /// Percentiles of `values`, or the defaults if empty.
    pub fn from_values(values: &[u64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }
        let mut sorted = values.to_vec();
        sorted.sort_unstable();
        Self {
            p25: percentile(&sorted, 25),
            p50: percentile(&sorted, 50),
            p75: percentile(&sorted, 75),
        }
    }

    /// Reference price for an urgency tier.
    pub fn for_urgency(&self, urgency: GasUrgency) -> u64 {
        match urgency {
            GasUrgency::Low => self.p25,
            GasUrgency::Medium => self.p50,
            GasUrgency::High | GasUrgency::Urgent => self.p75,
        }
    }
}

/// Linearly interpolated percentile of an ascending slice, truncated.
///
/// Rank is `(n - 1) * pct / 100`; the result lies between the two
/// neighbouring order statistics.
pub fn percentile(sorted: &[u64], pct: u32) -> u64 {
    match sorted.len() {
        0 => 0,
        1 => sorted[0],
        n => {
            let rank = Decimal::from(n - 1) * Decimal::from(pct.min(100)) / Decimal::ONE_HUNDRED;
            let lo = rank.floor().to_usize().unwrap_or(0).min(n - 1);
            let hi = (lo + 1).min(n - 1);
            let frac = rank - Decimal::from(lo);
            let lower = Decimal::from(sorted[lo]);
            let upper = Decimal::from(sorted[hi]);
            (lower + (upper - lower) * frac)
                .trunc()
                .to_u64()
                .unwrap_or(sorted[lo])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentile_interpolates() {
        let sorted = [10, 20, 30, 40];
        // rank 0.75 -> 17.5
        assert_eq!(percentile(&sorted, 25), 17);
        // rank 1.5 -> 25
        assert_eq!(percentile(&sorted, 50), 25);
        // rank 2.25 -> 32.5
        assert_eq!(percentile(&sorted, 75), 32);
        assert_eq!(percentile(&sorted, 100), 40);
        assert_eq!(percentile(&sorted, 0), 10);
    }

    #[test]
    fn test_percentile_single_value() {
        assert_eq!(percentile(&[42], 75), 42);
    }

    #[test]
    fn test_percentiles_default_when_empty() {
        assert_eq!(GasPercentiles::from_values(&[]), GasPercentiles::default());
    }

    #[test]
    fn test_percentiles_unsorted_input() {
        let p = GasPercentiles::from_values(&[40, 10, 30, 20]);
        assert_eq!(p, GasPercentiles { p25: 17, p50: 25, p75: 32 });
    }

    #[test]
    fn test_strategy_clamps() {
        let medium = default_medium();
        // 10 * 1.2 = 12 -> floor at base 40
        assert_eq!(medium.price_from(10), 40);
        // 50 * 1.2 = 60
        assert_eq!(medium.price_from(50), 60);
        // 53 * 1.2 = 63.6 -> truncated
        assert_eq!(medium.price_from(53), 63);
        // 100 * 1.2 = 120 -> capped at 70
        assert_eq!(medium.price_from(100), 70);
    }

    #[test]
    fn test_misconfigured_tier_prefers_floor() {
        let strategy = GasStrategy::new(80, 60, Decimal::ONE, 0);
        assert_eq!(strategy.price_from(70), 80);
    }

    #[test]
    fn test_urgency_display_and_order() {
        assert_eq!(GasUrgency::Urgent.to_string(), "urgent");
        assert!(GasUrgency::Low < GasUrgency::Medium);
        assert!(GasUrgency::High < GasUrgency::Urgent);
    }
}
