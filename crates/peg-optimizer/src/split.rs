//! Trade splitting against per-transaction gas cost.

use peg_core::Size;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// When and how far to split a trade into sequential sub-orders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitPolicy {
    /// Trades below this size are never split.
    #[serde(default = "default_min_split_size")]
    pub min_split_size: Decimal,
    /// Gas units of a plain transaction.
    #[serde(default = "default_base_tx_gas")]
    pub base_tx_gas: u64,
    #[serde(default = "default_max_parts")]
    pub max_parts: u32,
    /// Size must exceed this many gas costs before splitting at all.
    #[serde(default = "default_split_threshold_multiple")]
    pub split_threshold_multiple: u64,
    /// Each part should be worth at least this many gas costs.
    #[serde(default = "default_part_cost_multiple")]
    pub part_cost_multiple: u64,
}

fn default_min_split_size() -> Decimal {
    Decimal::ONE_THOUSAND
}

fn default_base_tx_gas() -> u64 {
    21_000
}

fn default_max_parts() -> u32 {
    5
}

fn default_split_threshold_multiple() -> u64 {
    10
}

fn default_part_cost_multiple() -> u64 {
    5
}

impl Default for SplitPolicy {
    fn default() -> Self {
        Self {
            min_split_size: default_min_split_size(),
            base_tx_gas: default_base_tx_gas(),
            max_parts: default_max_parts(),
            split_threshold_multiple: default_split_threshold_multiple(),
            part_cost_multiple: default_part_cost_multiple(),
        }
    }
}

impl SplitPolicy {
    /// Split `size` into equal parts that sum exactly to `size`.
    ///
    /// The last part absorbs any rounding from the division.
    pub fn split(&self, size: Size, gas_price: u64) -> Vec<Size> {
        if size.inner() < self.min_split_size {
            return vec![size];
        }

        let gas_cost = Decimal::from(self.base_tx_gas) * Decimal::from(gas_price);
        let threshold = gas_cost * Decimal::from(self.split_threshold_multiple);
        if size.inner() <= threshold {
            return vec![size];
        }

        let max_parts = self.max_parts.max(1);
        let parts = if gas_cost.is_zero() {
            max_parts
        } else {
            let per_part = gas_cost * Decimal::from(self.part_cost_multiple);
            (size.inner() / per_part)
                .floor()
                .to_u32()
                .unwrap_or(max_parts)
                .clamp(1, max_parts)
        };

        let part = size / Decimal::from(parts);
        let mut out = vec![part; parts as usize - 1];
        let allocated: Size = out.iter().copied().sum();
        out.push(size - allocated);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn total(parts: &[Size]) -> Size {
        parts.iter().copied().sum()
    }

    #[test]
    fn test_small_trade_not_split() {
        let policy = SplitPolicy::default();
        let size = Size::new(dec!(999.99));
        assert_eq!(policy.split(size, 0), vec![size]);
    }

    #[test]
    fn test_not_worth_splitting() {
        let policy = SplitPolicy::default();
        // gas cost 21000 * 50 = 1_050_000; threshold 10_500_000
        let size = Size::new(dec!(10500000));
        assert_eq!(policy.split(size, 50), vec![size]);
    }

    #[test]
    fn test_split_count_from_gas_cost() {
        let policy = SplitPolicy::default();
        // gas cost 21000; 5 * cost = 105_000; 300_000 / 105_000 = 2.86 -> 2 parts
        let size = Size::new(dec!(300000));
        let parts = policy.split(size, 1);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0], Size::new(dec!(150000)));
        assert_eq!(total(&parts), size);
    }

    #[test]
    fn test_split_capped_at_max_parts() {
        let policy = SplitPolicy::default();
        let size = Size::new(dec!(100000000));
        let parts = policy.split(size, 1);
        assert_eq!(parts.len(), 5);
        assert_eq!(total(&parts), size);
    }

    #[test]
    fn test_zero_gas_splits_max() {
        let policy = SplitPolicy::default();
        let size = Size::new(dec!(10000));
        let parts = policy.split(size, 0);
        assert_eq!(parts.len(), 5);
        assert_eq!(total(&parts), size);
    }

    #[test]
    fn test_last_part_absorbs_rounding() {
        let policy = SplitPolicy {
            max_parts: 3,
            ..Default::default()
        };
        let size = Size::new(dec!(10000));
        let parts = policy.split(size, 0);
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], parts[1]);
        assert_ne!(parts[2], parts[0]);
        assert_eq!(total(&parts), size);
    }

    #[test]
    fn test_parts_within_bounds() {
        let policy = SplitPolicy::default();
        for (size, gas) in [(dec!(1000), 0u64), (dec!(5000000), 3), (dec!(123456.789), 0), (dec!(42), 9)] {
            let size = Size::new(size);
            let parts = policy.split(size, gas);
            assert!((1..=5).contains(&parts.len()));
            assert_eq!(total(&parts), size);
        }
    }
}
