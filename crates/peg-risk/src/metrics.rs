//! Rolling-window metrics feeding the circuit breaker.
//!
//! All arithmetic stays in `Decimal`. Degenerate inputs (no samples, zero
//! mean, zero baseline) yield zero rather than an error.

use chrono::Duration;
use rust_decimal::{Decimal, MathematicalOps};
use serde::{Deserialize, Serialize};

/// Snapshot of the metrics the breaker compares against its thresholds.
///
/// Derived on demand from the buffers; never cached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolatilityMetrics {
    /// Population std / mean of prices in the recent window.
    pub current_volatility: Decimal,
    /// |latest - earliest| / earliest over retained prices.
    pub price_change_rate: Decimal,
    /// |latest - earliest| / earliest over retained volumes.
    pub volume_change_rate: Decimal,
    /// Trades per minute in the recent window.
    pub trade_frequency: Decimal,
}

/// Population mean and variance.
///
/// `None` for an empty slice or when the sums overflow `Decimal`.
pub fn mean_and_variance(values: &[Decimal]) -> Option<(Decimal, Decimal)> {
    if values.is_empty() {
        return None;
    }
    let n = Decimal::from(values.len());
    let sum = values
        .iter()
        .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(*v))?;
    let mean = sum.checked_div(n)?;
    let squares = values.iter().try_fold(Decimal::ZERO, |acc, v| {
        let d = v.checked_sub(mean)?;
        acc.checked_add(d.checked_mul(d)?)
    })?;
    Some((mean, squares.checked_div(n)?))
}

/// Coefficient of variation (std / |mean|).
///
/// Saturates at `Decimal::MAX` when the series is too wide to compute.
pub fn coefficient_of_variation(values: &[Decimal]) -> Decimal {
    if values.is_empty() {
        return Decimal::ZERO;
    }
    match mean_and_variance(values) {
        Some((mean, variance)) if !mean.is_zero() => variance
            .sqrt()
            .and_then(|std| std.checked_div(mean.abs()))
            .unwrap_or(Decimal::MAX),
        Some(_) => Decimal::ZERO,
        None => Decimal::MAX,
    }
}

/// Whether the coefficient of variation is strictly above `threshold`.
///
/// Compares `variance > threshold² · mean²` so a value exactly at the
/// threshold never trips on square-root rounding. An overflowing series
/// counts as a breach.
pub fn cv_exceeds(values: &[Decimal], threshold: Decimal) -> bool {
    if values.is_empty() {
        return false;
    }
    match mean_and_variance(values) {
        Some((mean, variance)) if !mean.is_zero() => {
            let bound = threshold
                .checked_mul(threshold)
                .and_then(|t| t.checked_mul(mean))
                .and_then(|t| t.checked_mul(mean));
            match bound {
                Some(bound) => variance > bound,
                // Bound beyond Decimal range, variance cannot reach it.
                None => false,
            }
        }
        Some(_) => false,
        None => true,
    }
}

/// Relative change from `earliest` to `latest`, saturating at `Decimal::MAX`.
pub fn change_rate(earliest: Option<Decimal>, latest: Option<Decimal>) -> Decimal {
    match (earliest, latest) {
        (Some(first), Some(last)) if !first.is_zero() => last
            .checked_sub(first)
            .and_then(|d| d.abs().checked_div(first.abs()))
            .unwrap_or(Decimal::MAX),
        _ => Decimal::ZERO,
    }
}

/// Events per minute over `window`.
pub fn per_minute(count: usize, window: Duration) -> Decimal {
    let minutes = Decimal::from(window.num_seconds()) / Decimal::from(60);
    if minutes.is_zero() {
        return Decimal::ZERO;
    }
    Decimal::from(count) / minutes
}
