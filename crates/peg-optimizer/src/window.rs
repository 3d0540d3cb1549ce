//! Execution window search over recent gas prices.
//!
//! Gas prices are smoothed with a moving average; each strict local minimum
//! of the smoothed series is a candidate. A candidate is projected one
//! recurrence period ahead of when it was observed and scored by how stable
//! raw prices were around it.

use chrono::{DateTime, Duration, Utc};
use peg_core::{Sample, Size};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, MathematicalOps};
use serde::{Deserialize, Serialize};

/// A proposed execution interval. Built fresh per search, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeWindow {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub size: Size,
    /// Gwei.
    pub estimated_gas_price: u64,
    /// In `[0, 1]`.
    pub confidence: Decimal,
}

/// Window search parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowSearch {
    /// How far back gas history is analysed, in seconds.
    #[serde(default = "default_lookback_secs")]
    pub lookback_secs: u64,
    /// Moving average length, in samples.
    #[serde(default = "default_smoothing_period")]
    pub smoothing_period: usize,
    /// Raw samples on each side of a minimum used for the stability score.
    #[serde(default = "default_stability_radius")]
    pub stability_radius: usize,
    /// Period after which a cheap interval is expected to recur, in seconds.
    #[serde(default = "default_recurrence_secs")]
    pub recurrence_secs: u64,
    /// Length of a proposed window, in seconds.
    #[serde(default = "default_window_duration_secs")]
    pub window_duration_secs: u64,
    /// Confidence assigned to the immediate fallback window.
    #[serde(default = "default_fallback_confidence")]
    pub fallback_confidence: Decimal,
}

fn default_lookback_secs() -> u64 {
    3600
}

fn default_smoothing_period() -> usize {
    5
}

fn default_stability_radius() -> usize {
    5
}

fn default_recurrence_secs() -> u64 {
    3600
}

fn default_window_duration_secs() -> u64 {
    300
}

fn default_fallback_confidence() -> Decimal {
    Decimal::new(5, 1)
}

impl Default for WindowSearch {
    fn default() -> Self {
        Self {
            lookback_secs: default_lookback_secs(),
            smoothing_period: default_smoothing_period(),
            stability_radius: default_stability_radius(),
            recurrence_secs: default_recurrence_secs(),
            window_duration_secs: default_window_duration_secs(),
            fallback_confidence: default_fallback_confidence(),
        }
    }
}

impl WindowSearch {
    pub fn lookback(&self) -> Duration {
        Duration::seconds(self.lookback_secs as i64)
    }

    pub fn recurrence(&self) -> Duration {
        Duration::seconds(self.recurrence_secs as i64)
    }

    pub fn window_duration(&self) -> Duration {
        Duration::seconds(self.window_duration_secs as i64)
    }

    /// Window starting now at the given gas price.
    pub fn fallback(&self, size: Size, gas_price: u64, now: DateTime<Utc>) -> TradeWindow {
        TradeWindow {
            start_time: now,
            end_time: now + self.window_duration(),
            size,
            estimated_gas_price: gas_price,
            confidence: self.fallback_confidence,
        }
    }

    /// Best candidate window starting no later than `now + horizon`.
    ///
    /// `samples` must be the lookback slice, oldest first. Returns `None`
    /// when there is no qualifying local minimum.
    pub fn best_candidate(
        &self,
        samples: &[Sample<u64>],
        size: Size,
        horizon: Duration,
        now: DateTime<Utc>,
    ) -> Option<TradeWindow> {
        let raw: Vec<u64> = samples.iter().map(|s| s.value).collect();
        let smoothed = moving_average(&raw, self.smoothing_period);
        let overall_mean = mean(&raw)?;
        let latest_start = now + horizon;
        let centre_offset = self.smoothing_period.saturating_sub(1) / 2;

        let mut best: Option<TradeWindow> = None;
        for m in local_minima(&smoothed) {
            let centre = m + centre_offset;
            let projected = samples[centre].timestamp + self.recurrence();
            let start_time = projected.max(now);
            if start_time > latest_start {
                continue;
            }

            let confidence = stability_confidence(&raw, centre, self.stability_radius, overall_mean);
            if best.as_ref().is_some_and(|b| confidence <= b.confidence) {
                continue;
            }
            best = Some(TradeWindow {
                start_time,
                end_time: start_time + self.window_duration(),
                size,
                estimated_gas_price: smoothed[m].trunc().to_u64().unwrap_or(raw[centre]),
                confidence,
            });
        }
        best
    }
}

/// Moving average in "valid" mode: one output per full window.
pub fn moving_average(values: &[u64], period: usize) -> Vec<Decimal> {
    if period == 0 || values.len() < period {
        return Vec::new();
    }
    let divisor = Decimal::from(period);
    values
        .windows(period)
        .map(|w| w.iter().map(|v| Decimal::from(*v)).sum::<Decimal>() / divisor)
        .collect()
}

/// Indices strictly lower than both neighbours.
pub fn local_minima(series: &[Decimal]) -> Vec<usize> {
    if series.len() < 3 {
        return Vec::new();
    }
    (1..series.len() - 1)
        .filter(|&i| series[i] < series[i - 1] && series[i] < series[i + 1])
        .collect()
}

fn mean(values: &[u64]) -> Option<Decimal> {
    if values.is_empty() {
        return None;
    }
    let sum: Decimal = values.iter().map(|v| Decimal::from(*v)).sum();
    Some(sum / Decimal::from(values.len()))
}

/// `1 - std(neighbourhood) / overall_mean`, clamped to `[0, 1]`.
fn stability_confidence(raw: &[u64], centre: usize, radius: usize, overall_mean: Decimal) -> Decimal {
    if overall_mean.is_zero() {
        return Decimal::ZERO;
    }
    let lo = centre.saturating_sub(radius);
    let hi = (centre + radius).min(raw.len() - 1);
    let neighbourhood = &raw[lo..=hi];
    let Some(local_mean) = mean(neighbourhood) else {
        return Decimal::ZERO;
    };
    let variance = neighbourhood
        .iter()
        .map(|v| {
            let d = Decimal::from(*v) - local_mean;
            d * d
        })
        .sum::<Decimal>()
        / Decimal::from(neighbourhood.len());
    let std = variance.sqrt().unwrap_or(Decimal::ZERO);
    (Decimal::ONE - std / overall_mean).clamp(Decimal::ZERO, Decimal::ONE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn series(values: &[u64], first_at: DateTime<Utc>, step: Duration) -> Vec<Sample<u64>> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| Sample::new(first_at + step * i as i32, *v))
            .collect()
    }

    #[test]
    fn test_moving_average_valid_mode() {
        assert!(moving_average(&[1, 2, 3, 4], 5).is_empty());
        let ma = moving_average(&[10, 20, 30, 40, 50, 60], 5);
        assert_eq!(ma, vec![dec!(30), dec!(40)]);
    }

    #[test]
    fn test_local_minima_strict() {
        let s = [dec!(5), dec!(3), dec!(4), dec!(4), dec!(2), dec!(2), dec!(6)];
        assert_eq!(local_minima(&s), vec![1]);
        assert!(local_minima(&[dec!(1), dec!(2)]).is_empty());
    }

    #[test]
    fn test_confidence_clamped() {
        assert_eq!(stability_confidence(&[0, 0, 0], 1, 5, Decimal::ZERO), Decimal::ZERO);
        assert_eq!(stability_confidence(&[50, 50, 50], 1, 5, dec!(50)), Decimal::ONE);
        // std 90 vs mean 10 -> negative before clamping
        assert_eq!(stability_confidence(&[0, 180], 0, 5, dec!(10)), Decimal::ZERO);
    }

    #[test]
    fn test_best_candidate_projects_one_recurrence_ahead() {
        let search = WindowSearch::default();
        // V-shaped gas curve a minute apart, cheapest at sample 50 (10 minutes ago).
        let values: Vec<u64> = (0..60u64).map(|i| 20 + 2 * i.abs_diff(50)).collect();
        let first = now() - Duration::minutes(60);
        let samples = series(&values, first, Duration::minutes(1));

        // The dip recurs 50 minutes from now, beyond a 15 minute horizon.
        let far = search.best_candidate(&samples, Size::new(dec!(5000)), Duration::minutes(15), now());
        assert!(far.is_none());

        let window = search
            .best_candidate(&samples, Size::new(dec!(5000)), Duration::hours(1), now())
            .unwrap();
        assert_eq!(window.start_time, samples[50].timestamp + Duration::hours(1));
        assert_eq!(window.end_time - window.start_time, Duration::minutes(5));
        // mean of 24, 22, 20, 22, 24
        assert_eq!(window.estimated_gas_price, 22);
        assert!(window.confidence > Decimal::ZERO && window.confidence < Decimal::ONE);
    }

    #[test]
    fn test_fallback_window() {
        let search = WindowSearch::default();
        let window = search.fallback(Size::new(dec!(100)), 60, now());
        assert_eq!(window.start_time, now());
        assert_eq!(window.end_time, now() + Duration::minutes(5));
        assert_eq!(window.confidence, dec!(0.5));
        assert_eq!(window.estimated_gas_price, 60);
    }
}
