//! Time-windowed sample storage.
//!
//! A [`RetentionBuffer`] keeps samples ordered by timestamp and discards
//! anything at or past its horizon. Reads filter by the same rule, so the
//! observable contents do not depend on when [`RetentionBuffer::prune`] last ran.
//! Samples stamped after `now` are stored but not read until the clock reaches them.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// A single timestamped observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample<T> {
    pub timestamp: DateTime<Utc>,
    pub value: T,
}

impl<T> Sample<T> {
    pub fn new(timestamp: DateTime<Utc>, value: T) -> Self {
        Self { timestamp, value }
    }
}

/// Ordered samples bounded by a retention horizon.
///
/// A sample is visible at `now` iff `now - horizon < timestamp <= now`.
#[derive(Debug, Clone)]
pub struct RetentionBuffer<T> {
    horizon: Duration,
    samples: VecDeque<Sample<T>>,
}

impl<T> RetentionBuffer<T> {
    pub fn new(horizon: Duration) -> Self {
        Self {
            horizon,
            samples: VecDeque::new(),
        }
    }

    #[inline]
    pub fn horizon(&self) -> Duration {
        self.horizon
    }

    /// Oldest instant (exclusive) still retained at `now`.
    #[inline]
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.horizon
    }

    /// Insert a sample keeping timestamp order, then prune against `now`.
    ///
    /// Samples with equal timestamps keep insertion order.
    pub fn push(&mut self, sample: Sample<T>, now: DateTime<Utc>) {
        let idx = self
            .samples
            .partition_point(|s| s.timestamp <= sample.timestamp);
        self.samples.insert(idx, sample);
        self.prune(now);
    }

    /// Drop samples outside the horizon. Returns how many were removed.
    pub fn prune(&mut self, now: DateTime<Utc>) -> usize {
        let cutoff = self.cutoff(now);
        let stale = self.samples.partition_point(|s| s.timestamp <= cutoff);
        self.samples.drain(..stale);
        stale
    }

    /// Samples inside the horizon at `now`, oldest first.
    pub fn iter_retained(&self, now: DateTime<Utc>) -> impl Iterator<Item = &Sample<T>> + '_ {
        let cutoff = self.cutoff(now);
        self.samples
            .iter()
            .filter(move |s| s.timestamp > cutoff && s.timestamp <= now)
    }

    /// Samples with `since <= timestamp` that are still inside the horizon.
    pub fn iter_since(
        &self,
        since: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> impl Iterator<Item = &Sample<T>> + '_ {
        self.iter_retained(now).filter(move |s| s.timestamp >= since)
    }

    pub fn first_retained(&self, now: DateTime<Utc>) -> Option<&Sample<T>> {
        self.iter_retained(now).next()
    }

    pub fn last_retained(&self, now: DateTime<Utc>) -> Option<&Sample<T>> {
        let cutoff = self.cutoff(now);
        self.samples
            .iter()
            .rev()
            .find(|s| s.timestamp <= now)
            .filter(|s| s.timestamp > cutoff)
    }

    pub fn count_retained(&self, now: DateTime<Utc>) -> usize {
        self.iter_retained(now).count()
    }

    /// Number of stored samples, including any not yet pruned.
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}

impl<T: Copy> RetentionBuffer<T> {
    /// Values inside the horizon at `now`, oldest first.
    pub fn values(&self, now: DateTime<Utc>) -> Vec<T> {
        self.iter_retained(now).map(|s| s.value).collect()
    }

    /// Values with `since <= timestamp`, oldest first.
    pub fn values_since(&self, since: DateTime<Utc>, now: DateTime<Utc>) -> Vec<T> {
        self.iter_since(since, now).map(|s| s.value).collect()
    }

    /// The most recent `n` retained samples, oldest first.
    pub fn last_n(&self, n: usize, now: DateTime<Utc>) -> Vec<Sample<T>> {
        let retained: Vec<Sample<T>> = self.iter_retained(now).copied().collect();
        let skip = retained.len().saturating_sub(n);
        retained.into_iter().skip(skip).collect()
    }
}
