//! Running trade statistics.

use std::time::Duration;

use chrono::{DateTime, Utc};
use peg_core::{Size, TradeDirection};
use serde::Serialize;

/// One finished sub-order, as seen by telemetry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TradeRecord {
    pub direction: TradeDirection,
    pub size: Size,
    pub success: bool,
    pub gas_used: u64,
    #[serde(skip)]
    pub duration: Duration,
}

/// Totals since startup.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeStats {
    pub total_trades: u64,
    pub successful_trades: u64,
    pub failed_trades: u64,
    pub total_gas_used: u64,
    /// Running mean over all trades, in seconds.
    pub avg_execution_secs: f64,
    pub started_at: DateTime<Utc>,
}

impl TradeStats {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            total_trades: 0,
            successful_trades: 0,
            failed_trades: 0,
            total_gas_used: 0,
            avg_execution_secs: 0.0,
            started_at,
        }
    }

    pub fn record(&mut self, record: &TradeRecord) {
        self.total_trades += 1;
        if record.success {
            self.successful_trades += 1;
        } else {
            self.failed_trades += 1;
        }
        self.total_gas_used = self.total_gas_used.saturating_add(record.gas_used);

        let n = self.total_trades as f64;
        let secs = record.duration.as_secs_f64();
        self.avg_execution_secs += (secs - self.avg_execution_secs) / n;
    }

    /// Fraction of successful trades, 0 when none ran.
    pub fn success_rate(&self) -> f64 {
        if self.total_trades == 0 {
            0.0
        } else {
            self.successful_trades as f64 / self.total_trades as f64
        }
    }

    pub fn uptime(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.started_at
    }
}
