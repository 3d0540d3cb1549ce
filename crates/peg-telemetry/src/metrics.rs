//! Observability collaborator and its Prometheus implementation.
//!
//! The registry is owned by [`PrometheusObserver`]; nothing is registered
//! globally, so several observers can coexist (one per test, for instance).

use chrono::Utc;
use parking_lot::Mutex;
use peg_core::{Price, Size};
use prometheus::{
    CounterVec, Encoder, Gauge, HistogramOpts, HistogramVec, IntCounter, Opts, Registry, TextEncoder,
};
use rust_decimal::prelude::ToPrimitive;
use serde_json::Value;
use tracing::{error, info, warn};

use crate::error::TelemetryResult;
use crate::stats::{TradeRecord, TradeStats};

/// Sink for trade outcomes, gauges and contextual log events.
pub trait Observability: Send + Sync {
    fn record_trade_outcome(&self, record: &TradeRecord);

    fn update_price_gauge(&self, price: Price);

    fn update_volume_gauge(&self, volume: Size);

    /// Gwei.
    fn update_gas_price_gauge(&self, gas_price: u64);

    fn log_error(&self, message: &str, context: &Value) {
        error!(context = %context, "{message}");
    }

    fn log_warning(&self, message: &str, context: &Value) {
        warn!(context = %context, "{message}");
    }

    fn log_info(&self, message: &str, context: &Value) {
        info!(context = %context, "{message}");
    }
}

/// Prometheus-backed observer.
pub struct PrometheusObserver {
    registry: Registry,
    price: Gauge,
    volume: Gauge,
    gas_price: Gauge,
    breaker_active: Gauge,
    trades: CounterVec,
    gas_used: IntCounter,
    trade_duration: HistogramVec,
    stats: Mutex<TradeStats>,
}

impl PrometheusObserver {
    pub fn new() -> TelemetryResult<Self> {
        let registry = Registry::new();

        let price = Gauge::with_opts(Opts::new("peg_price", "Latest observed token price"))?;
        let volume = Gauge::with_opts(Opts::new("peg_volume", "Latest observed circulating supply"))?;
        let gas_price = Gauge::with_opts(Opts::new("peg_gas_price_gwei", "Latest sampled gas price in gwei"))?;
        let breaker_active = Gauge::with_opts(Opts::new(
            "peg_circuit_breaker_active",
            "Circuit breaker state (1=active)",
        ))?;
        let trades = CounterVec::new(
            Opts::new("peg_trades_total", "Executed sub-orders"),
            &["direction", "result"],
        )?;
        let gas_used = IntCounter::with_opts(Opts::new("peg_gas_used_total", "Gas consumed by trades"))?;
        let trade_duration = HistogramVec::new(
            HistogramOpts::new("peg_trade_duration_seconds", "Sub-order execution time")
                .buckets(vec![1.0, 2.0, 5.0, 10.0, 20.0, 30.0, 60.0, 120.0, 300.0]),
            &["result"],
        )?;

        registry.register(Box::new(price.clone()))?;
        registry.register(Box::new(volume.clone()))?;
        registry.register(Box::new(gas_price.clone()))?;
        registry.register(Box::new(breaker_active.clone()))?;
        registry.register(Box::new(trades.clone()))?;
        registry.register(Box::new(gas_used.clone()))?;
        registry.register(Box::new(trade_duration.clone()))?;

        Ok(Self {
            registry,
            price,
            volume,
            gas_price,
            breaker_active,
            trades,
            gas_used,
            trade_duration,
            stats: Mutex::new(TradeStats::new(Utc::now())),
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn set_breaker_active(&self, active: bool) {
        self.breaker_active.set(if active { 1.0 } else { 0.0 });
    }

    /// Snapshot of the running statistics.
    pub fn stats(&self) -> TradeStats {
        self.stats.lock().clone()
    }

    /// Prometheus text exposition.
    pub fn render(&self) -> TelemetryResult<String> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        Ok(String::from_utf8(buf)?)
    }
}

impl Observability for PrometheusObserver {
    fn record_trade_outcome(&self, record: &TradeRecord) {
        let result = if record.success { "success" } else { "failure" };
        self.trades
            .with_label_values(&[&record.direction.to_string(), result])
            .inc();
        self.gas_used.inc_by(record.gas_used);
        self.trade_duration
            .with_label_values(&[result])
            .observe(record.duration.as_secs_f64());
        self.stats.lock().record(record);
    }

    fn update_price_gauge(&self, price: Price) {
        self.price.set(price.inner().to_f64().unwrap_or(0.0));
    }

    fn update_volume_gauge(&self, volume: Size) {
        self.volume.set(volume.inner().to_f64().unwrap_or(0.0));
    }

    fn update_gas_price_gauge(&self, gas_price: u64) {
        self.gas_price.set(gas_price as f64);
    }
}
