//! Decision orchestrator.
//!
//! Price events come in through [`EventHandler`]; each one is recorded into
//! the risk gate and, when no trade cycle is in flight, starts one:
//!
//! 1. Risk gate check
//! 2. Admission (first trade, or interval and deviation both met)
//! 3. Volume fetch and sizing
//! 4. Execution plan, cancellable wait, second risk gate check
//! 5. Sequential sub-orders; a failure aborts the rest

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use peg_core::{calculate_trade_size, BoxFuture, Price, SharedClock, Size, TradeDirection};
use peg_executor::{DynContractReader, TradeExecutor};
use peg_optimizer::{ExecutionOptimizer, ExecutionPlan};
use peg_risk::{BreakReason, CircuitBreaker};
use peg_telemetry::{Observability, TradeRecord};
use peg_ws::{EventHandler, FeedEvent, HandlerError, PriceUpdate};
use serde_json::json;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::TradingConfig;

/// Collaborators the orchestrator drives.
pub struct OrchestratorParts {
    pub breaker: Arc<CircuitBreaker>,
    pub optimizer: Arc<ExecutionOptimizer>,
    pub reader: DynContractReader,
    /// `None` runs dry: plans are logged, nothing is signed or broadcast.
    pub executor: Option<Arc<TradeExecutor>>,
    pub observer: Arc<dyn Observability>,
    pub clock: SharedClock,
}

/// Why a planned trade never reached execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    BreakerTripped,
    Shutdown,
}

/// How a trade cycle ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    Blocked(Option<BreakReason>),
    NotAdmitted,
    VolumeUnavailable,
    BelowMinimum(Size),
    DryRun(ExecutionPlan),
    Aborted(AbortReason),
    Executed {
        completed: usize,
        planned: usize,
        failed: bool,
    },
}

struct Inner {
    config: TradingConfig,
    parts: OrchestratorParts,
    cycle_guard: Arc<tokio::sync::Mutex<()>>,
    last_trade: Mutex<Option<DateTime<Utc>>>,
    last_outcome: Mutex<Option<CycleOutcome>>,
    dropped_events: AtomicU64,
    shutdown: CancellationToken,
}

/// Turns price events into corrective trades. Cheap to clone.
#[derive(Clone)]
pub struct DecisionOrchestrator {
    inner: Arc<Inner>,
}

impl DecisionOrchestrator {
    pub fn new(config: TradingConfig, parts: OrchestratorParts, shutdown: CancellationToken) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                parts,
                cycle_guard: Arc::new(tokio::sync::Mutex::new(())),
                last_trade: Mutex::new(None),
                last_outcome: Mutex::new(None),
                dropped_events: AtomicU64::new(0),
                shutdown,
            }),
        }
    }

    pub fn is_dry_run(&self) -> bool {
        self.inner.parts.executor.is_none()
    }

    /// Time of the last successful sub-order.
    pub fn last_trade_time(&self) -> Option<DateTime<Utc>> {
        *self.inner.last_trade.lock()
    }

    pub fn last_outcome(&self) -> Option<CycleOutcome> {
        self.inner.last_outcome.lock().clone()
    }

    /// Price events dropped because a cycle was in flight.
    pub fn dropped_events(&self) -> u64 {
        self.inner.dropped_events.load(Ordering::Relaxed)
    }

    pub fn should_trade(&self, price: Price, now: DateTime<Utc>) -> bool {
        self.inner.should_trade(price, now)
    }

    /// Record a price and start a trade cycle unless one is running.
    ///
    /// Returns whether a cycle was started.
    pub fn on_price(&self, update: PriceUpdate) -> bool {
        let inner = &self.inner;
        inner.parts.breaker.record_price(update.price, update.timestamp);
        inner.parts.observer.update_price_gauge(update.price);

        let guard = match inner.cycle_guard.clone().try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                inner.dropped_events.fetch_add(1, Ordering::Relaxed);
                debug!(price = %update.price, "Trade cycle in flight, dropping price event");
                // Lets a waiting cycle see a trip caused by this price.
                let _ = inner.parts.breaker.evaluate();
                return false;
            }
        };

        let inner = self.inner.clone();
        tokio::spawn(async move {
            let outcome = inner.cycle(update.price).await;
            debug!(?outcome, "Trade cycle finished");
            *inner.last_outcome.lock() = Some(outcome);
            drop(guard);
        });
        true
    }

    /// Wait until no cycle is in flight.
    pub async fn wait_idle(&self) {
        let _guard = self.inner.cycle_guard.lock().await;
    }
}

impl EventHandler for DecisionOrchestrator {
    fn handle(&self, event: FeedEvent) -> BoxFuture<'_, Result<(), HandlerError>> {
        Box::pin(async move {
            let update = PriceUpdate::from_event(&event)
                .map_err(|e| HandlerError::InvalidPayload(e.to_string()))?;
            self.on_price(update);
            Ok(())
        })
    }
}

impl Inner {
    fn should_trade(&self, price: Price, now: DateTime<Utc>) -> bool {
        let Some(last) = *self.last_trade.lock() else {
            return true;
        };
        let interval_ok = now - last >= self.config.min_trade_interval();
        let deviation_ok = price.deviation_from(self.config.target_price()) >= self.config.min_deviation;
        interval_ok && deviation_ok
    }

    async fn cycle(&self, price: Price) -> CycleOutcome {
        let decision = self.parts.breaker.evaluate();
        if decision.blocked {
            let reason = decision.reason.as_ref().map(|r| r.to_string()).unwrap_or_default();
            self.parts.observer.log_warning(
                "Trading halted by circuit breaker",
                &json!({ "price": price.to_string(), "reason": reason }),
            );
            return CycleOutcome::Blocked(decision.reason);
        }

        let now = self.parts.clock.now();
        if !self.should_trade(price, now) {
            debug!(%price, "Trade not admitted");
            return CycleOutcome::NotAdmitted;
        }

        let volume = match self.parts.reader.total_supply().await {
            Ok(volume) => volume,
            Err(e) => {
                self.parts.observer.log_error(
                    "Failed to fetch volume",
                    &json!({ "price": price.to_string(), "error": e.to_string() }),
                );
                return CycleOutcome::VolumeUnavailable;
            }
        };
        self.parts.breaker.record_volume(volume, None);
        self.parts.observer.update_volume_gauge(volume);

        let trade = calculate_trade_size(price, volume, &self.config.sizing);
        if trade.size < self.config.min_trade_size {
            debug!(%price, size = %trade.size, "Trade below minimum size");
            return CycleOutcome::BelowMinimum(trade.size);
        }

        let plan = self.parts.optimizer.plan_execution(trade.size, self.config.max_wait());
        self.parts.observer.log_info(
            "Execution planned",
            &json!({
                "price": price.to_string(),
                "direction": trade.direction.to_string(),
                "size": trade.size.to_string(),
                "parts": plan.sub_sizes.len(),
                "gas_price": plan.gas_price,
                "wait_seconds": plan.wait_seconds,
            }),
        );

        let Some(executor) = self.parts.executor.clone() else {
            info!(size = %trade.size, direction = %trade.direction, "Dry run, not executing");
            return CycleOutcome::DryRun(plan);
        };

        if let Some(reason) = self.wait_for_window(&plan).await {
            warn!(?reason, "Planned trade aborted before execution");
            return CycleOutcome::Aborted(reason);
        }

        let decision = self.parts.breaker.evaluate();
        if decision.blocked {
            warn!(reason = ?decision.reason, "Circuit breaker tripped during wait");
            return CycleOutcome::Blocked(decision.reason);
        }

        self.execute_plan(&executor, trade.direction, &plan).await
    }

    /// `Some` when the wait was cut short.
    async fn wait_for_window(&self, plan: &ExecutionPlan) -> Option<AbortReason> {
        if plan.wait_seconds == 0 {
            return None;
        }
        let mut trips = self.parts.breaker.subscribe_trips();
        info!(wait_seconds = plan.wait_seconds, gas_price = plan.gas_price, "Waiting for execution window");

        tokio::select! {
            () = tokio::time::sleep(plan.wait()) => None,
            _ = trips.changed() => Some(AbortReason::BreakerTripped),
            () = self.shutdown.cancelled() => Some(AbortReason::Shutdown),
        }
    }

    async fn execute_plan(
        &self,
        executor: &TradeExecutor,
        direction: TradeDirection,
        plan: &ExecutionPlan,
    ) -> CycleOutcome {
        let planned = plan.sub_sizes.len();
        let mut completed = 0;

        for (index, size) in plan.sub_sizes.iter().copied().enumerate() {
            if self.shutdown.is_cancelled() {
                return CycleOutcome::Aborted(AbortReason::Shutdown);
            }

            let started = Instant::now();
            match executor.execute(direction, size, plan.gas_price, &self.shutdown).await {
                Ok(outcome) => {
                    self.parts.observer.record_trade_outcome(&TradeRecord {
                        direction,
                        size,
                        success: outcome.is_success(),
                        gas_used: outcome.gas_used.unwrap_or(0),
                        duration: outcome.duration,
                    });
                    if !outcome.is_success() {
                        self.parts.observer.log_error(
                            "Sub-order failed",
                            &json!({
                                "index": index,
                                "tx_id": outcome.tx_id,
                                "status": format!("{:?}", outcome.status),
                            }),
                        );
                        return CycleOutcome::Executed {
                            completed,
                            planned,
                            failed: true,
                        };
                    }
                    completed += 1;
                    let now = self.parts.clock.now();
                    self.parts.breaker.record_trade(Some(now));
                    *self.last_trade.lock() = Some(now);
                }
                Err(e) => {
                    self.parts.observer.record_trade_outcome(&TradeRecord {
                        direction,
                        size,
                        success: false,
                        gas_used: 0,
                        duration: started.elapsed(),
                    });
                    self.parts.observer.log_error(
                        "Sub-order execution error",
                        &json!({ "index": index, "size": size.to_string(), "error": e.to_string() }),
                    );
                    return CycleOutcome::Executed {
                        completed,
                        planned,
                        failed: true,
                    };
                }
            }
        }

        info!(completed, %direction, "Trade plan executed");
        CycleOutcome::Executed {
            completed,
            planned,
            failed: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::Address;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use peg_core::{Clock, ManualClock};
    use peg_executor::{MockContractReader, MockGateway, MockSigner, TradeExecutorConfig};
    use peg_optimizer::OptimizerConfig;
    use peg_risk::CircuitBreakerConfig;
    use peg_telemetry::PrometheusObserver;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    struct Harness {
        clock: Arc<ManualClock>,
        gateway: Arc<MockGateway>,
        reader: Arc<MockContractReader>,
        observer: Arc<PrometheusObserver>,
        breaker: Arc<CircuitBreaker>,
        optimizer: Arc<ExecutionOptimizer>,
        shutdown: CancellationToken,
        orchestrator: DecisionOrchestrator,
    }

    fn harness(dry_run: bool) -> Harness {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
        ));
        let gateway = Arc::new(MockGateway::new());
        let reader = Arc::new(MockContractReader::new(
            Price::new(dec!(1)),
            Size::new(dec!(1000000)),
        ));
        let observer = Arc::new(PrometheusObserver::new().unwrap());
        let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig::default(), clock.clone()));
        let optimizer = Arc::new(ExecutionOptimizer::new(OptimizerConfig::default(), clock.clone()));
        let executor = (!dry_run).then(|| {
            Arc::new(TradeExecutor::new(
                gateway.clone(),
                Arc::new(MockSigner::default()),
                TradeExecutorConfig::new(Address::repeat_byte(0x11)),
            ))
        });
        let shutdown = CancellationToken::new();

        let orchestrator = DecisionOrchestrator::new(
            TradingConfig::default(),
            OrchestratorParts {
                breaker: breaker.clone(),
                optimizer: optimizer.clone(),
                reader: reader.clone(),
                executor,
                observer: observer.clone(),
                clock: clock.clone(),
            },
            shutdown.clone(),
        );

        Harness {
            clock,
            gateway,
            reader,
            observer,
            breaker,
            optimizer,
            shutdown,
            orchestrator,
        }
    }

    fn price(value: rust_decimal::Decimal) -> PriceUpdate {
        PriceUpdate {
            price: Price::new(value),
            timestamp: None,
        }
    }

    async fn run(h: &Harness, value: rust_decimal::Decimal) -> CycleOutcome {
        assert!(h.orchestrator.on_price(price(value)));
        h.orchestrator.wait_idle().await;
        h.orchestrator.last_outcome().unwrap()
    }

    #[tokio::test]
    async fn test_admission_rules() {
        let h = harness(true);
        let now = h.clock.now();
        assert!(h.orchestrator.should_trade(Price::new(dec!(1.00)), now));

        *h.orchestrator.inner.last_trade.lock() = Some(now - ChronoDuration::minutes(4));
        assert!(!h.orchestrator.should_trade(Price::new(dec!(0.98)), now));

        *h.orchestrator.inner.last_trade.lock() = Some(now - ChronoDuration::minutes(6));
        assert!(!h.orchestrator.should_trade(Price::new(dec!(0.995)), now));
        assert!(h.orchestrator.should_trade(Price::new(dec!(0.98)), now));
        assert!(h.orchestrator.should_trade(Price::new(dec!(0.99)), now));
    }

    #[tokio::test]
    async fn test_below_peg_mints_ten_thousand() {
        let h = harness(false);

        let outcome = run(&h, dec!(0.90)).await;
        assert_eq!(
            outcome,
            CycleOutcome::Executed {
                completed: 1,
                planned: 1,
                failed: false
            }
        );

        let broadcasts = h.gateway.get_broadcasts();
        assert_eq!(broadcasts.len(), 1);
        assert_eq!(h.reader.supply_reads(), 1);
        assert_eq!(h.orchestrator.last_trade_time(), Some(h.clock.now()));

        let stats = h.observer.stats();
        assert_eq!(stats.successful_trades, 1);
        assert_eq!(stats.total_gas_used, 45_000);
        assert!(h.observer.render().unwrap().contains("peg_volume 1000000"));
    }

    #[tokio::test]
    async fn test_dry_run_plans_without_broadcast() {
        let h = harness(true);

        match run(&h, dec!(0.90)).await {
            CycleOutcome::DryRun(plan) => {
                assert_eq!(plan.total_size(), Size::new(dec!(10000)));
                assert_eq!(plan.wait_seconds, 0);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(h.gateway.get_broadcasts().is_empty());
        assert!(h.orchestrator.last_trade_time().is_none());
    }

    #[tokio::test]
    async fn test_price_at_peg_is_below_minimum() {
        let h = harness(false);
        assert_eq!(
            run(&h, dec!(1.00)).await,
            CycleOutcome::BelowMinimum(Size::new(dec!(0)))
        );
        assert!(h.gateway.get_broadcasts().is_empty());
    }

    #[tokio::test]
    async fn test_price_jump_blocks_trading() {
        let h = harness(false);
        for _ in 0..4 {
            run(&h, dec!(1.00)).await;
            h.clock.advance(ChronoDuration::minutes(1));
        }

        match run(&h, dec!(1.20)).await {
            CycleOutcome::Blocked(Some(BreakReason::HighVolatility(_)))
            | CycleOutcome::Blocked(Some(BreakReason::ExcessivePriceChange(_))) => {}
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(h.breaker.is_active());
        assert!(h.gateway.get_broadcasts().is_empty());
    }

    #[tokio::test]
    async fn test_second_trade_waits_for_interval() {
        let h = harness(false);
        run(&h, dec!(0.95)).await;
        assert_eq!(h.gateway.get_broadcasts().len(), 1);

        h.clock.advance(ChronoDuration::minutes(4));
        assert_eq!(run(&h, dec!(0.95)).await, CycleOutcome::NotAdmitted);

        h.clock.advance(ChronoDuration::minutes(2));
        assert!(matches!(run(&h, dec!(0.95)).await, CycleOutcome::Executed { failed: false, .. }));
        assert_eq!(h.gateway.get_broadcasts().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_sub_order_does_not_update_last_trade() {
        let h = harness(false);
        h.gateway.fail_broadcasts(Some("underpriced".to_string()));

        assert_eq!(
            run(&h, dec!(0.90)).await,
            CycleOutcome::Executed {
                completed: 0,
                planned: 1,
                failed: true
            }
        );
        assert!(h.orchestrator.last_trade_time().is_none());
        assert_eq!(h.observer.stats().failed_trades, 1);
        assert_eq!(h.breaker.metrics().trade_frequency, dec!(0));
    }

    #[tokio::test]
    async fn test_volume_failure_is_contained() {
        struct FailingReader;
        impl peg_executor::ContractReader for FailingReader {
            fn latest_price(&self) -> BoxFuture<'_, peg_executor::ExecutorResult<Price>> {
                Box::pin(async { Err(peg_executor::ExecutorError::Gateway("down".into())) })
            }
            fn total_supply(&self) -> BoxFuture<'_, peg_executor::ExecutorResult<Size>> {
                Box::pin(async { Err(peg_executor::ExecutorError::Gateway("down".into())) })
            }
        }

        let h = harness(false);
        let clock = h.clock.clone();
        let orchestrator = DecisionOrchestrator::new(
            TradingConfig::default(),
            OrchestratorParts {
                breaker: h.breaker.clone(),
                optimizer: h.optimizer.clone(),
                reader: Arc::new(FailingReader),
                executor: None,
                observer: h.observer.clone(),
                clock,
            },
            h.shutdown.clone(),
        );
        orchestrator.on_price(price(dec!(0.90)));
        orchestrator.wait_idle().await;
        assert_eq!(orchestrator.last_outcome(), Some(CycleOutcome::VolumeUnavailable));
    }

    #[tokio::test]
    async fn test_event_dropped_while_cycle_in_flight() {
        let h = harness(false);
        let guard = h.orchestrator.inner.cycle_guard.clone().lock_owned().await;

        assert!(!h.orchestrator.on_price(price(dec!(0.90))));
        assert_eq!(h.orchestrator.dropped_events(), 1);
        // Still recorded.
        assert!(h.observer.render().unwrap().contains("peg_price 0.9"));

        drop(guard);
        h.orchestrator.wait_idle().await;
        assert!(h.orchestrator.last_outcome().is_none());
    }

    /// Gas history whose cheapest point recurs four minutes from now.
    fn seed_cheap_window(h: &Harness) {
        let now = h.clock.now();
        for i in 0..12u64 {
            let gas = 40 + 2 * i.abs_diff(4);
            let ts = now - ChronoDuration::minutes(60) + ChronoDuration::minutes(i as i64);
            h.optimizer.record_gas_price(gas, Some(ts));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_breaker_trip_cancels_wait() {
        let h = harness(false);
        seed_cheap_window(&h);

        assert!(h.orchestrator.on_price(price(dec!(0.90))));
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Busy: recorded and evaluated, which trips the breaker.
        assert!(!h.orchestrator.on_price(price(dec!(1.50))));
        h.orchestrator.wait_idle().await;

        assert_eq!(
            h.orchestrator.last_outcome(),
            Some(CycleOutcome::Aborted(AbortReason::BreakerTripped))
        );
        assert!(h.gateway.get_broadcasts().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_cancels_wait() {
        let h = harness(false);
        seed_cheap_window(&h);

        assert!(h.orchestrator.on_price(price(dec!(0.90))));
        tokio::time::sleep(Duration::from_millis(10)).await;
        h.shutdown.cancel();
        h.orchestrator.wait_idle().await;

        assert_eq!(
            h.orchestrator.last_outcome(),
            Some(CycleOutcome::Aborted(AbortReason::Shutdown))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_window_then_executes() {
        let h = harness(false);
        seed_cheap_window(&h);
        let start = Instant::now();

        assert!(matches!(run(&h, dec!(0.90)).await, CycleOutcome::Executed { failed: false, .. }));
        assert!(start.elapsed() >= Duration::from_secs(240));
        assert_eq!(h.gateway.get_broadcasts().len(), 1);
    }
}
