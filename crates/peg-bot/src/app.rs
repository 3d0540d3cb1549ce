//! Main application orchestration.
//!
//! Wires the components together and owns the long-lived tasks:
//! - Feed ingestion (price events into the orchestrator)
//! - Gas price sampling
//! - History pruning
//! - Periodic status reporting

use std::sync::Arc;

use chrono::{DateTime, Utc};
use peg_core::{SharedClock, SystemClock};
use peg_executor::{KeyManager, KeySource, TradeExecutor, TradeExecutorConfig};
use peg_gateway::{GatewayClient, RpcContractReader};
use peg_optimizer::ExecutionOptimizer;
use peg_risk::{CircuitBreaker, CircuitBreakerStatus};
use peg_telemetry::{Observability, PrometheusObserver};
use peg_ws::{FeedConnection, HandlerRegistry};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::{AppConfig, TRADING_KEY_ENV};
use crate::error::AppResult;
use crate::orchestrator::{DecisionOrchestrator, OrchestratorParts};

/// Main application.
pub struct Application {
    config: AppConfig,
    clock: SharedClock,
    breaker: Arc<CircuitBreaker>,
    optimizer: Arc<ExecutionOptimizer>,
    gateway: Arc<GatewayClient>,
    observer: Arc<PrometheusObserver>,
    orchestrator: DecisionOrchestrator,
    shutdown: CancellationToken,
}

impl Application {
    /// Build every component. Loads the trading key unless running dry.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        let clock = SystemClock::shared();
        let shutdown = CancellationToken::new();

        let breaker = Arc::new(CircuitBreaker::new(config.risk.clone(), clock.clone()));
        let optimizer = Arc::new(ExecutionOptimizer::new(config.optimizer.clone(), clock.clone()));
        let observer = Arc::new(PrometheusObserver::new()?);

        let contract = config.contract.contract_address()?;
        let gateway = Arc::new(GatewayClient::new(config.gateway.clone())?);
        let reader = Arc::new(RpcContractReader::new(
            gateway.clone(),
            contract,
            config.contract.price_decimals,
        ));

        let executor = if config.trading.dry_run {
            warn!("Dry run enabled, trades will be planned but not executed");
            None
        } else {
            let key = KeyManager::load(
                KeySource::EnvVar {
                    var_name: TRADING_KEY_ENV.to_string(),
                },
                config.contract.expected_trading_address()?,
            )?;
            info!(address = %key.address(), "Trading key loaded");

            let executor_config = TradeExecutorConfig {
                contract_address: contract,
                receipt_poll_interval: config.trading.receipt_poll_interval(),
                receipt_timeout: config.trading.receipt_timeout(),
            };
            Some(Arc::new(TradeExecutor::new(
                gateway.clone(),
                Arc::new(key.into_signer(config.contract.chain_id)),
                executor_config,
            )))
        };

        let orchestrator = DecisionOrchestrator::new(
            config.trading.clone(),
            OrchestratorParts {
                breaker: breaker.clone(),
                optimizer: optimizer.clone(),
                reader,
                executor,
                observer: observer.clone(),
                clock: clock.clone(),
            },
            shutdown.clone(),
        );

        Ok(Self {
            config,
            clock,
            breaker,
            optimizer,
            gateway,
            observer,
            orchestrator,
            shutdown,
        })
    }

    /// Token cancelled on shutdown; cancelling it stops [`Application::run`].
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn orchestrator(&self) -> &DecisionOrchestrator {
        &self.orchestrator
    }

    /// Run until ctrl-c or the shutdown token is cancelled.
    pub async fn run(self) -> AppResult<()> {
        info!(
            contract = %self.config.contract.address,
            dry_run = self.orchestrator.is_dry_run(),
            "Starting application"
        );

        let mut registry = HandlerRegistry::new();
        for event_type in &self.config.feed.event_types {
            registry.register(event_type.clone(), Arc::new(self.orchestrator.clone()));
        }
        let feed = FeedConnection::new(
            self.config.feed.to_feed_config(self.config.api_key()),
            registry,
            self.shutdown.clone(),
        );
        let feed_handle: JoinHandle<()> = tokio::spawn(async move {
            if let Err(e) = feed.run().await {
                error!(error = %e, "Feed task failed");
            }
        });

        let tasks = vec![
            feed_handle,
            self.spawn_gas_sampler(),
            self.spawn_pruner(),
            self.spawn_status_reporter(),
        ];

        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!(error = %e, "Failed to listen for shutdown signal");
                }
                info!("Shutdown signal received");
            }
            () = self.shutdown.cancelled() => {}
        }
        self.shutdown.cancel();

        for task in tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "Background task ended abnormally");
            }
        }
        self.orchestrator.wait_idle().await;

        let stats = self.observer.stats();
        info!(
            total_trades = stats.total_trades,
            successful = stats.successful_trades,
            failed = stats.failed_trades,
            gas_used = stats.total_gas_used,
            success_rate = stats.success_rate(),
            dropped_events = self.orchestrator.dropped_events(),
            "Shutting down"
        );
        Ok(())
    }

    fn spawn_gas_sampler(&self) -> JoinHandle<()> {
        let gateway = self.gateway.clone();
        let optimizer = self.optimizer.clone();
        let observer = self.observer.clone();
        let shutdown = self.shutdown.clone();
        let period = self.config.maintenance.gas_sample_interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    () = shutdown.cancelled() => return,
                }
                match gateway.gas_price().await {
                    Ok(gwei) => {
                        optimizer.record_gas_price(gwei, None);
                        observer.update_gas_price_gauge(gwei);
                        debug!(gwei, "Gas price sampled");
                    }
                    Err(e) => warn!(error = %e, "Gas price sample failed"),
                }
            }
        })
    }

    fn spawn_pruner(&self) -> JoinHandle<()> {
        let breaker = self.breaker.clone();
        let optimizer = self.optimizer.clone();
        let shutdown = self.shutdown.clone();
        let period = self.config.maintenance.prune_interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    () = shutdown.cancelled() => return,
                }
                let removed = breaker.prune() + optimizer.prune();
                if removed > 0 {
                    debug!(removed, "Pruned expired samples");
                }
            }
        })
    }

    fn spawn_status_reporter(&self) -> JoinHandle<()> {
        let breaker = self.breaker.clone();
        let observer = self.observer.clone();
        let orchestrator = self.orchestrator.clone();
        let clock = self.clock.clone();
        let shutdown = self.shutdown.clone();
        let period = self.config.maintenance.status_interval();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    () = shutdown.cancelled() => return,
                }
                report_status(&breaker, &observer, orchestrator.last_trade_time(), clock.now());
            }
        })
    }
}

/// Log a status line and refresh the breaker gauge.
///
/// Read-only with respect to the breaker: the latch only moves in `evaluate()`
/// on the trading path.
fn report_status(
    breaker: &CircuitBreaker,
    observer: &PrometheusObserver,
    last_trade: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> CircuitBreakerStatus {
    let status = breaker.status();
    observer.set_breaker_active(status.is_active);

    let stats = observer.stats();
    info!(
        breaker_active = status.is_active,
        volatility = %status.metrics.current_volatility,
        price_change = %status.metrics.price_change_rate,
        trade_frequency = %status.metrics.trade_frequency,
        total_trades = stats.total_trades,
        success_rate = stats.success_rate(),
        avg_execution_secs = stats.avg_execution_secs,
        uptime_secs = stats.uptime(now).num_seconds(),
        last_trade = ?last_trade,
        "Status"
    );
    status
}
