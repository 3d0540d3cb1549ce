//! Single sub-order execution.
//!
//! Flow: calldata -> gas estimate -> nonce -> sign -> broadcast -> poll receipt.
//! Receipt polling is bounded and always ends in a definite [`TradeStatus`].

use std::time::Duration;

use alloy::primitives::Address;
use peg_core::{Size, TradeDirection};
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::calldata::trade_calldata;
use crate::error::ExecutorResult;
use crate::signer::UnsignedTransaction;
use crate::traits::{DynGateway, DynSigner};

/// Executor settings.
#[derive(Debug, Clone)]
pub struct TradeExecutorConfig {
    /// Stable token contract.
    pub contract_address: Address,
    pub receipt_poll_interval: Duration,
    pub receipt_timeout: Duration,
}

impl TradeExecutorConfig {
    pub fn new(contract_address: Address) -> Self {
        Self {
            contract_address,
            receipt_poll_interval: Duration::from_secs(2),
            receipt_timeout: Duration::from_secs(120),
        }
    }
}

/// Final state of a broadcast transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeStatus {
    Confirmed,
    Reverted,
    TimedOut,
}

/// Result of one sub-order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TradeOutcome {
    pub tx_id: String,
    pub direction: TradeDirection,
    pub size: Size,
    /// Gwei.
    pub gas_price: u64,
    /// Known once a receipt was seen.
    pub gas_used: Option<u64>,
    pub status: TradeStatus,
    #[serde(skip)]
    pub duration: Duration,
}

impl TradeOutcome {
    pub fn is_success(&self) -> bool {
        self.status == TradeStatus::Confirmed
    }
}

/// Submits mint/burn transactions through the gateway.
pub struct TradeExecutor {
    gateway: DynGateway,
    signer: DynSigner,
    config: TradeExecutorConfig,
}

impl TradeExecutor {
    pub fn new(gateway: DynGateway, signer: DynSigner, config: TradeExecutorConfig) -> Self {
        Self {
            gateway,
            signer,
            config,
        }
    }

    pub fn config(&self) -> &TradeExecutorConfig {
        &self.config
    }

    /// Execute one sub-order at `gas_price` gwei.
    ///
    /// Errors before broadcast are returned as `Err`. Once broadcast, the
    /// outcome is always `Ok` with a definite status; cancellation while
    /// waiting for the receipt ends as `TimedOut`.
    pub async fn execute(
        &self,
        direction: TradeDirection,
        size: Size,
        gas_price: u64,
        cancel: &CancellationToken,
    ) -> ExecutorResult<TradeOutcome> {
        let started = Instant::now();
        let from = self.signer.address();
        let to = self.config.contract_address;
        let data = trade_calldata(direction, size)?;

        let gas_limit = self.gateway.estimate_gas(from, to, data.clone()).await?;
        let nonce = self.gateway.next_nonce(from).await?;
        debug!(%direction, %size, gas_limit, nonce, gas_price, "Signing trade");

        let signed = self.signer.sign(UnsignedTransaction {
            nonce,
            gas_price,
            gas_limit,
            to,
            data,
        })?;

        let tx_id = self.gateway.broadcast(signed.raw_hex).await?;
        info!(%tx_id, hash = %signed.hash, %direction, %size, "Trade broadcast");

        let (status, gas_used) = self.wait_for_receipt(&tx_id, cancel).await;

        Ok(TradeOutcome {
            tx_id,
            direction,
            size,
            gas_price,
            gas_used,
            status,
            duration: started.elapsed(),
        })
    }

    async fn wait_for_receipt(&self, tx_id: &str, cancel: &CancellationToken) -> (TradeStatus, Option<u64>) {
        let deadline = Instant::now() + self.config.receipt_timeout;

        loop {
            match self.gateway.receipt(tx_id.to_string()).await {
                Ok(Some(receipt)) if receipt.status => {
                    info!(%tx_id, gas_used = receipt.gas_used, "Trade confirmed");
                    return (TradeStatus::Confirmed, Some(receipt.gas_used));
                }
                Ok(Some(receipt)) => {
                    warn!(%tx_id, gas_used = receipt.gas_used, "Trade reverted");
                    return (TradeStatus::Reverted, Some(receipt.gas_used));
                }
                Ok(None) => {}
                Err(e) => warn!(%tx_id, error = %e, "Receipt lookup failed, will retry"),
            }

            if Instant::now() >= deadline {
                warn!(%tx_id, timeout_secs = self.config.receipt_timeout.as_secs(), "Receipt wait timed out");
                return (TradeStatus::TimedOut, None);
            }

            tokio::select! {
                () = tokio::time::sleep(self.config.receipt_poll_interval) => {}
                () = cancel.cancelled() => {
                    warn!(%tx_id, "Receipt wait cancelled");
                    return (TradeStatus::TimedOut, None);
                }
            }
        }
    }
}
