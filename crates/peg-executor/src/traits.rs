//! Collaborator seams.
//!
//! The executor talks to the chain only through these traits so the trade
//! cycle can be driven by mocks in tests and by `peg-gateway` in production.

use std::sync::Arc;

use alloy::primitives::{Address, Bytes};
use peg_core::{BoxFuture, Price, Size};
use serde::{Deserialize, Serialize};

use crate::error::ExecutorResult;
use crate::signer::{SignedTransaction, UnsignedTransaction};

/// Mined transaction summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub gas_used: u64,
    /// `true` when the transaction succeeded on chain.
    pub status: bool,
}

/// Chain access needed to submit a transaction and follow it.
///
/// Gas prices are in gwei.
pub trait ExecutionGateway: Send + Sync {
    fn estimate_gas(&self, from: Address, to: Address, data: Bytes) -> BoxFuture<'_, ExecutorResult<u64>>;

    fn current_gas_price(&self) -> BoxFuture<'_, ExecutorResult<u64>>;

    fn next_nonce(&self, address: Address) -> BoxFuture<'_, ExecutorResult<u64>>;

    /// Submit a raw signed transaction (0x-prefixed hex). Returns the tx id.
    fn broadcast(&self, signed_tx: String) -> BoxFuture<'_, ExecutorResult<String>>;

    /// `None` while the transaction is unknown or pending.
    fn receipt(&self, tx_id: String) -> BoxFuture<'_, ExecutorResult<Option<TxReceipt>>>;
}

/// Read-only view of the stable token contract.
pub trait ContractReader: Send + Sync {
    fn latest_price(&self) -> BoxFuture<'_, ExecutorResult<Price>>;

    /// Circulating supply, used as the volume basis for sizing.
    fn total_supply(&self) -> BoxFuture<'_, ExecutorResult<Size>>;
}

/// Holds the trading key.
pub trait TransactionSigner: Send + Sync {
    fn address(&self) -> Address;

    fn sign(&self, tx: UnsignedTransaction) -> ExecutorResult<SignedTransaction>;
}

pub type DynGateway = Arc<dyn ExecutionGateway>;
pub type DynContractReader = Arc<dyn ContractReader>;
pub type DynSigner = Arc<dyn TransactionSigner>;
