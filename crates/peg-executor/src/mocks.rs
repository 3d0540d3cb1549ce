//! In-memory collaborators for tests and dry runs.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use alloy::primitives::{Address, Bytes, B256};
use parking_lot::Mutex;
use peg_core::{BoxFuture, Price, Size};

use crate::error::{ExecutorError, ExecutorResult};
use crate::signer::{SignedTransaction, UnsignedTransaction};
use crate::traits::{ContractReader, ExecutionGateway, TransactionSigner, TxReceipt};

/// Scripted gateway.
///
/// Receipts come back as `None` for the first `pending_polls` lookups of each
/// transaction, then as the configured receipt.
pub struct MockGateway {
    gas_estimate: AtomicU64,
    gas_price: AtomicU64,
    nonce: AtomicU64,
    pending_polls: AtomicUsize,
    polls: AtomicUsize,
    receipt: Mutex<Option<TxReceipt>>,
    broadcast_error: Mutex<Option<String>>,
    broadcasts: Mutex<Vec<String>>,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            gas_estimate: AtomicU64::new(50_000),
            gas_price: AtomicU64::new(50),
            nonce: AtomicU64::new(0),
            pending_polls: AtomicUsize::new(0),
            polls: AtomicUsize::new(0),
            receipt: Mutex::new(Some(TxReceipt {
                gas_used: 45_000,
                status: true,
            })),
            broadcast_error: Mutex::new(None),
            broadcasts: Mutex::new(Vec::new()),
        }
    }

    pub fn set_gas_price(&self, gwei: u64) {
        self.gas_price.store(gwei, Ordering::SeqCst);
    }

    pub fn set_gas_estimate(&self, gas: u64) {
        self.gas_estimate.store(gas, Ordering::SeqCst);
    }

    /// Receipt returned once the pending polls are exhausted. `None` never confirms.
    pub fn set_receipt(&self, receipt: Option<TxReceipt>) {
        *self.receipt.lock() = receipt;
    }

    pub fn set_pending_polls(&self, polls: usize) {
        self.pending_polls.store(polls, Ordering::SeqCst);
    }

    pub fn fail_broadcasts(&self, error: Option<String>) {
        *self.broadcast_error.lock() = error;
    }

    /// Raw transactions broadcast so far.
    pub fn get_broadcasts(&self) -> Vec<String> {
        self.broadcasts.lock().clone()
    }

    pub fn poll_count(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

impl ExecutionGateway for MockGateway {
    fn estimate_gas(&self, _from: Address, _to: Address, _data: Bytes) -> BoxFuture<'_, ExecutorResult<u64>> {
        Box::pin(async move { Ok(self.gas_estimate.load(Ordering::SeqCst)) })
    }

    fn current_gas_price(&self) -> BoxFuture<'_, ExecutorResult<u64>> {
        Box::pin(async move { Ok(self.gas_price.load(Ordering::SeqCst)) })
    }

    fn next_nonce(&self, _address: Address) -> BoxFuture<'_, ExecutorResult<u64>> {
        Box::pin(async move { Ok(self.nonce.load(Ordering::SeqCst)) })
    }

    fn broadcast(&self, signed_tx: String) -> BoxFuture<'_, ExecutorResult<String>> {
        Box::pin(async move {
            if let Some(error) = self.broadcast_error.lock().clone() {
                return Err(ExecutorError::BroadcastRejected(error));
            }
            let mut broadcasts = self.broadcasts.lock();
            broadcasts.push(signed_tx);
            self.nonce.fetch_add(1, Ordering::SeqCst);
            self.polls.store(0, Ordering::SeqCst);
            Ok(format!("0xtx{}", broadcasts.len()))
        })
    }

    fn receipt(&self, _tx_id: String) -> BoxFuture<'_, ExecutorResult<Option<TxReceipt>>> {
        Box::pin(async move {
            let seen = self.polls.fetch_add(1, Ordering::SeqCst);
            if seen < self.pending_polls.load(Ordering::SeqCst) {
                return Ok(None);
            }
            Ok(*self.receipt.lock())
        })
    }
}

/// Contract reader with settable values.
pub struct MockContractReader {
    price: Mutex<Price>,
    supply: Mutex<Size>,
    supply_reads: AtomicUsize,
}

impl MockContractReader {
    pub fn new(price: Price, supply: Size) -> Self {
        Self {
            price: Mutex::new(price),
            supply: Mutex::new(supply),
            supply_reads: AtomicUsize::new(0),
        }
    }

    pub fn set_price(&self, price: Price) {
        *self.price.lock() = price;
    }

    pub fn set_supply(&self, supply: Size) {
        *self.supply.lock() = supply;
    }

    pub fn supply_reads(&self) -> usize {
        self.supply_reads.load(Ordering::SeqCst)
    }
}

impl ContractReader for MockContractReader {
    fn latest_price(&self) -> BoxFuture<'_, ExecutorResult<Price>> {
        Box::pin(async move { Ok(*self.price.lock()) })
    }

    fn total_supply(&self) -> BoxFuture<'_, ExecutorResult<Size>> {
        Box::pin(async move {
            self.supply_reads.fetch_add(1, Ordering::SeqCst);
            Ok(*self.supply.lock())
        })
    }
}

/// Signer that tags transactions instead of signing them.
pub struct MockSigner {
    address: Address,
    signed: Mutex<Vec<UnsignedTransaction>>,
}

impl Default for MockSigner {
    fn default() -> Self {
        Self {
            address: Address::repeat_byte(0xaa),
            signed: Mutex::new(Vec::new()),
        }
    }
}

impl MockSigner {
    pub fn get_signed(&self) -> Vec<UnsignedTransaction> {
        self.signed.lock().clone()
    }
}

impl TransactionSigner for MockSigner {
    fn address(&self) -> Address {
        self.address
    }

    fn sign(&self, tx: UnsignedTransaction) -> ExecutorResult<SignedTransaction> {
        let signed = SignedTransaction {
            raw_hex: format!("0xsigned{}", tx.nonce),
            hash: B256::with_last_byte(tx.nonce as u8),
        };
        self.signed.lock().push(tx);
        Ok(signed)
    }
}
