//! Mint/burn execution for the peg stabilization agent.
//!
//! # Key Components
//!
//! - [`ExecutionGateway`], [`ContractReader`], [`TransactionSigner`]: collaborator seams
//! - [`TradeExecutor`]: one sub-order from calldata to a definite receipt status
//! - [`KeyManager`] / [`LocalSigner`]: trading key loading and legacy tx signing
//! - [`calldata`]: `mint`/`burn`/`totalSupply`/`getLatestPrice` ABI helpers
//! - [`mocks`]: scripted collaborators for tests and dry runs

pub mod calldata;
pub mod error;
pub mod mocks;
pub mod signer;
pub mod trade;
pub mod traits;

// Error types
pub use error::{ExecutorError, ExecutorResult};

// Collaborators
pub use traits::{
    ContractReader, DynContractReader, DynGateway, DynSigner, ExecutionGateway, TransactionSigner,
    TxReceipt,
};

// Signing
pub use signer::{KeyError, KeyManager, KeySource, LocalSigner, SignedTransaction, UnsignedTransaction};

// Execution
pub use trade::{TradeExecutor, TradeExecutorConfig, TradeOutcome, TradeStatus};

// Calldata
pub use calldata::TOKEN_DECIMALS;

// Mocks
pub use mocks::{MockContractReader, MockGateway, MockSigner};
