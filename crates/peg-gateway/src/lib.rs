//! Chain gateway adapters for the peg stabilization agent.
//!
//! - [`GatewayClient`]: REST gas/nonce/broadcast/receipt, account and monitoring calls plus JSON-RPC `eth_call`,
//!   implementing [`peg_executor::ExecutionGateway`]
//! - [`RpcContractReader`]: [`peg_executor::ContractReader`] over `eth_call`
//! - [`EndpointLimiter`]: per-route serialization with minimum spacing
//! - [`retry_async`]: bounded exponential retry

pub mod client;
pub mod config;
pub mod error;
pub mod rate_limiter;
pub mod reader;
pub mod retry;

pub use client::GatewayClient;
pub use config::GatewayConfig;
pub use error::{GatewayError, GatewayResult};
pub use rate_limiter::{EndpointLimiter, EndpointPermit};
pub use reader::RpcContractReader;
pub use retry::{retry_async, RetryPolicy};
