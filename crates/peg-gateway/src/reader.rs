//! Contract reads over `eth_call`.

use std::sync::Arc;

use alloy::primitives::Address;
use peg_core::{BoxFuture, Price, Size};
use peg_executor::calldata::{decode_latest_price, decode_total_supply, latest_price_calldata, total_supply_calldata};
use peg_executor::{ContractReader, ExecutorResult};
use tracing::debug;

use crate::client::GatewayClient;

/// [`ContractReader`] backed by the gateway's JSON-RPC endpoint.
pub struct RpcContractReader {
    gateway: Arc<GatewayClient>,
    contract: Address,
    price_decimals: u32,
}

impl RpcContractReader {
    pub fn new(gateway: Arc<GatewayClient>, contract: Address, price_decimals: u32) -> Self {
        Self {
            gateway,
            contract,
            price_decimals,
        }
    }

    pub fn contract(&self) -> Address {
        self.contract
    }
}

impl ContractReader for RpcContractReader {
    fn latest_price(&self) -> BoxFuture<'_, ExecutorResult<Price>> {
        Box::pin(async move {
            let output = self.gateway.eth_call(self.contract, &latest_price_calldata()).await?;
            let price = decode_latest_price(&output, self.price_decimals)?;
            debug!(%price, "Read latest contract price");
            Ok(price)
        })
    }

    fn total_supply(&self) -> BoxFuture<'_, ExecutorResult<Size>> {
        Box::pin(async move {
            let output = self.gateway.eth_call(self.contract, &total_supply_calldata()).await?;
            let supply = decode_total_supply(&output)?;
            debug!(%supply, "Read total supply");
            Ok(supply)
        })
    }
}
