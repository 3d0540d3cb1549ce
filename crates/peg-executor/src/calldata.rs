//! ABI encoding for the stable token contract.

use alloy::primitives::{Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolCall;
use peg_core::{fixed_point_to_decimal, Price, Size, TradeDirection};

use crate::error::{ExecutorError, ExecutorResult};

/// Token amounts are 18-decimal fixed point.
pub const TOKEN_DECIMALS: u32 = 18;

sol! {
    interface IPegToken {
        function mint(uint256 amount) external;
        function burn(uint256 amount) external;
        function totalSupply() external view returns (uint256 supply);
        function getLatestPrice() external view returns (int256 price);
    }
}

/// Calldata for a mint or burn of `size` tokens.
pub fn trade_calldata(direction: TradeDirection, size: Size) -> ExecutorResult<Bytes> {
    let amount = size
        .to_base_units(TOKEN_DECIMALS)
        .map_err(|e| ExecutorError::Encoding(e.to_string()))?;
    let amount = U256::from(amount);

    let encoded = match direction {
        TradeDirection::Mint => IPegToken::mintCall { amount }.abi_encode(),
        TradeDirection::Burn => IPegToken::burnCall { amount }.abi_encode(),
    };
    Ok(encoded.into())
}

pub fn latest_price_calldata() -> Bytes {
    IPegToken::getLatestPriceCall {}.abi_encode().into()
}

pub fn total_supply_calldata() -> Bytes {
    IPegToken::totalSupplyCall {}.abi_encode().into()
}

/// Decode `getLatestPrice()` output with `decimals` of fixed point.
pub fn decode_latest_price(data: &[u8], decimals: u32) -> ExecutorResult<Price> {
    let ret = IPegToken::getLatestPriceCall::abi_decode_returns(data, true)
        .map_err(|e| ExecutorError::InvalidResponse(e.to_string()))?;
    let raw: i128 = ret
        .price
        .to_string()
        .parse()
        .map_err(|_| ExecutorError::InvalidResponse(format!("price out of range: {}", ret.price)))?;
    let value = fixed_point_to_decimal(raw, decimals)
        .map_err(|e| ExecutorError::InvalidResponse(e.to_string()))?;
    Ok(Price::new(value))
}

/// Decode `totalSupply()` output into whole tokens.
pub fn decode_total_supply(data: &[u8]) -> ExecutorResult<Size> {
    let ret = IPegToken::totalSupplyCall::abi_decode_returns(data, true)
        .map_err(|e| ExecutorError::InvalidResponse(e.to_string()))?;
    let raw = u128::try_from(ret.supply)
        .ok()
        .and_then(|v| i128::try_from(v).ok())
        .ok_or_else(|| ExecutorError::InvalidResponse(format!("supply out of range: {}", ret.supply)))?;
    let value = fixed_point_to_decimal(raw, TOKEN_DECIMALS)
        .map_err(|e| ExecutorError::InvalidResponse(e.to_string()))?;
    Ok(Size::new(value.normalize()))
}
