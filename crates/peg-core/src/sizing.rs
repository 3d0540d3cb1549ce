//! Mint/burn sizing policy.
//!
//! The trade size grows linearly with the distance from the peg and is
//! capped at a fraction of current volume.

use crate::decimal::{Price, Size};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which side of the peg a trade pushes supply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeDirection {
    /// Price below target: expand supply.
    Mint,
    /// Price at or above target: contract supply.
    Burn,
}

impl fmt::Display for TradeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mint => write!(f, "mint"),
            Self::Burn => write!(f, "burn"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeSize {
    pub size: Size,
    pub direction: TradeDirection,
}

/// Parameters of the sizing policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeSizingConfig {
    #[serde(default = "default_target_price")]
    pub target_price: Price,
    /// Fraction of volume used as the base trade size.
    #[serde(default = "default_base_fraction")]
    pub base_fraction: Decimal,
    /// Scales the deviation before it multiplies the base size.
    #[serde(default = "default_deviation_multiplier")]
    pub deviation_multiplier: Decimal,
    /// Upper bound as a fraction of volume.
    #[serde(default = "default_max_fraction")]
    pub max_fraction: Decimal,
}

fn default_target_price() -> Price {
    Price::ONE
}

fn default_base_fraction() -> Decimal {
    dec!(0.01)
}

fn default_deviation_multiplier() -> Decimal {
    dec!(10)
}

fn default_max_fraction() -> Decimal {
    dec!(0.05)
}

impl Default for TradeSizingConfig {
    fn default() -> Self {
        Self {
            target_price: default_target_price(),
            base_fraction: default_base_fraction(),
            deviation_multiplier: default_deviation_multiplier(),
            max_fraction: default_max_fraction(),
        }
    }
}

/// Size and direction of a corrective trade.
///
/// `size = min(volume * base_fraction * deviation * multiplier, volume * max_fraction)`
pub fn calculate_trade_size(price: Price, volume: Size, config: &TradeSizingConfig) -> TradeSize {
    let deviation = price.deviation_from(config.target_price);
    let base = volume.inner() * config.base_fraction;
    let scaled = base * deviation * config.deviation_multiplier;
    let cap = volume.inner() * config.max_fraction;

    let direction = if price < config.target_price {
        TradeDirection::Mint
    } else {
        TradeDirection::Burn
    };

    TradeSize {
        size: Size::new(scaled.min(cap)),
        direction,
    }
}
