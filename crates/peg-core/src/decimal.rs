//! Precision-safe decimal types for trading.
//!
//! Uses `rust_decimal` for exact decimal arithmetic, avoiding
//! floating-point rounding errors critical in financial calculations.

use crate::error::{CoreError, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, Div, Sub};
use std::str::FromStr;

/// Largest scale a `Decimal` can carry.
const MAX_SCALE: u32 = 28;

/// Price of the managed token in quote currency (USD).
///
/// Wraps `Decimal` to provide type safety and prevent mixing
/// prices with sizes in calculations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(pub Decimal);

impl Price {
    pub const ZERO: Self = Self(Decimal::ZERO);
    pub const ONE: Self = Self(Decimal::ONE);

    #[inline]
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    #[inline]
    pub fn inner(&self) -> Decimal {
        self.0
    }

    /// Absolute distance from another price.
    #[inline]
    pub fn deviation_from(&self, other: Price) -> Decimal {
        (self.0 - other.0).abs()
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Price {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Token amount (supply, volume, trade size) with exact decimal precision.
///
/// Wraps `Decimal` to provide type safety and prevent mixing
/// sizes with prices in calculations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Size(pub Decimal);

impl Size {
    pub const ZERO: Self = Self(Decimal::ZERO);
    pub const ONE: Self = Self(Decimal::ONE);

    #[inline]
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    #[inline]
    pub fn inner(&self) -> Decimal {
        self.0
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Convert to base units with the given number of decimals (e.g. 18 for wei).
    ///
    /// Fractional base units are truncated.
    pub fn to_base_units(&self, decimals: u32) -> Result<u128> {
        if self.0.is_sign_negative() {
            return Err(CoreError::InvalidSize(format!("negative amount {}", self.0)));
        }
        if decimals > MAX_SCALE {
            return Err(CoreError::FixedPointOverflow(format!("scale {decimals}")));
        }
        let factor = Decimal::from_i128_with_scale(10i128.pow(decimals), 0);
        self.0
            .checked_mul(factor)
            .and_then(|scaled| scaled.trunc().to_u128())
            .ok_or_else(|| CoreError::FixedPointOverflow(self.0.to_string()))
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Size {
    type Err = rust_decimal::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

impl Add for Size {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for Size {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl Div<Decimal> for Size {
    type Output = Self;

    fn div(self, rhs: Decimal) -> Self::Output {
        Self(self.0 / rhs)
    }
}

impl Sum for Size {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Size::ZERO, |acc, s| acc + s)
    }
}

/// Convert a raw fixed-point integer with `decimals` fractional digits to a `Decimal`.
///
/// Oracle prices arrive with 8 decimals, token amounts with 18.
pub fn fixed_point_to_decimal(raw: i128, decimals: u32) -> Result<Decimal> {
    Decimal::try_from_i128_with_scale(raw, decimals)
        .map_err(|_| CoreError::FixedPointOverflow(format!("{raw} (scale {decimals})")))
}
