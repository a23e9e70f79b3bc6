//! Money value object.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// A strictly positive monetary amount, kept at two fractional digits.
///
/// There is no currency: the platform trades in a single currency.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Price(Decimal);

impl Price {
    /// Number of fractional digits kept.
    pub const SCALE: u32 = 2;

    /// Validate and normalize an amount (banker's rounding to [`Price::SCALE`]).
    pub fn new(amount: Decimal) -> DomainResult<Self> {
        let rounded = amount.round_dp(Self::SCALE);
        if rounded <= Decimal::ZERO {
            return Err(DomainError::validation("price must be positive"));
        }
        Ok(Self(rounded))
    }

    pub fn amount(&self) -> Decimal {
        self.0
    }
}

impl TryFrom<Decimal> for Price {
    type Error = DomainError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Price> for Decimal {
    fn from(value: Price) -> Self {
        value.0
    }
}

impl core::fmt::Display for Price {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}
