//! Price type backed by decimal arithmetic.
//!
//! Prices are always produced by the server. The client formats them for
//! display but never sums them: cart totals come from the server snapshot.

use core::fmt;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// A monetary amount in the store currency.
///
/// Deserializes from either a JSON number or a decimal string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Price(Decimal);

impl Price {
    /// A zero amount.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create a new price.
    #[must_use]
    pub const fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Create a price from an amount in minor units (e.g. piasters, cents).
    #[must_use]
    pub fn from_minor(minor: i64) -> Self {
        Self(Decimal::new(minor, 2))
    }

    /// The underlying decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rounded = self
            .0
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        write!(f, "{rounded:.2}")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_number_and_string() {
        let from_number: Price = serde_json::from_str("249.5").unwrap();
        let from_string: Price = serde_json::from_str("\"249.50\"").unwrap();
        assert_eq!(from_number, from_string);
    }

    #[test]
    fn test_display_two_places() {
        assert_eq!(Price::from_minor(1999).to_string(), "19.99");
        assert_eq!(Price::new(Decimal::from(5)).to_string(), "5.00");
        assert_eq!(Price::ZERO.to_string(), "0.00");
    }
}
