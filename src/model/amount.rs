//! Monetary values as they appear in the sheet and in cache blobs.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::error::Error;
use std::fmt::{self, Debug, Display, Formatter};
use std::ops::Add;
use std::str::FromStr;

/// Wraps `Decimal`. Parsing tolerates a leading currency symbol and thousands separators so that
/// formatted sheet cells such as `-$1,250.00` or `R$ 39.90` are accepted. Equality is numeric,
/// so `1.5` and `1.50` are equal.
///
/// ```
/// # use finmirror::model::Amount;
/// # use std::str::FromStr;
/// let amount = Amount::from_str("-$1,250.00").unwrap();
/// assert_eq!(amount.to_string(), "-1250.00");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(Decimal);

impl Amount {
    pub const ZERO: Amount = Amount(Decimal::ZERO);

    pub const fn new(value: Decimal) -> Self {
        Self(value)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        !self.is_zero() && self.0.is_sign_negative()
    }

    /// Parses `s`, coercing anything unparsable to zero.
    pub fn parse_or_zero(s: &str) -> Self {
        Self::from_str(s).unwrap_or_default()
    }
}

impl From<Decimal> for Amount {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

impl Add for Amount {
    type Output = Amount;

    fn add(self, rhs: Self) -> Self::Output {
        Amount(self.0 + rhs.0)
    }
}

/// An error that can occur when parsing strings into `Amount` values.
pub struct AmountError(rust_decimal::Error);

impl Debug for AmountError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Debug::fmt(&self.0, f)
    }
}

impl Display for AmountError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl Error for AmountError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.0)
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Ok(Amount::default());
        }

        let (negative, rest) = match trimmed.strip_prefix('-') {
            Some(rest) => (true, rest.trim_start()),
            None => (false, trimmed),
        };

        // Currency symbols such as "$" or "R$" sit between the sign and the digits.
        let digits = rest.trim_start_matches(|c: char| c.is_alphabetic() || c == '$');
        let digits = digits.trim_start().replace(',', "");

        // A sign may also follow the currency symbol, e.g. "R$ -39.90".
        let value = Decimal::from_str(&digits)
            .or_else(|_| Decimal::from_scientific(&digits))
            .map_err(AmountError)?;
        Ok(Amount(if negative { -value } else { value }))
    }
}

impl Display for Amount {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl Serialize for Amount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        rust_decimal::serde::float::serialize(&self.0, serializer)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        rust_decimal::serde::float::deserialize(deserializer).map(Amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn amount(s: &str) -> Amount {
        Amount::from_str(s).unwrap()
    }

    #[test]
    fn test_plain_values() {
        assert_eq!(amount("-39.90").value(), Decimal::new(-3990, 2));
        assert_eq!(amount("1500").value(), Decimal::new(1500, 0));
        assert_eq!(amount("").value(), Decimal::ZERO);
    }

    #[test]
    fn test_formatted_values() {
        assert_eq!(amount("-$1,250.00").value(), Decimal::new(-125000, 2));
        assert_eq!(amount("$50.00").value(), Decimal::new(50, 0));
        assert_eq!(amount("R$ -39.90").value(), Decimal::new(-3990, 2));
        assert_eq!(amount("- R$ 39.90").value(), Decimal::new(-3990, 2));
    }

    #[test]
    fn test_unparsable_is_zero() {
        assert!(Amount::from_str("abc").is_err());
        assert!(Amount::parse_or_zero("abc").is_zero());
        assert!(Amount::parse_or_zero("12..3").is_zero());
    }

    #[test]
    fn test_display_is_plain_decimal() {
        assert_eq!(amount("-$5,000.00").to_string(), "-5000.00");
        assert!(amount("-5000.00").is_negative());
        assert_eq!(amount("1.50"), amount("1.5"));
    }

    #[test]
    fn test_serializes_as_number() {
        let json = serde_json::to_string(&amount("-39.90")).unwrap();
        assert_eq!(json, "-39.9");
        let back: Amount = serde_json::from_str("12.5").unwrap();
        assert_eq!(back, amount("12.5"));
    }
}
