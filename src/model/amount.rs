//! Amount type for handling the monetary value of an expense.
//!
//! The server exchanges amounts as plain JSON numbers, but command line input and older cached
//! documents may carry them as strings, so both are accepted when parsing.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde::de::Visitor;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;

/// A non-negative monetary amount.
///
/// # Examples
///
/// ```
/// # use mezgeb::model::Amount;
/// # use std::str::FromStr;
/// let amount = Amount::from_str("1,250.50").unwrap();
/// assert_eq!(amount.to_string(), "1250.50");
/// assert!(Amount::from_str("-3").is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(Decimal);

impl Amount {
    /// Creates a new `Amount`, refusing negative values.
    pub fn new(value: Decimal) -> Result<Self, AmountError> {
        if value.is_sign_negative() && !value.is_zero() {
            return Err(AmountError::Negative(value));
        }
        Ok(Self(value))
    }

    /// Returns the underlying Decimal value.
    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

/// An error that can occur when constructing an `Amount`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AmountError {
    Negative(Decimal),
    Invalid(String),
}

impl Display for AmountError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            AmountError::Negative(v) => write!(f, "Amount cannot be negative, got {v}"),
            AmountError::Invalid(s) => write!(f, "Invalid amount '{s}'"),
        }
    }
}

impl std::error::Error for AmountError {}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Ok(Amount::default());
        }

        // Thousands separators are accepted but not retained.
        let without_commas = trimmed.replace(',', "");
        let value = Decimal::from_str(&without_commas)
            .map_err(|_| AmountError::Invalid(trimmed.to_string()))?;
        Amount::new(value)
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
        if self.0.fract().is_zero() {
            if let Some(n) = self.0.to_u64() {
                return serializer.serialize_u64(n);
            }
        }
        serializer.serialize_f64(self.0.to_f64().unwrap_or_default())
    }
}

struct AmountVisitor;

impl Visitor<'_> for AmountVisitor {
    type Value = Amount;

    fn expecting(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("a non-negative number or numeric string")
    }

    fn visit_u64<E: serde::de::Error>(self, v: u64) -> Result<Amount, E> {
        Amount::new(Decimal::from(v)).map_err(E::custom)
    }

    fn visit_i64<E: serde::de::Error>(self, v: i64) -> Result<Amount, E> {
        Amount::new(Decimal::from(v)).map_err(E::custom)
    }

    fn visit_f64<E: serde::de::Error>(self, v: f64) -> Result<Amount, E> {
        let value = Decimal::from_f64(v)
            .ok_or_else(|| E::custom(AmountError::Invalid(v.to_string())))?;
        Amount::new(value).map_err(E::custom)
    }

    fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Amount, E> {
        Amount::from_str(v).map_err(E::custom)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(AmountVisitor)
    }
}

impl TryFrom<Decimal> for Amount {
    type Error = AmountError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Amount::new(value)
    }
}

impl From<u32> for Amount {
    fn from(value: u32) -> Self {
        Amount(Decimal::from(value))
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain() {
        let amount = Amount::from_str("50.00").unwrap();
        assert_eq!(amount.value(), Decimal::from_str("50.00").unwrap());
    }

    #[test]
    fn test_parse_with_commas() {
        let amount = Amount::from_str("1,234,567.89").unwrap();
        assert_eq!(amount.value(), Decimal::from_str("1234567.89").unwrap());
    }

    #[test]
    fn test_parse_empty_string() {
        let amount = Amount::from_str("  ").unwrap();
        assert!(amount.is_zero());
    }

    #[test]
    fn test_parse_negative_is_rejected() {
        let err = Amount::from_str("-50").unwrap_err();
        assert!(matches!(err, AmountError::Negative(_)));
    }

    #[test]
    fn test_parse_garbage_is_rejected() {
        let err = Amount::from_str("fifty").unwrap_err();
        assert_eq!(err, AmountError::Invalid("fifty".to_string()));
    }

    #[test]
    fn test_serialize_whole_number() {
        let json = serde_json::to_string(&Amount::from(50)).unwrap();
        assert_eq!(json, "50");
    }

    #[test]
    fn test_serialize_fraction() {
        let amount = Amount::from_str("12.5").unwrap();
        let json = serde_json::to_string(&amount).unwrap();
        assert_eq!(json, "12.5");
    }

    #[test]
    fn test_deserialize_number_and_string() {
        let a: Amount = serde_json::from_str("12.5").unwrap();
        let b: Amount = serde_json::from_str("\"12.5\"").unwrap();
        assert_eq!(a.value(), b.value());
        let c: Amount = serde_json::from_str("300").unwrap();
        assert_eq!(c, Amount::from(300));
    }

    #[test]
    fn test_deserialize_negative_is_rejected() {
        assert!(serde_json::from_str::<Amount>("-4").is_err());
        assert!(serde_json::from_str::<Amount>("-4.5").is_err());
    }
}
