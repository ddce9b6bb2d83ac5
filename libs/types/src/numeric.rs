//! Exact numeric types for prices and quantities
//!
//! Prices use rust_decimal so that OHLC comparisons and the values written
//! back into event fields round-trip the log text exactly. Quantities are
//! whole share counts.

use std::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::errors::FieldError;

/// An exact decimal price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(Decimal);

impl Price {
    /// Parse the text of a price field.
    ///
    /// `field` is only used to label the error.
    pub fn parse(field: &str, raw: &str) -> Result<Self, FieldError> {
        Decimal::from_str(raw.trim())
            .map(Self)
            .map_err(|_| FieldError::InvalidDecimal {
                field: field.to_string(),
                value: raw.to_string(),
            })
    }

    pub fn as_decimal(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A whole-number share quantity.
///
/// Signed: a remaining quantity derived from stale fills can go negative,
/// and that is reported as-is rather than clamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(i64);

impl Quantity {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Parse the text of an integer quantity field.
    pub fn parse(field: &str, raw: &str) -> Result<Self, FieldError> {
        raw.trim()
            .parse::<i64>()
            .map(Self)
            .map_err(|_| FieldError::InvalidInteger {
                field: field.to_string(),
                value: raw.to_string(),
            })
    }

    /// `self - other`, failing on overflow.
    pub fn checked_sub(self, other: Quantity, field: &str) -> Result<Quantity, FieldError> {
        self.0
            .checked_sub(other.0)
            .map(Quantity)
            .ok_or_else(|| FieldError::Overflow {
                field: field.to_string(),
            })
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
