//! Identifier types for feed entities
//!
//! Feed identifiers are opaque strings copied verbatim out of log lines.
//! The newtypes keep order ids and symbols from being mixed up when they
//! are used as map keys.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a resting order.
///
/// Unique within one event stream for the lifetime of a single order.
/// Ordered so grouped output iterates deterministically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    /// Create an OrderId from an already-clean identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Normalize a raw `OrderID` field value.
    ///
    /// Some connector builds leak a trailing quoted fragment into the id
    /// (`12345"extra`); only the text before the first `"` identifies the
    /// order. Returns `None` when nothing usable is left.
    pub fn parse_raw(raw: &str) -> Option<Self> {
        let id = match raw.split_once('"') {
            Some((head, _)) => head,
            None => raw,
        }
        .trim();

        if id.is_empty() {
            None
        } else {
            Some(Self(id.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Instrument symbol (e.g. "BHP").
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Create a Symbol from a string.
    pub fn new(symbol: impl Into<String>) -> Self {
        Self(symbol.into())
    }

    /// Try to create a Symbol, returning None for blank input.
    pub fn try_new(symbol: impl Into<String>) -> Option<Self> {
        let s = symbol.into();
        if s.trim().is_empty() {
            None
        } else {
            Some(Self(s))
        }
    }

    /// Get the symbol string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_id_plain() {
        let id = OrderId::parse_raw("4FB2A1000001").unwrap();
        assert_eq!(id.as_str(), "4FB2A1000001");
    }

    #[test]
    fn test_order_id_strips_quoted_tail() {
        let id = OrderId::parse_raw("4FB2A1000001\" junk").unwrap();
        assert_eq!(id, OrderId::new("4FB2A1000001"));
    }

    #[test]
    fn test_order_id_empty_rejected() {
        assert!(OrderId::parse_raw("").is_none());
        assert!(OrderId::parse_raw("\"abc").is_none());
        assert!(OrderId::parse_raw("   ").is_none());
    }

    #[test]
    fn test_symbol_try_new() {
        assert!(Symbol::try_new("BHP").is_some());
        assert!(Symbol::try_new("  ").is_none());
    }

    #[test]
    fn test_symbol_ordering() {
        let mut symbols = vec![Symbol::new("WBC"), Symbol::new("ANZ"), Symbol::new("BHP")];
        symbols.sort();
        assert_eq!(symbols[0].as_str(), "ANZ");
        assert_eq!(symbols[2].as_str(), "WBC");
    }

    #[test]
    fn test_symbol_serialization() {
        let symbol = Symbol::new("BHP");
        let json = serde_json::to_string(&symbol).unwrap();
        assert_eq!(json, "\"BHP\"");

        let deserialized: Symbol = serde_json::from_str(&json).unwrap();
        assert_eq!(symbol, deserialized);
    }
}
