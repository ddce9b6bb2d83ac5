//! Event definitions for the feed analyzer
//!
//! `RawRecord` is one decoded log line as handed over by the loader.
//! `Event` is what the parser makes of it: a message kind, an absolute
//! timestamp, and the key/value fields embedded in the message text.
//!
//! Events are values. Later stages that derive fields (the order tracker)
//! build new events with `with_field` instead of editing the parsed ones.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use feed_types::errors::FieldError;
use feed_types::ids::{OrderId, Symbol};
use feed_types::numeric::{Price, Quantity};
use serde::{Deserialize, Serialize};

/// Field names used by the connector's message dumps.
pub mod field {
    pub const ORDER_ID: &str = "OrderID";
    pub const SYMBOL: &str = "Symbol";
    pub const PRICE: &str = "Price";
    pub const QUANTITY: &str = "Quantity";
    pub const EXECUTED_QTY: &str = "ExecutedQty";
    pub const SIDE_INDICATOR: &str = "SideIndicator";
    pub const HDR_SEQUENCE: &str = "HdrSequence";
    /// Venue timestamp in microseconds since the epoch.
    pub const TIMESTAMP: &str = "Timestamp";
}

/// Written into `SideIndicator` when no AddOrder is available to copy it from.
pub const UNKNOWN_SIDE: &str = "Unknown";

/// One structured log line.
///
/// Only the three fields the analyzer needs are kept; anything else in the
/// JSON line is ignored on decode.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RawRecord {
    /// ISO-8601 time, with a numeric offset or a `Z` suffix.
    #[serde(default)]
    pub time: String,
    /// Origin tag of the emitting code path.
    #[serde(default)]
    pub caller: String,
    /// Free text with an embedded `{Key:Value, ...}` block.
    #[serde(default)]
    pub message: String,
}

impl RawRecord {
    pub fn new(
        time: impl Into<String>,
        caller: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            time: time.into(),
            caller: caller.into(),
            message: message.into(),
        }
    }
}

/// The closed set of message kinds the analyzer understands.
///
/// Serialized with the connector's own message type names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum MessageKind {
    #[serde(rename = "AddOrderMessage")]
    AddOrder,
    #[serde(rename = "ModifyOrderMessage")]
    ModifyOrder,
    #[serde(rename = "OrderExecutedMessage")]
    OrderExecuted,
    #[serde(rename = "DeleteOrderMessage")]
    DeleteOrder,
    #[serde(rename = "AuctionUpdateMessage")]
    AuctionUpdate,
    #[serde(rename = "CalculatedValueMessage")]
    CalculatedValue,
    #[serde(rename = "HeaderSequence")]
    HeaderSequence,
}

impl MessageKind {
    /// All kinds, in default classification order.
    pub fn all() -> &'static [MessageKind] {
        &[
            MessageKind::AddOrder,
            MessageKind::ModifyOrder,
            MessageKind::OrderExecuted,
            MessageKind::DeleteOrder,
            MessageKind::AuctionUpdate,
            MessageKind::CalculatedValue,
            MessageKind::HeaderSequence,
        ]
    }

    /// Substring that identifies this kind in a log message.
    pub fn default_keyword(&self) -> &'static str {
        match self {
            MessageKind::AddOrder => "AddOrderMessage",
            MessageKind::ModifyOrder => "ModifyOrderMessage",
            MessageKind::OrderExecuted => "OrderExecutedMessage",
            MessageKind::DeleteOrder => "DeleteOrderMessage",
            MessageKind::AuctionUpdate => "AuctionUpdateMessage",
            MessageKind::CalculatedValue => "CalculatedValueMessage",
            MessageKind::HeaderSequence => "HdrSequence",
        }
    }

    /// Get the kind as a string label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            MessageKind::AddOrder => "AddOrder",
            MessageKind::ModifyOrder => "ModifyOrder",
            MessageKind::OrderExecuted => "OrderExecuted",
            MessageKind::DeleteOrder => "DeleteOrder",
            MessageKind::AuctionUpdate => "AuctionUpdate",
            MessageKind::CalculatedValue => "CalculatedValue",
            MessageKind::HeaderSequence => "HeaderSequence",
        }
    }

    /// Tie-break at equal timestamps: adds first, deletes last.
    pub fn replay_priority(&self) -> u8 {
        match self {
            MessageKind::AddOrder => 0,
            MessageKind::DeleteOrder => 2,
            _ => 1,
        }
    }

    /// Whether this kind belongs to a single order's lifecycle.
    pub fn is_order_kind(&self) -> bool {
        matches!(
            self,
            MessageKind::AddOrder
                | MessageKind::ModifyOrder
                | MessageKind::OrderExecuted
                | MessageKind::DeleteOrder
        )
    }
}

/// A parsed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "message_type")]
    pub kind: MessageKind,
    /// Unix nanoseconds (UTC), derived from `time`.
    pub timestamp: i64,
    /// The record's original time string.
    pub time: String,
    /// Embedded key/value block, ordered by key.
    #[serde(rename = "parsed_message")]
    pub fields: BTreeMap<String, String>,
}

impl Event {
    pub fn new(
        kind: MessageKind,
        timestamp: i64,
        time: impl Into<String>,
        fields: BTreeMap<String, String>,
    ) -> Self {
        Self {
            kind,
            timestamp,
            time: time.into(),
            fields,
        }
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Copy of this event with `name` set to `value`.
    pub fn with_field(mut self, name: &str, value: impl Into<String>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    /// Copy of this event without `name`.
    pub fn without_field(mut self, name: &str) -> Self {
        self.fields.remove(name);
        self
    }

    /// Normalized order id, if the event carries a usable one.
    pub fn order_id(&self) -> Option<OrderId> {
        self.field(field::ORDER_ID).and_then(OrderId::parse_raw)
    }

    pub fn symbol(&self) -> Option<Symbol> {
        self.field(field::SYMBOL).and_then(Symbol::try_new)
    }

    pub fn price(&self) -> Result<Price, FieldError> {
        let raw = self.require(field::PRICE)?;
        Price::parse(field::PRICE, raw)
    }

    pub fn quantity(&self, name: &str) -> Result<Quantity, FieldError> {
        let raw = self.require(name)?;
        Quantity::parse(name, raw)
    }

    /// Header sequence number; malformed or missing values read as 0.
    pub fn header_sequence(&self) -> i64 {
        self.field(field::HDR_SEQUENCE)
            .and_then(|raw| raw.trim().parse::<i64>().ok())
            .unwrap_or(0)
    }

    /// Whether this event takes part in header sequence checking.
    pub fn carries_header_sequence(&self) -> bool {
        self.kind == MessageKind::HeaderSequence || self.has_field(field::HDR_SEQUENCE)
    }

    /// Embedded venue timestamp in microseconds.
    pub fn venue_timestamp_micros(&self) -> Option<i64> {
        self.field(field::TIMESTAMP)
            .and_then(|raw| raw.trim().parse::<i64>().ok())
    }

    /// Replay ordering: timestamp, then kind priority.
    ///
    /// Kinds sharing a priority compare equal, so a stable sort keeps
    /// their input order.
    pub fn replay_cmp(&self, other: &Event) -> Ordering {
        self.timestamp
            .cmp(&other.timestamp)
            .then_with(|| self.kind.replay_priority().cmp(&other.kind.replay_priority()))
    }

    fn require(&self, name: &str) -> Result<&str, FieldError> {
        self.field(name).ok_or_else(|| FieldError::Missing {
            field: name.to_string(),
        })
    }
}
