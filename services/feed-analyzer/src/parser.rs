//! Record classifier and parser
//!
//! Turns one `RawRecord` into a typed `Event`:
//!
//! 1. noise check (caller tag, noise markers) → `Ok(None)`
//! 2. message kind from the first matching keyword
//! 3. field block between the first `{` and the last `}`
//! 4. record time → Unix nanoseconds
//!
//! The field block is split with a small tokenizer rather than on a fixed
//! `", "` separator, so quoted values containing commas or colons and
//! nested `{}`/`[]` values survive intact.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset};
use tracing::{debug, warn};

use crate::config::ClassifierConfig;
use crate::events::{Event, MessageKind, RawRecord};

/// Why a record could not be turned into an event.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("no known message kind in record")]
    UnknownMessageKind,

    #[error("record of kind {0:?} has no field block")]
    MissingFieldBlock(MessageKind),

    #[error("invalid record time: {0:?}")]
    InvalidTimestamp(String),
}

impl ParseError {
    /// Short label used as a stats key.
    pub fn label(&self) -> &'static str {
        match self {
            ParseError::UnknownMessageKind => "unknown_message_kind",
            ParseError::MissingFieldBlock(_) => "missing_field_block",
            ParseError::InvalidTimestamp(_) => "invalid_timestamp",
        }
    }
}

/// Whether a record is connector noise that should be discarded silently.
pub fn is_noise(record: &RawRecord, config: &ClassifierConfig) -> bool {
    !record.caller.contains(&config.caller_tag)
        || config
            .noise_markers
            .iter()
            .any(|marker| record.message.contains(marker.as_str()))
}

/// Message kind from the first configured keyword found in `message`.
pub fn classify(message: &str, config: &ClassifierConfig) -> Option<MessageKind> {
    config
        .keywords
        .iter()
        .find(|entry| message.contains(entry.keyword.as_str()))
        .map(|entry| entry.kind)
}

/// Parse one record.
///
/// `Ok(None)` means the record was noise; `Err` means it looked like a feed
/// message but could not be decoded. Neither aborts a batch.
pub fn parse_record(
    record: &RawRecord,
    config: &ClassifierConfig,
) -> Result<Option<Event>, ParseError> {
    if is_noise(record, config) {
        return Ok(None);
    }

    let kind = match classify(&record.message, config) {
        Some(kind) => kind,
        None => {
            debug!(caller = %record.caller, "No message kind keyword in record");
            return Err(ParseError::UnknownMessageKind);
        }
    };

    let fields = match parse_field_block(&record.message) {
        Some(fields) => fields,
        None => {
            warn!(kind = kind.label(), time = %record.time, "Record has no field block");
            return Err(ParseError::MissingFieldBlock(kind));
        }
    };

    let timestamp = match parse_time(&record.time) {
        Some(ts) => ts,
        None => {
            warn!(kind = kind.label(), time = %record.time, "Record time is not ISO-8601");
            return Err(ParseError::InvalidTimestamp(record.time.clone()));
        }
    };

    Ok(Some(Event::new(kind, timestamp, record.time.clone(), fields)))
}

/// Parse a record time into Unix nanoseconds.
///
/// Accepts RFC 3339 (`+11:00` or `Z`) and the compact `+1100` offset form,
/// with or without fractional seconds.
pub fn parse_time(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    let parsed: DateTime<FixedOffset> = DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z"))
        .ok()?;
    parsed.timestamp_nanos_opt()
}

/// Extract the key/value map from the outermost `{...}` of a message.
///
/// Returns `None` when there is no brace pair. Items without a colon are
/// skipped.
pub fn parse_field_block(message: &str) -> Option<BTreeMap<String, String>> {
    let open = message.find('{')?;
    let close = message.rfind('}')?;
    if close <= open {
        return None;
    }
    let body = &message[open + 1..close];

    let mut fields = BTreeMap::new();
    for item in split_top_level(body, ',') {
        let Some((key, value)) = split_first_colon(item) else {
            continue;
        };
        let key = clean_token(key);
        if key.is_empty() {
            continue;
        }
        fields.insert(key, clean_token(value));
    }
    Some(fields)
}

// ── Tokenizer ────────────────────────────────────────────────

/// Quote tracking shared by the splitters.
///
/// A `"` opens a string only as the first non-space character of a key or
/// value. A quote anywhere else is kept as plain text, so a stray quote in
/// one value cannot swallow the fields after it.
#[derive(Debug, Default)]
struct QuoteState {
    in_quotes: bool,
    escaped: bool,
    at_token_start: bool,
}

impl QuoteState {
    fn new() -> Self {
        Self {
            at_token_start: true,
            ..Self::default()
        }
    }

    /// Feed one character; returns true when it sits outside any string.
    fn step(&mut self, c: char) -> bool {
        if self.in_quotes {
            if self.escaped {
                self.escaped = false;
            } else if c == '\\' {
                self.escaped = true;
            } else if c == '"' {
                self.in_quotes = false;
            }
            return false;
        }
        if c == '"' && self.at_token_start {
            self.in_quotes = true;
            self.at_token_start = false;
            return false;
        }
        if !c.is_whitespace() {
            self.at_token_start = false;
        }
        true
    }

    fn start_token(&mut self) {
        self.at_token_start = true;
    }
}

/// Split on `sep` where it appears outside strings and nested brackets.
fn split_top_level(body: &str, sep: char) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth: usize = 0;
    let mut quotes = QuoteState::new();
    let mut start = 0;

    for (i, c) in body.char_indices() {
        if !quotes.step(c) {
            continue;
        }
        match c {
            '{' | '[' => {
                depth += 1;
                quotes.start_token();
            }
            '}' | ']' => depth = depth.saturating_sub(1),
            ':' => quotes.start_token(),
            c if c == sep => {
                if depth == 0 {
                    parts.push(&body[start..i]);
                    start = i + c.len_utf8();
                }
                quotes.start_token();
            }
            _ => {}
        }
    }
    parts.push(&body[start..]);
    parts
}

/// Split an item at its first colon outside a string.
fn split_first_colon(item: &str) -> Option<(&str, &str)> {
    let mut quotes = QuoteState::new();
    for (i, c) in item.char_indices() {
        if quotes.step(c) && c == ':' {
            return Some((&item[..i], &item[i + 1..]));
        }
    }
    None
}

/// Trim whitespace and unwrap a leading quoted string.
///
/// Escapes are resolved inside the string. Text after the closing quote is
/// kept verbatim together with that quote, so `"123"x"` becomes `123"x"`.
fn clean_token(raw: &str) -> String {
    let trimmed = raw.trim();
    let Some(quoted) = trimmed.strip_prefix('"') else {
        return trimmed.to_string();
    };

    let mut out = String::with_capacity(trimmed.len());
    let mut chars = quoted.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => {
                if let Some((_, next)) = chars.next() {
                    out.push(next);
                }
            }
            '"' => {
                let tail = quoted[i + 1..].trim_end();
                if !tail.is_empty() {
                    out.push('"');
                    out.push_str(tail);
                }
                return out.trim().to_string();
            }
            _ => out.push(c),
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::field;

    const CALLER: &str = "cboe/message_handler.go:214";

    fn record(message: &str) -> RawRecord {
        RawRecord::new("2025-02-14T10:15:30+11:00", CALLER, message)
    }

    #[test]
    fn test_parse_add_order() {
        let config = ClassifierConfig::default();
        let rec = record(
            r#"recv AddOrderMessage {OrderID:"4FB2A1", Symbol:"BHP", Price:10.25, Quantity:100, SideIndicator:"B"}"#,
        );
        let event = parse_record(&rec, &config).unwrap().unwrap();

        assert_eq!(event.kind, MessageKind::AddOrder);
        assert_eq!(event.field(field::ORDER_ID), Some("4FB2A1"));
        assert_eq!(event.field(field::SYMBOL), Some("BHP"));
        assert_eq!(event.field(field::PRICE), Some("10.25"));
        assert_eq!(event.field(field::QUANTITY), Some("100"));
        assert_eq!(event.field(field::SIDE_INDICATOR), Some("B"));
        assert_eq!(event.time, "2025-02-14T10:15:30+11:00");
    }

    #[test]
    fn test_noise_markers_filtered() {
        let config = ClassifierConfig::default();
        let unsupported = record("Unsupported AddOrderMessage {OrderID:1}");
        let redis = record("AddOrderMessage Err: redis: nil {OrderID:1}");
        assert_eq!(parse_record(&unsupported, &config), Ok(None));
        assert_eq!(parse_record(&redis, &config), Ok(None));
    }

    #[test]
    fn test_wrong_caller_filtered() {
        let config = ClassifierConfig::default();
        let rec = RawRecord::new(
            "2025-02-14T10:15:30Z",
            "cboe/session.go:10",
            "AddOrderMessage {OrderID:1}",
        );
        assert_eq!(parse_record(&rec, &config), Ok(None));
    }

    #[test]
    fn test_unknown_kind() {
        let config = ClassifierConfig::default();
        let rec = record("HeartbeatMessage {Seq:1}");
        assert_eq!(
            parse_record(&rec, &config),
            Err(ParseError::UnknownMessageKind)
        );
    }

    #[test]
    fn test_missing_field_block() {
        let config = ClassifierConfig::default();
        let rec = record("DeleteOrderMessage without fields");
        assert_eq!(
            parse_record(&rec, &config),
            Err(ParseError::MissingFieldBlock(MessageKind::DeleteOrder))
        );
    }

    #[test]
    fn test_invalid_time() {
        let config = ClassifierConfig::default();
        let rec = RawRecord::new("14/02/2025 10:15", CALLER, "DeleteOrderMessage {OrderID:1}");
        assert!(matches!(
            parse_record(&rec, &config),
            Err(ParseError::InvalidTimestamp(_))
        ));
    }

    #[test]
    fn test_first_keyword_wins() {
        let config = ClassifierConfig::default();
        // A header dump of an executed order mentions both keywords.
        let kind = classify("OrderExecutedMessage HdrSequence:9", &config);
        assert_eq!(kind, Some(MessageKind::OrderExecuted));
        assert_eq!(
            classify("packet HdrSequence:9", &config),
            Some(MessageKind::HeaderSequence)
        );
    }

    #[test]
    fn test_time_formats() {
        let utc = parse_time("2025-02-14T00:00:00Z").unwrap();
        let offset = parse_time("2025-02-14T11:00:00+11:00").unwrap();
        let compact = parse_time("2025-02-14T11:00:00+1100").unwrap();
        let fractional = parse_time("2025-02-14T11:00:00.250+11:00").unwrap();

        assert_eq!(utc, offset);
        assert_eq!(utc, compact);
        assert_eq!(fractional - utc, 250_000_000);
        assert_eq!(utc, 1_739_491_200_000_000_000);
        assert!(parse_time("2025-02-14 11:00:00").is_none());
    }

    #[test]
    fn test_quoted_commas_and_colons_survive() {
        let fields =
            parse_field_block(r#"{Text:"a, b: c", Symbol:"BHP", Note:"say \"hi\""}"#).unwrap();
        assert_eq!(fields.get("Text").map(String::as_str), Some("a, b: c"));
        assert_eq!(fields.get("Symbol").map(String::as_str), Some("BHP"));
        assert_eq!(fields.get("Note").map(String::as_str), Some("say \"hi\""));
    }

    #[test]
    fn test_stray_quote_keeps_later_fields() {
        let fields =
            parse_field_block(r#"{OrderID:"12345"junk", ExecutedQty:40, HdrSequence:2}"#)
                .unwrap();
        assert_eq!(fields.len(), 3);
        assert_eq!(fields.get("OrderID").map(String::as_str), Some("12345\"junk\""));
        assert_eq!(fields.get("ExecutedQty").map(String::as_str), Some("40"));
        assert_eq!(fields.get("HdrSequence").map(String::as_str), Some("2"));
    }

    #[test]
    fn test_stray_quote_record_normalizes_order_id() {
        let config = ClassifierConfig::default();
        let rec = record(r#"OrderExecutedMessage {OrderID:"12345"junk", ExecutedQty:40}"#);
        let event = parse_record(&rec, &config).unwrap().unwrap();

        assert_eq!(event.order_id(), Some(feed_types::ids::OrderId::new("12345")));
        assert_eq!(event.field(field::EXECUTED_QTY), Some("40"));
    }

    #[test]
    fn test_mid_value_quote_is_plain_text() {
        let fields = parse_field_block(r#"{Name:O"Brien, Symbol:"BHP"}"#).unwrap();
        assert_eq!(fields.get("Name").map(String::as_str), Some("O\"Brien"));
        assert_eq!(fields.get("Symbol").map(String::as_str), Some("BHP"));
    }

    #[test]
    fn test_nested_block_kept_whole() {
        let fields = parse_field_block("{Legs:[1, 2], Meta:{A:1, B:2}, Symbol:BHP}").unwrap();
        assert_eq!(fields.get("Legs").map(String::as_str), Some("[1, 2]"));
        assert_eq!(fields.get("Meta").map(String::as_str), Some("{A:1, B:2}"));
        assert_eq!(fields.get("Symbol").map(String::as_str), Some("BHP"));
    }

    #[test]
    fn test_items_without_colon_skipped() {
        let fields = parse_field_block("{Symbol:BHP, garbage, Price: 1.5 }").unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields.get("Price").map(String::as_str), Some("1.5"));
    }

    #[test]
    fn test_no_brace_pair() {
        assert!(parse_field_block("no braces").is_none());
        assert!(parse_field_block("} reversed {").is_none());
        assert_eq!(parse_field_block("{}").map(|f| f.len()), Some(0));
    }

    #[test]
    fn test_error_labels() {
        assert_eq!(ParseError::UnknownMessageKind.label(), "unknown_message_kind");
        assert_eq!(
            ParseError::InvalidTimestamp(String::new()).label(),
            "invalid_timestamp"
        );
    }
}
