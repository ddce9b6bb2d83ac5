//! Analyzer configuration
//!
//! One immutable `AnalyzerConfig` is built up front and handed to every
//! stage by reference. Every field has a default, so a JSON config file only
//! needs to name what it overrides.

use std::collections::BTreeSet;

use chrono_tz::Tz;
use feed_types::ids::Symbol;
use feed_types::numeric::Price;
use serde::{Deserialize, Serialize};

use crate::candles::Timeframe;
use crate::events::MessageKind;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown time zone: {0}")]
    UnknownTimezone(String),

    #[error("no candle timeframes configured")]
    EmptyTimeframes,

    #[error("no message kind keywords configured")]
    EmptyKeywords,

    #[error("time range start {start} is after end {end}")]
    InvertedTimeRange { start: i64, end: i64 },

    #[error("invalid config: {0}")]
    Parse(String),
}

/// Substring-to-kind mapping used by the classifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindKeyword {
    pub keyword: String,
    pub kind: MessageKind,
}

/// Record classification rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Checked in order; the first keyword found in a message decides its kind.
    pub keywords: Vec<KindKeyword>,
    /// Records whose caller lacks this tag are noise.
    pub caller_tag: String,
    /// Records whose message contains any of these are noise.
    pub noise_markers: Vec<String>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            keywords: MessageKind::all()
                .iter()
                .map(|kind| KindKeyword {
                    keyword: kind.default_keyword().to_string(),
                    kind: *kind,
                })
                .collect(),
            caller_tag: "message_handler".to_string(),
            noise_markers: vec!["Unsupported".to_string(), "Err: redis: nil".to_string()],
        }
    }
}

/// Inclusive range in Unix microseconds. Filters match it against the
/// embedded venue `Timestamp`; drop counting against the record time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start_micros: i64,
    pub end_micros: i64,
}

impl TimeRange {
    pub fn new(start_micros: i64, end_micros: i64) -> Self {
        Self {
            start_micros,
            end_micros,
        }
    }

    pub fn contains(&self, micros: i64) -> bool {
        self.start_micros <= micros && micros <= self.end_micros
    }
}

/// Post-tracking selection of orders.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Keep only orders with at least one execution.
    pub only_executed: bool,
    /// Symbol allow-list; `None` keeps every symbol.
    pub symbols: Option<BTreeSet<Symbol>>,
    pub time_range: Option<TimeRange>,
    /// Keep only orders that traded or rested at exactly this price.
    pub target_price: Option<Price>,
}

impl FilterConfig {
    pub fn is_empty(&self) -> bool {
        !self.only_executed
            && self.symbol_allow_list().is_none()
            && self.time_range.is_none()
            && self.target_price.is_none()
    }

    /// The symbol allow-list, if one is in effect. An empty set keeps
    /// every symbol, same as no list.
    pub fn symbol_allow_list(&self) -> Option<&BTreeSet<Symbol>> {
        self.symbols.as_ref().filter(|set| !set.is_empty())
    }
}

/// Candle bucketing rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CandleConfig {
    pub timeframes: Vec<Timeframe>,
    /// Venue zone used to align bucket boundaries.
    pub timezone: Tz,
}

impl Default for CandleConfig {
    fn default() -> Self {
        Self {
            timeframes: Timeframe::all().to_vec(),
            timezone: chrono_tz::Australia::Sydney,
        }
    }
}

/// Top-level configuration for one analysis run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub classifier: ClassifierConfig,
    pub filters: FilterConfig,
    pub candles: CandleConfig,
    /// Substring marking a connector dropping-message notice.
    pub dropping_marker: String,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            classifier: ClassifierConfig::default(),
            filters: FilterConfig::default(),
            candles: CandleConfig::default(),
            dropping_marker: "dropping message".to_string(),
        }
    }
}

impl AnalyzerConfig {
    /// Parse a JSON config document and validate it.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let mut config: AnalyzerConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))?;
        if config.filters.symbol_allow_list().is_none() {
            config.filters.symbols = None;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.classifier.keywords.is_empty() {
            return Err(ConfigError::EmptyKeywords);
        }
        if self.candles.timeframes.is_empty() {
            return Err(ConfigError::EmptyTimeframes);
        }
        if let Some(range) = self.filters.time_range {
            if range.start_micros > range.end_micros {
                return Err(ConfigError::InvertedTimeRange {
                    start: range.start_micros,
                    end: range.end_micros,
                });
            }
        }
        Ok(())
    }

    pub fn with_only_executed(mut self, only_executed: bool) -> Self {
        self.filters.only_executed = only_executed;
        self
    }

    pub fn with_symbols<I>(mut self, symbols: I) -> Self
    where
        I: IntoIterator<Item = Symbol>,
    {
        let set: BTreeSet<Symbol> = symbols.into_iter().collect();
        self.filters.symbols = if set.is_empty() { None } else { Some(set) };
        self
    }

    pub fn with_time_range(mut self, start_micros: i64, end_micros: i64) -> Self {
        self.filters.time_range = Some(TimeRange::new(start_micros, end_micros));
        self
    }

    pub fn with_target_price(mut self, price: Price) -> Self {
        self.filters.target_price = Some(price);
        self
    }

    pub fn with_timeframes(mut self, timeframes: Vec<Timeframe>) -> Self {
        self.candles.timeframes = timeframes;
        self
    }

    pub fn with_timezone(mut self, timezone: Tz) -> Self {
        self.candles.timezone = timezone;
        self
    }

    /// Set the venue zone from an IANA name such as `Australia/Sydney`.
    pub fn with_timezone_name(self, name: &str) -> Result<Self, ConfigError> {
        let tz: Tz = name
            .parse()
            .map_err(|_| ConfigError::UnknownTimezone(name.to_string()))?;
        Ok(self.with_timezone(tz))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = AnalyzerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.classifier.caller_tag, "message_handler");
        assert_eq!(config.classifier.keywords.len(), 7);
        assert_eq!(config.candles.timezone, chrono_tz::Australia::Sydney);
        assert!(config.filters.is_empty());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = AnalyzerConfig::from_json_str(
            r#"{"filters": {"only_executed": true}, "candles": {"timezone": "UTC"}}"#,
        )
        .unwrap();
        assert!(config.filters.only_executed);
        assert_eq!(config.candles.timezone, chrono_tz::UTC);
        assert_eq!(config.candles.timeframes, Timeframe::all().to_vec());
        assert_eq!(config.dropping_marker, "dropping message");
    }

    #[test]
    fn test_inverted_time_range_rejected() {
        let config = AnalyzerConfig::default().with_time_range(10, 5);
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvertedTimeRange { start: 10, end: 5 })
        );
    }

    #[test]
    fn test_empty_timeframes_rejected() {
        let config = AnalyzerConfig::default().with_timeframes(vec![]);
        assert_eq!(config.validate(), Err(ConfigError::EmptyTimeframes));
    }

    #[test]
    fn test_unknown_timezone() {
        let err = AnalyzerConfig::default()
            .with_timezone_name("Mars/Olympus")
            .unwrap_err();
        assert_eq!(err, ConfigError::UnknownTimezone("Mars/Olympus".to_string()));
    }

    #[test]
    fn test_time_range_is_inclusive() {
        let range = TimeRange::new(100, 200);
        assert!(range.contains(100));
        assert!(range.contains(200));
        assert!(!range.contains(201));
    }

    #[test]
    fn test_with_symbols_empty_means_all() {
        let config = AnalyzerConfig::default().with_symbols(Vec::new());
        assert!(config.filters.symbols.is_none());
    }

    #[test]
    fn test_empty_symbol_list_in_json_means_all() {
        let config =
            AnalyzerConfig::from_json_str(r#"{"filters": {"symbols": []}}"#).unwrap();
        assert!(config.filters.symbols.is_none());
        assert!(config.filters.is_empty());

        let direct = FilterConfig {
            symbols: Some(BTreeSet::new()),
            ..FilterConfig::default()
        };
        assert!(direct.symbol_allow_list().is_none());
    }
}
