//! Analysis pipeline
//!
//! Wires the stages together for one batch of records:
//!
//! 1. count dropping-message notices
//! 2. parse every record (parallel, order kept)
//! 3. run the sequence checker alongside tracker → filters → executed
//!    view → candles
//! 4. assemble the report, with a checksum over the candle output
//!
//! The same input always yields the same report apart from `run_id`.

use std::collections::BTreeMap;

use feed_types::ids::Symbol;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, warn};
use uuid::Uuid;

use crate::candles::{aggregate_candles, CandleSet};
use crate::config::{AnalyzerConfig, ConfigError, TimeRange};
use crate::events::{Event, RawRecord};
use crate::filters::apply_filters;
use crate::parser::{parse_record, parse_time};
use crate::sequence::{SequenceChecker, SequenceValidationResult};
use crate::tracker::{track_orders, OrderGroups};
use crate::views::{executed_by_symbol, quote_views};

/// Errors that stop a run before any output is produced.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnalysisError {
    #[error("no records to analyze")]
    NoData,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub records_seen: usize,
    pub events_parsed: usize,
    /// Records discarded by caller tag or noise marker.
    pub noise_filtered: usize,
    /// Parse failures keyed by error label.
    pub parse_failures: BTreeMap<String, usize>,
    pub orphan_events: usize,
    pub derivation_failures: usize,
    pub dropping_messages: usize,
    pub orders_tracked: usize,
    pub orders_selected: usize,
    pub executed_trades: usize,
    pub candles: usize,
}

impl PipelineStats {
    pub fn parse_failure_total(&self) -> usize {
        self.parse_failures.values().sum()
    }
}

/// Everything one run produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub run_id: Uuid,
    pub orders: OrderGroups,
    pub executed: BTreeMap<Symbol, Vec<Event>>,
    pub candles: CandleSet,
    pub quote_views: BTreeMap<Symbol, Vec<Event>>,
    pub sequence: SequenceValidationResult,
    pub stats: PipelineStats,
    /// SHA-256 over the candle output, hex encoded.
    pub candle_checksum: String,
}

/// Parsed events plus the bookkeeping from parsing them.
#[derive(Debug, Clone, Default)]
pub struct ParsedBatch {
    pub events: Vec<Event>,
    pub noise_filtered: usize,
    pub parse_failures: BTreeMap<String, usize>,
}

/// Runs the full analysis over a batch of records.
#[derive(Debug, Clone, Default)]
pub struct Analyzer {
    config: AnalyzerConfig,
}

impl Analyzer {
    pub fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Parse every record, in parallel, keeping input order.
    pub fn parse(&self, records: &[RawRecord]) -> ParsedBatch {
        let results: Vec<_> = records
            .par_iter()
            .map(|record| parse_record(record, &self.config.classifier))
            .collect();

        let mut batch = ParsedBatch::default();
        for result in results {
            match result {
                Ok(Some(event)) => batch.events.push(event),
                Ok(None) => batch.noise_filtered += 1,
                Err(e) => *batch.parse_failures.entry(e.label().to_string()).or_default() += 1,
            }
        }
        info!(
            records = records.len(),
            events = batch.events.len(),
            noise = batch.noise_filtered,
            failures = batch.parse_failures.values().sum::<usize>(),
            "Parsing complete"
        );
        batch
    }

    /// Run only the header sequence check.
    pub fn check_sequence(
        &self,
        records: &[RawRecord],
    ) -> Result<SequenceValidationResult, AnalysisError> {
        self.config.validate()?;
        if records.is_empty() {
            return Err(AnalysisError::NoData);
        }
        let batch = self.parse(records);
        Ok(self.checker().check(&batch.events))
    }

    /// Run the full pipeline.
    pub fn run(&self, records: &[RawRecord]) -> Result<AnalysisReport, AnalysisError> {
        self.config.validate()?;
        if records.is_empty() {
            warn!("No records to analyze");
            return Err(AnalysisError::NoData);
        }
        info!(records = records.len(), "Starting analysis");

        let dropping_messages = count_dropping_messages(records, &self.config.dropping_marker);
        let batch = self.parse(records);
        let events = &batch.events;

        let checker = self.checker();
        let (sequence, (tracked, orders, executed, candles)) = rayon::join(
            || checker.check(events),
            || {
                let tracked = track_orders(events);
                let orders = apply_filters(tracked.groups.clone(), &self.config.filters);
                let executed = executed_by_symbol(&orders);
                let candles = aggregate_candles(&executed, &self.config.candles);
                (tracked, orders, executed, candles)
            },
        );

        let mut quotes = quote_views(events);
        if let Some(symbols) = self.config.filters.symbol_allow_list() {
            quotes.retain(|symbol, _| symbols.contains(symbol));
        }

        let stats = PipelineStats {
            records_seen: records.len(),
            events_parsed: events.len(),
            noise_filtered: batch.noise_filtered,
            parse_failures: batch.parse_failures.clone(),
            orphan_events: tracked.orphans,
            derivation_failures: tracked.derivation_failures,
            dropping_messages,
            orders_tracked: tracked.order_count(),
            orders_selected: orders.values().map(BTreeMap::len).sum(),
            executed_trades: executed.values().map(Vec::len).sum(),
            candles: candles
                .values()
                .flat_map(|per_tf| per_tf.values())
                .map(Vec::len)
                .sum(),
        };
        let candle_checksum = candle_checksum(&candles);

        info!(
            orders = stats.orders_selected,
            trades = stats.executed_trades,
            candles = stats.candles,
            sequence_valid = sequence.valid,
            checksum = %candle_checksum,
            "Analysis complete"
        );

        Ok(AnalysisReport {
            run_id: Uuid::now_v7(),
            orders,
            executed,
            candles,
            quote_views: quotes,
            sequence,
            stats,
            candle_checksum,
        })
    }

    fn checker(&self) -> SequenceChecker {
        SequenceChecker::new(self.config.filters.time_range)
    }
}

/// Count connector notices about dropped messages.
///
/// Looks at every record regardless of caller.
pub fn count_dropping_messages(records: &[RawRecord], marker: &str) -> usize {
    records
        .par_iter()
        .filter(|r| r.message.contains(marker))
        .count()
}

/// Count dropping-message notices whose record time falls inside `range`
/// (Unix microseconds, inclusive). Records with an unreadable time are not
/// counted.
pub fn count_dropping_messages_in(
    records: &[RawRecord],
    marker: &str,
    range: TimeRange,
) -> usize {
    records
        .par_iter()
        .filter(|r| r.message.contains(marker))
        .filter(|r| {
            parse_time(&r.time)
                .map(|nanos| range.contains(nanos.div_euclid(1_000)))
                .unwrap_or(false)
        })
        .count()
}

/// Deterministic hash of a candle set.
pub fn candle_checksum(candles: &CandleSet) -> String {
    let mut hasher = Sha256::new();

    for (symbol, per_tf) in candles {
        hasher.update(symbol.as_str().as_bytes());
        hasher.update(b"|");

        for (timeframe, list) in per_tf {
            hasher.update(timeframe.label().as_bytes());
            hasher.update(b":");
            for candle in list {
                hasher.update(candle.start_time.timestamp().to_string().as_bytes());
                hasher.update(b",");
                hasher.update(candle.open.to_string().as_bytes());
                hasher.update(b",");
                hasher.update(candle.high.to_string().as_bytes());
                hasher.update(b",");
                hasher.update(candle.low.to_string().as_bytes());
                hasher.update(b",");
                hasher.update(candle.close.to_string().as_bytes());
                hasher.update(b",");
                hasher.update(candle.volume.to_string().as_bytes());
                hasher.update(b";");
            }
        }
        hasher.update(b"===");
    }

    format!("{:x}", hasher.finalize())
}
