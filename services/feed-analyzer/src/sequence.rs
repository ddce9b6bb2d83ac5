//! Header sequence continuity checker
//!
//! Every feed packet header carries an `HdrSequence` that should increase by
//! exactly one. The checker sorts the header-carrying events by sequence and
//! reports each adjacent pair that does not step by one. It reads the parsed
//! events only and shares nothing with the order tracker.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::TimeRange;
use crate::events::Event;

/// One break in the sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceGap {
    /// Position of the offending record in the sorted list.
    pub index: usize,
    pub previous_sequence: i64,
    pub current_sequence: i64,
    pub expected_sequence: i64,
    /// `current - previous`; 0 for duplicates, above 1 for missing packets.
    pub gap: i64,
}

/// Outcome of a sequence check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceValidationResult {
    pub valid: bool,
    pub total_logs: usize,
    pub errors: Vec<SequenceGap>,
}

impl SequenceValidationResult {
    pub fn gap_count(&self) -> usize {
        self.errors.len()
    }
}

/// Check that sorted sequence numbers step by exactly one.
pub fn validate_sequence_increments(sequences: &[i64]) -> SequenceValidationResult {
    let mut errors = Vec::new();

    for (index, pair) in sequences.windows(2).enumerate() {
        let (previous, current) = (pair[0], pair[1]);
        let expected = previous.saturating_add(1);
        if current != expected {
            let gap = current.saturating_sub(previous);
            warn!(
                index = index + 1,
                expected = expected,
                actual = current,
                gap = gap,
                "Header sequence gap"
            );
            errors.push(SequenceGap {
                index: index + 1,
                previous_sequence: previous,
                current_sequence: current,
                expected_sequence: expected,
                gap,
            });
        }
    }

    SequenceValidationResult {
        valid: errors.is_empty(),
        total_logs: sequences.len(),
        errors,
    }
}

/// Sequence checker over parsed events.
#[derive(Debug, Clone, Default)]
pub struct SequenceChecker {
    /// Optional window on the embedded venue `Timestamp`, applied after sorting.
    time_range: Option<TimeRange>,
}

impl SequenceChecker {
    pub fn new(time_range: Option<TimeRange>) -> Self {
        Self { time_range }
    }

    pub fn check(&self, events: &[Event]) -> SequenceValidationResult {
        let mut headers: Vec<&Event> = events
            .iter()
            .filter(|e| e.carries_header_sequence())
            .collect();
        headers.sort_by_key(|e| e.header_sequence());

        if let Some(range) = self.time_range {
            headers.retain(|e| {
                e.venue_timestamp_micros()
                    .is_some_and(|micros| range.contains(micros))
            });
        }

        let sequences: Vec<i64> = headers.iter().map(|e| e.header_sequence()).collect();
        let result = validate_sequence_increments(&sequences);
        info!(
            total = result.total_logs,
            gaps = result.gap_count(),
            valid = result.valid,
            "Sequence validation complete"
        );
        result
    }
}
