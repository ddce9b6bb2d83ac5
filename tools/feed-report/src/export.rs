//! Report export
//!
//! Serializes each result shape of an analysis run to its own pretty-printed
//! JSON file, all sharing one `YYYYmmdd_HHMMSS` stamp.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use feed_analyzer::pipeline::PipelineStats;
use feed_analyzer::sequence::SequenceValidationResult;
use feed_analyzer::AnalysisReport;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO error writing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Run-level summary written next to the detailed files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSummary {
    pub version: String,
    /// Hyphenated UUID v7 of the run.
    pub run_id: String,
    pub stats: PipelineStats,
    pub candle_checksum: String,
    pub sequence_valid: bool,
    pub sequence_gaps: usize,
}

impl ReportSummary {
    pub fn from_report(report: &AnalysisReport) -> Self {
        Self {
            version: crate::VERSION.to_string(),
            run_id: report.run_id.to_string(),
            stats: report.stats.clone(),
            candle_checksum: report.candle_checksum.clone(),
            sequence_valid: report.sequence.valid,
            sequence_gaps: report.sequence.gap_count(),
        }
    }
}

/// Local-time stamp used in export file names.
pub fn file_stamp() -> String {
    chrono::Local::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Write one value as pretty JSON to `dir/<prefix>_<stamp>.json`.
pub fn write_json<T: Serialize>(
    dir: &Path,
    prefix: &str,
    stamp: &str,
    value: &T,
) -> Result<PathBuf, ExportError> {
    let path = dir.join(format!("{}_{}.json", prefix, stamp));
    let json = serde_json::to_string_pretty(value)?;
    fs::write(&path, json).map_err(|source| ExportError::Io {
        path: path.clone(),
        source,
    })?;
    info!(file = %path.display(), "Exported");
    Ok(path)
}

/// Write every part of a report. Returns the files written.
pub fn write_report(
    report: &AnalysisReport,
    dir: &Path,
    stamp: &str,
) -> Result<Vec<PathBuf>, ExportError> {
    fs::create_dir_all(dir).map_err(|source| ExportError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let files = vec![
        write_json(dir, "grouped_by_symbol_and_order_id", stamp, &report.orders)?,
        write_json(dir, "all_executed_message_by_symbol", stamp, &report.executed)?,
        write_json(dir, "candlestick_data", stamp, &report.candles)?,
        write_json(dir, "sequence_validation", stamp, &report.sequence)?,
        write_json(dir, "quote_views", stamp, &report.quote_views)?,
        write_json(dir, "summary", stamp, &ReportSummary::from_report(report))?,
    ];
    Ok(files)
}

/// Write a standalone sequence check result.
pub fn write_sequence(
    result: &SequenceValidationResult,
    dir: &Path,
    stamp: &str,
) -> Result<PathBuf, ExportError> {
    fs::create_dir_all(dir).map_err(|source| ExportError::Io {
        path: dir.to_path_buf(),
        source,
    })?;
    write_json(dir, "sequence_validation", stamp, result)
}
