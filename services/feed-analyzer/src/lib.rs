//! Feed Analyzer
//!
//! Decodes the message dumps a market-data feed connector writes to its
//! application log and produces:
//! - Typed events from loosely structured log records
//! - Per-order event histories with inherited price, side and remaining size
//! - Header sequence continuity reports
//! - OHLC candles per symbol and timeframe, aligned in the venue's time zone
//!
//! The crate has no file-system dependency; records come in as
//! `RawRecord`s and results go out as serializable values.
//!
//! # Architecture
//!
//! ```text
//!        RawRecords
//!            │
//!       ┌────▼────┐
//!       │ Parser  │  ← noise filter, kind, field block, time
//!       └────┬────┘
//!            │ Events
//!    ┌───────┴────────┐
//!    │                │
//! ┌──▼──────┐   ┌─────▼────┐
//! │Sequence │   │ Tracker  │  ← group by OrderID, replay, enrich
//! │Checker  │   └─────┬────┘
//! └──┬──────┘         │
//!    │          ┌─────▼────┐
//!    │          │ Filters  │
//!    │          └─────┬────┘
//!    │          ┌─────▼────┐
//!    │          │ Candles  │  ← executed trades → OHLC
//!    │          └─────┬────┘
//! ┌──▼────────────────▼──┐
//! │    AnalysisReport    │
//! └──────────────────────┘
//! ```

pub mod candles;
pub mod config;
pub mod events;
pub mod filters;
pub mod parser;
pub mod pipeline;
pub mod sequence;
pub mod tracker;
pub mod views;

pub use config::AnalyzerConfig;
pub use events::{Event, MessageKind, RawRecord};
pub use pipeline::{AnalysisError, AnalysisReport, Analyzer, PipelineStats};

// Library version
pub const SERVICE_VERSION: &str = "0.1.0";
