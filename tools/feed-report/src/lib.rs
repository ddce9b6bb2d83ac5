//! Feed Report
//!
//! File-system collaborators around the feed analyzer: a loader for
//! connector log directories and a JSON exporter for analysis results.
//! The `feed-report` binary wires them to the analyzer.

pub mod export;
pub mod loader;

pub const VERSION: &str = "1.0.0";
