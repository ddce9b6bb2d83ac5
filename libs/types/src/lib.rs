//! Types library for feed connector log analysis
//!
//! Value types shared by the analyzer service and the reporting tool.
//! Every identifier read out of a log line stays a string; prices are exact
//! decimals and quantities are whole share counts.
//!
//! # Modules
//! - `ids`: Identifiers (OrderId, Symbol)
//! - `numeric`: Price and Quantity parsing
//! - `errors`: Field-level error taxonomy

pub mod errors;
pub mod ids;
pub mod numeric;

