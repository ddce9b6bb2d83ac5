//! Feed connector log report tool
//!
//! Usage:
//!   feed-report analyze --input ./today --output ./reports --symbol BHP --only-executed
//!   feed-report sequence --input ./today --start-micros 1747106717235000 --end-micros 1747106717239000
//!   feed-report drops --input ./today --start-micros 1747109398000000 --end-micros 1747109399000000

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use feed_analyzer::config::TimeRange;
use feed_analyzer::pipeline::{count_dropping_messages, count_dropping_messages_in};
use feed_analyzer::{Analyzer, AnalyzerConfig};
use feed_report::export::{file_stamp, write_report, write_sequence};
use feed_report::loader::load_dir;
use feed_types::ids::Symbol;
use feed_types::numeric::Price;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Number of sequence gaps printed in the console summary.
const GAP_PREVIEW: usize = 10;

/// Feed connector log analyzer
#[derive(Parser, Debug)]
#[command(name = "feed-report")]
#[command(about = "Reconstruct orders, candles and sequence reports from feed connector logs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the full analysis and export JSON reports
    Analyze {
        /// Directory holding the `.log` files
        #[arg(short, long)]
        input: PathBuf,

        /// Directory the reports are written to
        #[arg(short, long, default_value = ".")]
        output: PathBuf,

        #[command(flatten)]
        overrides: ConfigArgs,
    },

    /// Check header sequence continuity only
    Sequence {
        #[arg(short, long)]
        input: PathBuf,

        /// Also write the result as JSON into this directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        range: RangeArgs,
    },

    /// Count dropping-message notices, optionally within a record time window
    Drops {
        #[arg(short, long)]
        input: PathBuf,

        #[command(flatten)]
        range: RangeArgs,
    },
}

#[derive(clap::Args, Debug, Default)]
struct RangeArgs {
    /// Start of the time window, Unix microseconds (inclusive)
    #[arg(long, requires = "end_micros")]
    start_micros: Option<i64>,

    /// End of the time window, Unix microseconds (inclusive)
    #[arg(long, requires = "start_micros")]
    end_micros: Option<i64>,
}

impl RangeArgs {
    fn to_time_range(&self) -> Result<Option<TimeRange>> {
        match (self.start_micros, self.end_micros) {
            (Some(start), Some(end)) if start > end => {
                bail!("Invalid time window: start {} is after end {}", start, end)
            }
            (Some(start), Some(end)) => Ok(Some(TimeRange::new(start, end))),
            _ => Ok(None),
        }
    }
}

#[derive(clap::Args, Debug, Default)]
struct ConfigArgs {
    /// JSON config file; flags below override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Keep only these symbols (repeatable)
    #[arg(short, long = "symbol")]
    symbols: Vec<String>,

    #[command(flatten)]
    range: RangeArgs,

    /// Keep only orders with an event at exactly this price
    #[arg(long)]
    target_price: Option<String>,

    /// Keep only orders with at least one execution
    #[arg(long)]
    only_executed: bool,

    /// IANA venue time zone for candle alignment
    #[arg(long)]
    timezone: Option<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Analyze {
            input,
            output,
            overrides,
        } => analyze(&input, &output, &overrides),
        Commands::Sequence {
            input,
            output,
            range,
        } => sequence(&input, output.as_deref(), &range),
        Commands::Drops { input, range } => drops(&input, &range),
    }
}

fn analyze(input: &Path, output: &Path, args: &ConfigArgs) -> Result<()> {
    let config = build_config(args)?;
    let loaded = load_dir(input).with_context(|| format!("Failed to load logs from {:?}", input))?;

    let report = Analyzer::new(config)
        .run(&loaded.records)
        .context("Analysis failed")?;

    let stamp = file_stamp();
    let files = write_report(&report, output, &stamp)
        .with_context(|| format!("Failed to write reports to {:?}", output))?;

    println!("Run {}", report.run_id);
    println!(
        "  records: {}  events: {}  noise: {}  parse failures: {}",
        report.stats.records_seen,
        report.stats.events_parsed,
        report.stats.noise_filtered,
        report.stats.parse_failure_total()
    );
    println!(
        "  orders: {} (of {})  trades: {}  candles: {}  orphans: {}",
        report.stats.orders_selected,
        report.stats.orders_tracked,
        report.stats.executed_trades,
        report.stats.candles,
        report.stats.orphan_events
    );
    println!("  candle checksum: {}", report.candle_checksum);
    for file in &files {
        println!("  wrote {}", file.display());
    }
    Ok(())
}

fn sequence(input: &Path, output: Option<&Path>, range: &RangeArgs) -> Result<()> {
    let mut config = AnalyzerConfig::default();
    if let (Some(start), Some(end)) = (range.start_micros, range.end_micros) {
        config = config.with_time_range(start, end);
    }

    let loaded = load_dir(input).with_context(|| format!("Failed to load logs from {:?}", input))?;
    let result = Analyzer::new(config)
        .check_sequence(&loaded.records)
        .context("Sequence check failed")?;

    if result.valid {
        println!(
            "All {} sequences are valid and increment by exactly 1",
            result.total_logs
        );
    } else {
        println!(
            "Found {} sequence errors out of {} logs",
            result.gap_count(),
            result.total_logs
        );
        for gap in result.errors.iter().take(GAP_PREVIEW) {
            println!(
                "  index {}: expected {}, got {} (gap: {})",
                gap.index, gap.expected_sequence, gap.current_sequence, gap.gap
            );
        }
        if result.gap_count() > GAP_PREVIEW {
            println!("  ... {} more", result.gap_count() - GAP_PREVIEW);
        }
    }

    if let Some(dir) = output {
        let path = write_sequence(&result, dir, &file_stamp())
            .with_context(|| format!("Failed to write sequence report to {:?}", dir))?;
        println!("Wrote {}", path.display());
    }
    Ok(())
}

fn drops(input: &Path, range: &RangeArgs) -> Result<()> {
    let window = range.to_time_range()?;
    let loaded = load_dir(input).with_context(|| format!("Failed to load logs from {:?}", input))?;
    let marker = AnalyzerConfig::default().dropping_marker;
    let count = match window {
        Some(window) => {
            info!(
                start = window.start_micros,
                end = window.end_micros,
                "Counting dropping messages within time window"
            );
            count_dropping_messages_in(&loaded.records, &marker, window)
        }
        None => count_dropping_messages(&loaded.records, &marker),
    };
    if count > 0 {
        warn!(count = count, "Dropping-message notices found");
    } else {
        info!("No dropping-message notices");
    }
    println!("Total dropping-message logs: {}", count);
    Ok(())
}

/// Config file first, then command-line overrides.
fn build_config(args: &ConfigArgs) -> Result<AnalyzerConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {:?}", path))?;
            AnalyzerConfig::from_json_str(&raw)
                .with_context(|| format!("Invalid config {:?}", path))?
        }
        None => AnalyzerConfig::default(),
    };

    if args.only_executed {
        config = config.with_only_executed(true);
    }
    if !args.symbols.is_empty() {
        config = config.with_symbols(args.symbols.iter().map(|s| Symbol::new(s.trim())));
    }
    if let (Some(start), Some(end)) = (args.range.start_micros, args.range.end_micros) {
        config = config.with_time_range(start, end);
    }
    if let Some(raw) = &args.target_price {
        let price = Price::parse("target-price", raw)?;
        config = config.with_target_price(price);
    }
    if let Some(tz) = &args.timezone {
        config = config.with_timezone_name(tz)?;
    }

    if config.filters.target_price.is_some() && config.filters.time_range.is_none() {
        warn!("Target price filter applied without a time range");
    }
    if let Err(e) = config.validate() {
        bail!("Invalid configuration: {}", e);
    }
    Ok(config)
}
