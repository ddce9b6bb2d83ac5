//! OHLC Candle Builder
//!
//! Folds executed trades into open/high/low/close candles per symbol and
//! timeframe. Buckets are aligned in the venue's local time zone, so a daily
//! candle starts at local midnight and keeps doing so across DST changes.
//!
//! Containment is decided purely by the trade timestamp against the live
//! candle's `end_time`: a trade at or past the end opens a new candle, any
//! earlier trade (including a late arrival) updates the live one. Closed
//! candles are never amended.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, Offset, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use rayon::prelude::*;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use feed_types::ids::Symbol;

use crate::config::CandleConfig;
use crate::events::{field, Event};

/// Candles per symbol, then per timeframe, each list in time order.
pub type CandleSet = BTreeMap<Symbol, BTreeMap<Timeframe, Vec<Candle>>>;

/// Supported candle timeframes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    /// 1 minute
    #[serde(rename = "1m")]
    M1,
    /// 1 hour
    #[serde(rename = "1h")]
    H1,
    /// 1 day
    #[serde(rename = "1d")]
    D1,
}

impl Timeframe {
    /// All supported timeframes.
    pub fn all() -> &'static [Timeframe] {
        &[Timeframe::M1, Timeframe::H1, Timeframe::D1]
    }

    pub fn label(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::H1 => "1h",
            Timeframe::D1 => "1d",
        }
    }

    /// Absolute length of one candle.
    pub fn duration(&self) -> Duration {
        match self {
            Timeframe::M1 => Duration::minutes(1),
            Timeframe::H1 => Duration::hours(1),
            Timeframe::D1 => Duration::days(1),
        }
    }

    /// Start of the bucket containing `at`, aligned in `tz` local time.
    ///
    /// An ambiguous local start (DST fall-back) resolves to the latest
    /// candidate not after `at`. A local start that does not exist (DST
    /// spring-forward) is read with the offset in force at `at`. Candles have
    /// a fixed absolute length, so on a long local day the start is stepped
    /// forward until `start <= at < start + duration` holds.
    pub fn bucket_start(&self, at: DateTime<Utc>, tz: &Tz) -> DateTime<Utc> {
        let local = at.with_timezone(tz);
        let naive = local.naive_local();
        let Some(truncated) = self.truncate(naive) else {
            return at;
        };

        let candidate = match tz.from_local_datetime(&truncated) {
            LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
            LocalResult::Ambiguous(early, late) => {
                let late = late.with_timezone(&Utc);
                if late <= at {
                    Some(late)
                } else {
                    Some(early.with_timezone(&Utc))
                }
            }
            LocalResult::None => local
                .offset()
                .fix()
                .from_local_datetime(&truncated)
                .single()
                .map(|dt| dt.with_timezone(&Utc)),
        };
        let step = self.duration();
        let mut start = candidate.unwrap_or(at);
        while start + step <= at {
            start += step;
        }
        start
    }

    fn truncate(&self, naive: NaiveDateTime) -> Option<NaiveDateTime> {
        let date = naive.date();
        match self {
            Timeframe::M1 => date.and_hms_opt(naive.hour(), naive.minute(), 0),
            Timeframe::H1 => date.and_hms_opt(naive.hour(), 0, 0),
            Timeframe::D1 => date.and_hms_opt(0, 0, 0),
        }
    }
}

/// Serialize candle instants as `YYYY-MM-DDTHH:MM:SSZ`.
mod utc_seconds {
    use chrono::{DateTime, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

    pub fn serialize<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        NaiveDateTime::parse_from_str(&raw, FORMAT)
            .map(|naive| naive.and_utc())
            .map_err(serde::de::Error::custom)
    }
}

/// A single OHLC candle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    pub symbol: Symbol,
    pub timeframe: Timeframe,
    #[serde(with = "utc_seconds")]
    pub start_time: DateTime<Utc>,
    #[serde(with = "utc_seconds")]
    pub end_time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    /// Sum of executed quantities.
    pub volume: i64,
    pub trade_count: u64,
}

impl Candle {
    /// Open a candle with its first trade.
    fn new(
        symbol: Symbol,
        timeframe: Timeframe,
        start_time: DateTime<Utc>,
        price: Decimal,
        volume: i64,
    ) -> Self {
        Self {
            symbol,
            timeframe,
            start_time,
            end_time: start_time + timeframe.duration(),
            open: price,
            high: price,
            low: price,
            close: price,
            volume,
            trade_count: 1,
        }
    }

    /// Update the candle with a new trade.
    fn update(&mut self, price: Decimal, volume: i64) {
        if price > self.high {
            self.high = price;
        }
        if price < self.low {
            self.low = price;
        }
        self.close = price;
        self.volume = self.volume.saturating_add(volume);
        self.trade_count += 1;
    }

    /// Validate candle integrity (OHLC invariants).
    pub fn is_valid(&self) -> bool {
        self.high >= self.open
            && self.high >= self.close
            && self.high >= self.low
            && self.low <= self.open
            && self.low <= self.close
            && self.end_time > self.start_time
            && self.end_time - self.start_time == self.timeframe.duration()
    }
}

/// Builds candles for a single timeframe on a single symbol.
pub struct CandleBuilder {
    timeframe: Timeframe,
    symbol: Symbol,
    timezone: Tz,
    /// Currently building candle (not yet closed).
    current: Option<Candle>,
    /// Closed candles in the order they were closed.
    closed: Vec<Candle>,
}

impl CandleBuilder {
    pub fn new(timeframe: Timeframe, symbol: Symbol, timezone: Tz) -> Self {
        Self {
            timeframe,
            symbol,
            timezone,
            current: None,
            closed: Vec::new(),
        }
    }

    /// Process a trade at `timestamp` (Unix nanoseconds).
    ///
    /// Returns the candle closed by this trade, if any.
    pub fn process_trade(&mut self, price: Decimal, volume: i64, timestamp: i64) -> Option<Candle> {
        let at = Utc.timestamp_nanos(timestamp);

        if let Some(current) = self.current.as_mut() {
            if at < current.end_time {
                current.update(price, volume);
                return None;
            }
        }

        let start = self.timeframe.bucket_start(at, &self.timezone);
        let fresh = Candle::new(self.symbol.clone(), self.timeframe, start, price, volume);
        let closed = self.current.replace(fresh);
        if let Some(candle) = &closed {
            self.closed.push(candle.clone());
        }
        closed
    }

    /// Get the current (unclosed) candle.
    pub fn current_candle(&self) -> Option<&Candle> {
        self.current.as_ref()
    }

    /// All candles, closed and live, in time order.
    pub fn into_candles(mut self) -> Vec<Candle> {
        if let Some(current) = self.current.take() {
            self.closed.push(current);
        }
        self.closed
    }
}

/// Manages candle builders across the configured timeframes for one symbol.
pub struct MultiTimeframeCandleManager {
    builders: BTreeMap<Timeframe, CandleBuilder>,
}

impl MultiTimeframeCandleManager {
    pub fn new(symbol: Symbol, config: &CandleConfig) -> Self {
        let mut builders = BTreeMap::new();
        for &tf in &config.timeframes {
            builders.insert(tf, CandleBuilder::new(tf, symbol.clone(), config.timezone));
        }
        Self { builders }
    }

    /// Process a trade across all timeframes.
    ///
    /// Returns closed candles (if any) from each timeframe.
    pub fn process_trade(&mut self, price: Decimal, volume: i64, timestamp: i64) -> Vec<Candle> {
        self.builders
            .values_mut()
            .filter_map(|builder| builder.process_trade(price, volume, timestamp))
            .collect()
    }

    pub fn into_candles(self) -> BTreeMap<Timeframe, Vec<Candle>> {
        self.builders
            .into_iter()
            .map(|(tf, builder)| (tf, builder.into_candles()))
            .collect()
    }
}

/// Build candles for one symbol from its time-ordered executed trades.
///
/// Trades without a usable `Price` are skipped; an unusable `ExecutedQty`
/// contributes zero volume.
pub fn build_symbol_candles(
    symbol: &Symbol,
    trades: &[Event],
    config: &CandleConfig,
) -> BTreeMap<Timeframe, Vec<Candle>> {
    let mut manager = MultiTimeframeCandleManager::new(symbol.clone(), config);

    for trade in trades {
        let price = match trade.price() {
            Ok(price) => price.as_decimal(),
            Err(e) => {
                warn!(symbol = %symbol, time = %trade.time, error = %e, "Skipping trade without usable price");
                continue;
            }
        };
        let volume = trade
            .quantity(field::EXECUTED_QTY)
            .map(|q| q.value())
            .unwrap_or(0);

        let closed = manager.process_trade(price, volume, trade.timestamp);
        for candle in &closed {
            debug!(
                symbol = %symbol,
                timeframe = candle.timeframe.label(),
                start = %candle.start_time,
                "Candle closed"
            );
        }
    }

    manager.into_candles()
}

/// Aggregate executed trades for every symbol, symbols in parallel.
pub fn aggregate_candles(
    executed: &BTreeMap<Symbol, Vec<Event>>,
    config: &CandleConfig,
) -> CandleSet {
    let set: CandleSet = executed
        .par_iter()
        .map(|(symbol, trades)| (symbol.clone(), build_symbol_candles(symbol, trades, config)))
        .collect();

    let total: usize = set
        .values()
        .flat_map(|per_tf| per_tf.values())
        .map(Vec::len)
        .sum();
    info!(symbols = set.len(), candles = total, "Candle aggregation complete");
    set
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;
    use std::str::FromStr;

    fn sydney() -> Tz {
        chrono_tz::Australia::Sydney
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(y, mo, d)
            .unwrap()
            .and_hms_opt(h, mi, s)
            .unwrap()
            .and_utc()
    }

    fn nanos(at: DateTime<Utc>) -> i64 {
        at.timestamp_nanos_opt().unwrap()
    }

    fn trade(price: &str, qty: &str, at: DateTime<Utc>) -> Event {
        let fields = [("Price", price), ("ExecutedQty", qty), ("Symbol", "BHP")]
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Event::new(
            crate::events::MessageKind::OrderExecuted,
            nanos(at),
            at.to_rfc3339(),
            fields,
        )
    }

    #[test]
    fn test_timeframe_duration() {
        assert_eq!(Timeframe::M1.duration(), Duration::seconds(60));
        assert_eq!(Timeframe::H1.duration(), Duration::seconds(3600));
        assert_eq!(Timeframe::D1.duration(), Duration::seconds(86_400));
    }

    #[test]
    fn test_daily_bucket_is_local_midnight() {
        // 2025-02-14 10:15 AEDT (+11) == 2025-02-13 23:15 UTC.
        let at = utc(2025, 2, 13, 23, 15, 0);
        let start = Timeframe::D1.bucket_start(at, &sydney());
        // Local midnight 2025-02-14 AEDT == 2025-02-13 13:00 UTC.
        assert_eq!(start, utc(2025, 2, 13, 13, 0, 0));
    }

    #[test]
    fn test_daily_bucket_in_standard_time() {
        // July: AEST (+10).
        let at = utc(2025, 7, 1, 2, 0, 0);
        let start = Timeframe::D1.bucket_start(at, &sydney());
        assert_eq!(start, utc(2025, 6, 30, 14, 0, 0));
    }

    #[test]
    fn test_minute_and_hour_buckets() {
        let at = utc(2025, 2, 13, 23, 15, 42);
        assert_eq!(
            Timeframe::M1.bucket_start(at, &sydney()),
            utc(2025, 2, 13, 23, 15, 0)
        );
        assert_eq!(
            Timeframe::H1.bucket_start(at, &sydney()),
            utc(2025, 2, 13, 23, 0, 0)
        );
    }

    #[test]
    fn test_ambiguous_hour_picks_containing_bucket() {
        // Sydney falls back 2025-04-06 03:00 AEDT -> 02:00 AEST.
        // 02:30 local happens twice: 15:30 UTC (+11) and 16:30 UTC (+10).
        let first = utc(2025, 4, 5, 15, 30, 0);
        let second = utc(2025, 4, 5, 16, 30, 0);
        assert_eq!(
            Timeframe::H1.bucket_start(first, &sydney()),
            utc(2025, 4, 5, 15, 0, 0)
        );
        assert_eq!(
            Timeframe::H1.bucket_start(second, &sydney()),
            utc(2025, 4, 5, 16, 0, 0)
        );
    }

    #[test]
    fn test_daily_candle_spans_absolute_day_across_dst() {
        // Local midnight 2025-04-06 is still AEDT (+11).
        let at = utc(2025, 4, 6, 1, 0, 0);
        let start = Timeframe::D1.bucket_start(at, &sydney());
        assert_eq!(start, utc(2025, 4, 5, 13, 0, 0));
        let candle = Candle::new(Symbol::new("BHP"), Timeframe::D1, start, dec("1"), 1);
        assert_eq!(candle.end_time - candle.start_time, Duration::days(1));
    }

    #[test]
    fn test_long_local_day_keeps_trade_inside_candle() {
        // 2025-04-06 lasts 25 hours in Sydney. 23:30 local is 13:30 UTC,
        // past 24 absolute hours from local midnight (13:00 UTC Apr 5).
        let at = utc(2025, 4, 6, 13, 30, 0);
        let start = Timeframe::D1.bucket_start(at, &sydney());
        assert_eq!(start, utc(2025, 4, 6, 13, 0, 0));
        assert!(start <= at && at < start + Timeframe::D1.duration());
    }

    #[test]
    fn test_two_trades_same_minute() {
        let mut builder = CandleBuilder::new(Timeframe::M1, Symbol::new("BHP"), sydney());
        let t0 = utc(2025, 2, 13, 23, 15, 5);
        let t1 = utc(2025, 2, 13, 23, 15, 40);

        assert!(builder.process_trade(dec("10.0"), 100, nanos(t0)).is_none());
        assert!(builder.process_trade(dec("12.0"), 50, nanos(t1)).is_none());

        let candles = builder.into_candles();
        assert_eq!(candles.len(), 1);
        let c = &candles[0];
        assert_eq!(c.open, dec("10.0"));
        assert_eq!(c.high, dec("12.0"));
        assert_eq!(c.low, dec("10.0"));
        assert_eq!(c.close, dec("12.0"));
        assert_eq!(c.volume, 150);
        assert_eq!(c.trade_count, 2);
    }

    #[test]
    fn test_trade_at_end_time_opens_new_candle() {
        let mut builder = CandleBuilder::new(Timeframe::M1, Symbol::new("BHP"), sydney());
        let t0 = utc(2025, 2, 13, 23, 15, 5);
        let boundary = utc(2025, 2, 13, 23, 16, 0);

        builder.process_trade(dec("10"), 1, nanos(t0));
        let closed = builder.process_trade(dec("11"), 1, nanos(boundary)).unwrap();

        assert_eq!(closed.close, dec("10"));
        let current = builder.current_candle().unwrap();
        assert_eq!(current.start_time, boundary);
        assert_eq!(current.open, dec("11"));
    }

    #[test]
    fn test_late_arrival_merges_into_live_candle() {
        let mut builder = CandleBuilder::new(Timeframe::M1, Symbol::new("BHP"), sydney());
        builder.process_trade(dec("10"), 1, nanos(utc(2025, 2, 13, 23, 16, 10)));
        // Earlier minute, but the live candle has not ended: merged.
        builder.process_trade(dec("9"), 1, nanos(utc(2025, 2, 13, 23, 15, 50)));

        let candles = builder.into_candles();
        assert_eq!(candles.len(), 1);
        assert_eq!(candles[0].low, dec("9"));
        assert_eq!(candles[0].close, dec("9"));
    }

    #[test]
    fn test_candle_integrity_validation() {
        let start = utc(2025, 2, 13, 23, 15, 0);
        let valid = Candle::new(Symbol::new("BHP"), Timeframe::M1, start, dec("10"), 1);
        assert!(valid.is_valid());

        let mut invalid = valid.clone();
        invalid.high = dec("9");
        assert!(!invalid.is_valid());
    }

    #[test]
    fn test_candle_serializes_utc_seconds() {
        let start = utc(2025, 2, 13, 23, 15, 0);
        let candle = Candle::new(Symbol::new("BHP"), Timeframe::M1, start, dec("10.50"), 1);
        let json = serde_json::to_value(&candle).unwrap();

        assert_eq!(json["start_time"], "2025-02-13T23:15:00Z");
        assert_eq!(json["end_time"], "2025-02-13T23:16:00Z");
        assert_eq!(json["timeframe"], "1m");
        assert_eq!(json["open"], "10.50");

        let back: Candle = serde_json::from_value(json).unwrap();
        assert_eq!(back, candle);
    }

    #[test]
    fn test_build_symbol_candles_skips_bad_price() {
        let config = CandleConfig::default();
        let t0 = utc(2025, 2, 13, 23, 15, 5);
        let trades = vec![
            trade("10.0", "100", t0),
            trade("abc", "100", t0 + Duration::seconds(1)),
            trade("12.0", "x", t0 + Duration::seconds(2)),
        ];

        let candles = build_symbol_candles(&Symbol::new("BHP"), &trades, &config);
        assert_eq!(candles.len(), 3);
        let m1 = &candles[&Timeframe::M1];
        assert_eq!(m1.len(), 1);
        assert_eq!(m1[0].trade_count, 2);
        assert_eq!(m1[0].volume, 100);
        assert_eq!(m1[0].high, dec("12.0"));
    }

    #[test]
    fn test_aggregate_candles_per_symbol() {
        let config = CandleConfig {
            timeframes: vec![Timeframe::H1],
            timezone: sydney(),
        };
        let t0 = utc(2025, 2, 13, 23, 15, 5);
        let mut executed = BTreeMap::new();
        executed.insert(Symbol::new("BHP"), vec![trade("10", "1", t0)]);
        executed.insert(
            Symbol::new("CBA"),
            vec![trade("100", "1", t0), trade("101", "1", t0 + Duration::hours(1))],
        );

        let set = aggregate_candles(&executed, &config);
        assert_eq!(set[&Symbol::new("BHP")][&Timeframe::H1].len(), 1);
        assert_eq!(set[&Symbol::new("CBA")][&Timeframe::H1].len(), 2);
        assert!(!set[&Symbol::new("CBA")].contains_key(&Timeframe::M1));
    }

    proptest! {
        #[test]
        fn prop_candles_hold_ohlc_invariants(
            steps in proptest::collection::vec((0i64..7_200, 1i64..100_000), 1..60),
        ) {
            let base = nanos(utc(2025, 4, 5, 12, 0, 0));
            let mut ts = base;
            let mut manager = MultiTimeframeCandleManager::new(
                Symbol::new("BHP"),
                &CandleConfig::default(),
            );
            for (gap_secs, cents) in &steps {
                ts += gap_secs * 1_000_000_000;
                manager.process_trade(Decimal::new(*cents, 2), 1, ts);
            }

            for (_, candles) in manager.into_candles() {
                let mut prev_end: Option<DateTime<Utc>> = None;
                for candle in &candles {
                    prop_assert!(candle.is_valid());
                    if let Some(end) = prev_end {
                        prop_assert!(candle.end_time > end);
                    }
                    prev_end = Some(candle.end_time);
                }
                let trades: u64 = candles.iter().map(|c| c.trade_count).sum();
                prop_assert_eq!(trades, steps.len() as u64);
            }
        }
    }
}
