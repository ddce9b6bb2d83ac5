//! Derived per-symbol views
//!
//! Flat, time-ordered event lists pulled out of the grouped orders (executed
//! trades) or straight from the parsed stream (auction and calculated-value
//! quotes).

use std::collections::BTreeMap;

use feed_types::ids::Symbol;

use crate::events::{field, Event, MessageKind};
use crate::tracker::OrderGroups;

/// Executed trades with a resolved `Price`, per symbol, in timestamp order.
///
/// The sort is stable, so trades sharing a timestamp keep their
/// order-id-then-replay order.
pub fn executed_by_symbol(groups: &OrderGroups) -> BTreeMap<Symbol, Vec<Event>> {
    let mut out = BTreeMap::new();
    for (symbol, orders) in groups {
        let mut trades: Vec<Event> = orders
            .values()
            .flatten()
            .filter(|e| e.kind == MessageKind::OrderExecuted && e.has_field(field::PRICE))
            .cloned()
            .collect();
        if trades.is_empty() {
            continue;
        }
        trades.sort_by_key(|e| e.timestamp);
        out.insert(symbol.clone(), trades);
    }
    out
}

/// AuctionUpdate and CalculatedValue events keyed by their own `Symbol`.
///
/// Events without a symbol are dropped.
pub fn quote_views(events: &[Event]) -> BTreeMap<Symbol, Vec<Event>> {
    let mut out: BTreeMap<Symbol, Vec<Event>> = BTreeMap::new();
    for event in events {
        if !matches!(
            event.kind,
            MessageKind::AuctionUpdate | MessageKind::CalculatedValue
        ) {
            continue;
        }
        if let Some(symbol) = event.symbol() {
            out.entry(symbol).or_default().push(event.clone());
        }
    }
    for quotes in out.values_mut() {
        quotes.sort_by_key(|e| e.timestamp);
    }
    out
}
