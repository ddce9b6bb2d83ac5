//! Order selection filters
//!
//! Applied to the grouped orders after tracking, before the executed view
//! and candles are derived. Each step is a pure function of the groups and
//! the `FilterConfig`, applied in this order: symbol allow-list, executed
//! orders only, then either price-and-range or plain range.

use std::collections::BTreeMap;

use feed_types::numeric::Price;
use tracing::info;

use crate::config::{FilterConfig, TimeRange};
use crate::events::{Event, MessageKind};
use crate::tracker::OrderGroups;

/// Apply every configured filter to `groups`.
pub fn apply_filters(groups: OrderGroups, config: &FilterConfig) -> OrderGroups {
    if config.is_empty() {
        return groups;
    }
    let before = count_orders(&groups);

    let mut groups = groups;
    if let Some(symbols) = config.symbol_allow_list() {
        groups.retain(|symbol, _| symbols.contains(symbol));
    }
    if config.only_executed {
        groups = retain_orders(groups, |events| {
            events.iter().any(|e| e.kind == MessageKind::OrderExecuted)
        });
    }
    groups = match (config.target_price, config.time_range) {
        (Some(price), range) => retain_orders(groups, |events| {
            has_price(events, price) && range.map_or(true, |r| has_event_in_range(events, r))
        }),
        (None, Some(range)) => filter_events_in_range(groups, range),
        (None, None) => groups,
    };

    info!(
        orders_before = before,
        orders_after = count_orders(&groups),
        "Order filters applied"
    );
    groups
}

fn count_orders(groups: &OrderGroups) -> usize {
    groups.values().map(BTreeMap::len).sum()
}

/// Keep whole orders matching `keep`, dropping symbols left empty.
fn retain_orders<F>(groups: OrderGroups, keep: F) -> OrderGroups
where
    F: Fn(&[Event]) -> bool,
{
    groups
        .into_iter()
        .filter_map(|(symbol, orders)| {
            let orders: BTreeMap<_, _> = orders
                .into_iter()
                .filter(|(_, events)| keep(events))
                .collect();
            (!orders.is_empty()).then_some((symbol, orders))
        })
        .collect()
}

/// Keep only events whose venue timestamp is in range.
///
/// Events without a readable `Timestamp` field are dropped, as are orders
/// and symbols left empty.
fn filter_events_in_range(groups: OrderGroups, range: TimeRange) -> OrderGroups {
    groups
        .into_iter()
        .filter_map(|(symbol, orders)| {
            let orders: BTreeMap<_, _> = orders
                .into_iter()
                .filter_map(|(order_id, events)| {
                    let kept: Vec<Event> = events
                        .into_iter()
                        .filter(|e| in_range(e, range))
                        .collect();
                    (!kept.is_empty()).then_some((order_id, kept))
                })
                .collect();
            (!orders.is_empty()).then_some((symbol, orders))
        })
        .collect()
}

fn in_range(event: &Event, range: TimeRange) -> bool {
    event
        .venue_timestamp_micros()
        .is_some_and(|micros| range.contains(micros))
}

fn has_event_in_range(events: &[Event], range: TimeRange) -> bool {
    events.iter().any(|e| in_range(e, range))
}

fn has_price(events: &[Event], target: Price) -> bool {
    events
        .iter()
        .any(|e| e.price().map_or(false, |price| price == target))
}
