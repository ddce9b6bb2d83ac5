//! Order lifecycle tracker
//!
//! Groups order events by normalized `OrderID`, replays each group in
//! `(timestamp, kind priority)` order and fills in the fields the feed does
//! not repeat on every message:
//!
//! - `Symbol` on every event, from the AddOrder that introduced the order
//! - `SideIndicator` on modify/execute/delete, from the AddOrder
//! - `Price` on executions, from the last modify or else the AddOrder
//! - `Price`, `OrderID` and remaining `Quantity` on deletes
//!
//! Orders are independent, so groups are replayed in parallel. Input events
//! are never touched; every replayed event is a fresh copy.

use std::collections::BTreeMap;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use feed_types::errors::FieldError;
use feed_types::ids::{OrderId, Symbol};
use feed_types::numeric::Quantity;

use crate::events::{field, Event, MessageKind, UNKNOWN_SIDE};

/// Enriched events per symbol, then per order, each list in replay order.
pub type OrderGroups = BTreeMap<Symbol, BTreeMap<OrderId, Vec<Event>>>;

/// Result of one tracking pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrackerOutput {
    pub groups: OrderGroups,
    /// Order events whose OrderID was never introduced by an AddOrder.
    pub orphans: usize,
    /// Deletes whose remaining quantity could not be derived.
    pub derivation_failures: usize,
}

impl TrackerOutput {
    pub fn order_count(&self) -> usize {
        self.groups.values().map(BTreeMap::len).sum()
    }
}

/// Per-order replay state.
#[derive(Debug, Clone)]
pub struct OrderState {
    symbol: Symbol,
    last_add: Option<Event>,
    last_modify: Option<Event>,
    last_executed: Option<Event>,
    derivation_failures: usize,
}

impl OrderState {
    pub fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            last_add: None,
            last_modify: None,
            last_executed: None,
            derivation_failures: 0,
        }
    }

    pub fn derivation_failures(&self) -> usize {
        self.derivation_failures
    }

    /// Apply the next event of this order and return its enriched copy.
    pub fn apply(&mut self, event: &Event) -> Event {
        let enriched = event
            .clone()
            .with_field(field::SYMBOL, self.symbol.as_str());

        match event.kind {
            MessageKind::AddOrder => {
                self.last_add = Some(enriched.clone());
                enriched
            }
            MessageKind::ModifyOrder => {
                let enriched = enriched.with_field(field::SIDE_INDICATOR, self.side());
                self.last_modify = Some(enriched.clone());
                enriched
            }
            MessageKind::OrderExecuted => {
                let mut enriched = enriched.with_field(field::SIDE_INDICATOR, self.side());
                if let Some(price) = self.execution_price() {
                    enriched = enriched.with_field(field::PRICE, price);
                }
                self.last_executed = Some(enriched.clone());
                enriched
            }
            MessageKind::DeleteOrder => self.apply_delete(enriched),
            _ => enriched,
        }
    }

    fn apply_delete(&mut self, enriched: Event) -> Event {
        let Some(source) = self.last_modify.as_ref().or(self.last_add.as_ref()) else {
            return enriched.with_field(field::SIDE_INDICATOR, UNKNOWN_SIDE);
        };

        let mut out = enriched.with_field(field::SIDE_INDICATOR, self.side());
        if let Some(order_id) = source.field(field::ORDER_ID) {
            out = out.with_field(field::ORDER_ID, order_id);
        }
        if let Some(price) = source.field(field::PRICE) {
            out = out.with_field(field::PRICE, price);
        }

        match self.remaining_quantity(source) {
            Ok(remaining) => out.with_field(field::QUANTITY, remaining.to_string()),
            Err(e) => {
                self.derivation_failures += 1;
                warn!(
                    symbol = %self.symbol,
                    order_id = ?out.field(field::ORDER_ID),
                    field = e.field(),
                    error = %e,
                    "Cannot derive remaining quantity for delete"
                );
                out.without_field(field::QUANTITY)
            }
        }
    }

    /// Source quantity less the most recent execution, if any.
    fn remaining_quantity(&self, source: &Event) -> Result<Quantity, FieldError> {
        let original = source.quantity(field::QUANTITY)?;
        match &self.last_executed {
            Some(exec) => {
                let executed = exec.quantity(field::EXECUTED_QTY)?;
                original.checked_sub(executed, field::QUANTITY)
            }
            None => Ok(original),
        }
    }

    fn side(&self) -> String {
        self.last_add
            .as_ref()
            .and_then(|add| add.field(field::SIDE_INDICATOR))
            .unwrap_or(UNKNOWN_SIDE)
            .to_string()
    }

    fn execution_price(&self) -> Option<String> {
        self.last_modify
            .as_ref()
            .and_then(|m| m.field(field::PRICE))
            .or_else(|| self.last_add.as_ref().and_then(|a| a.field(field::PRICE)))
            .map(str::to_string)
    }
}

/// Outcome of replaying one OrderID group.
enum Replayed {
    Bound {
        symbol: Symbol,
        order_id: OrderId,
        events: Vec<Event>,
        derivation_failures: usize,
    },
    Orphaned(usize),
}

/// Replay one order's events, already in replay order.
fn replay_order(order_id: OrderId, events: Vec<Event>) -> Replayed {
    let binding = events
        .iter()
        .filter(|e| e.kind == MessageKind::AddOrder)
        .find_map(Event::symbol);

    let Some(symbol) = binding else {
        debug!(order_id = %order_id, events = events.len(), "Order has no binding AddOrder");
        return Replayed::Orphaned(events.len());
    };

    let mut state = OrderState::new(symbol.clone());
    let replayed = events.iter().map(|e| state.apply(e)).collect();
    Replayed::Bound {
        symbol,
        order_id,
        events: replayed,
        derivation_failures: state.derivation_failures(),
    }
}

/// Group, order and enrich every order event in `events`.
///
/// Events of non-order kinds, and order events without a usable OrderID,
/// are ignored.
pub fn track_orders(events: &[Event]) -> TrackerOutput {
    let mut by_order: BTreeMap<OrderId, Vec<Event>> = BTreeMap::new();
    let mut unidentified = 0usize;
    for event in events.iter().filter(|e| e.kind.is_order_kind()) {
        match event.order_id() {
            Some(id) => by_order.entry(id).or_default().push(event.clone()),
            None => unidentified += 1,
        }
    }

    let replayed: Vec<Replayed> = by_order
        .into_par_iter()
        .map(|(order_id, mut group)| {
            group.sort_by(Event::replay_cmp);
            replay_order(order_id, group)
        })
        .collect();

    let mut output = TrackerOutput {
        orphans: unidentified,
        ..TrackerOutput::default()
    };
    for outcome in replayed {
        match outcome {
            Replayed::Bound {
                symbol,
                order_id,
                events,
                derivation_failures,
            } => {
                output.derivation_failures += derivation_failures;
                output
                    .groups
                    .entry(symbol)
                    .or_default()
                    .insert(order_id, events);
            }
            Replayed::Orphaned(count) => output.orphans += count,
        }
    }

    info!(
        symbols = output.groups.len(),
        orders = output.order_count(),
        orphans = output.orphans,
        derivation_failures = output.derivation_failures,
        "Order tracking complete"
    );
    output
}
