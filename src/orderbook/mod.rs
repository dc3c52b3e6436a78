//! Order book module
//!
//! Reconstructs a two-sided price ladder from a snapshot and a stream of
//! deltas, keeps cumulative totals per side and annotates the visible
//! window with a depth percentage.

mod book;
mod depth;
mod metrics;
mod side;

pub use book::{BookConsumer, OrderBook};
#[cfg(test)]
pub use book::MockBookConsumer;
pub use depth::{compute_depth, compute_depth_with, DepthPolicy};
pub use metrics::BookMetrics;
pub use side::{BookSide, SortDirection};

use serde::{Deserialize, Serialize};

/// Side of the order book
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Bid,
    Ask,
}

impl Side {
    /// Display order of the side: best bid is the highest price, best ask the lowest
    pub fn sort_direction(self) -> SortDirection {
        match self {
            Side::Bid => SortDirection::Descending,
            Side::Ask => SortDirection::Ascending,
        }
    }
}

/// A `(price, size)` pair as it arrives on the wire
///
/// Serialized as a two element array, `[price, size]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f64, f64)", into = "(f64, f64)")]
pub struct PriceLevel {
    pub price: f64,
    pub size: f64,
}

impl PriceLevel {
    pub fn new(price: f64, size: f64) -> Self {
        Self { price, size }
    }
}

impl From<(f64, f64)> for PriceLevel {
    fn from((price, size): (f64, f64)) -> Self {
        Self { price, size }
    }
}

impl From<PriceLevel> for (f64, f64) {
    fn from(level: PriceLevel) -> Self {
        (level.price, level.size)
    }
}

/// A level as presented to consumers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderLevel {
    pub price: f64,
    pub size: f64,
    /// Cumulative size from the best price through this level
    pub total: f64,
    /// Distance from the deepest visible level, 0 to 100. Zero until normalized.
    pub depth: f64,
}

impl OrderLevel {
    pub fn new(price: f64, size: f64, total: f64) -> Self {
        Self {
            price,
            size,
            total,
            depth: 0.0,
        }
    }
}

/// Snapshot or delta payload: per-side lists of `(price, size)` pairs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookUpdate {
    #[serde(default)]
    pub bids: Vec<PriceLevel>,
    #[serde(default)]
    pub asks: Vec<PriceLevel>,
}

impl BookUpdate {
    pub fn new(bids: Vec<PriceLevel>, asks: Vec<PriceLevel>) -> Self {
        Self { bids, asks }
    }

    /// Build from raw pairs, convenient for fixtures
    pub fn from_pairs(bids: &[(f64, f64)], asks: &[(f64, f64)]) -> Self {
        Self {
            bids: bids.iter().copied().map(PriceLevel::from).collect(),
            asks: asks.iter().copied().map(PriceLevel::from).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// Number of level entries across both sides
    pub fn len(&self) -> usize {
        self.bids.len() + self.asks.len()
    }
}

/// Materialized book: both sides sorted best first, with running totals
///
/// Each view is an owned copy. Later mutations of the book never reach a view
/// that has already been handed out.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookView {
    pub bids: Vec<OrderLevel>,
    pub asks: Vec<OrderLevel>,
}

impl BookView {
    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    pub fn best_bid(&self) -> Option<&OrderLevel> {
        self.bids.first()
    }

    pub fn best_ask(&self) -> Option<&OrderLevel> {
        self.asks.first()
    }
}

/// Book state to be published
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookState {
    pub product: String,
    pub timestamp: i64,
    pub visible_rows: usize,
    pub bids: Vec<OrderLevel>,
    pub asks: Vec<OrderLevel>,
    pub metrics: BookMetrics,
}
