//! Order book engine
//!
//! Owns the bid side (descending) and the ask side (ascending) and is the
//! only place either side is mutated.

use super::depth::{compute_depth_with, DepthPolicy};
use super::{BookMetrics, BookSide, BookState, BookUpdate, BookView, OrderLevel, Side};

/// Target of sequenced feed updates
#[cfg_attr(test, mockall::automock)]
pub trait BookConsumer {
    /// Replace the book with a snapshot
    fn apply_snapshot(&mut self, update: &BookUpdate);

    /// Apply one delta batch
    fn apply_delta(&mut self, update: &BookUpdate);
}

/// Order book for the subscribed product
#[derive(Debug)]
pub struct OrderBook {
    product: String,
    bids: BookSide,
    asks: BookSide,
    /// Whether a snapshot has been applied since creation or the last reset
    initialized: bool,
    /// Number of snapshots and deltas applied
    update_count: u64,
    /// Timestamp of last update (milliseconds)
    last_update_time: i64,
}

impl OrderBook {
    /// Create a new empty order book
    pub fn new(product: &str) -> Self {
        Self {
            product: product.to_string(),
            bids: BookSide::new(Side::Bid.sort_direction()),
            asks: BookSide::new(Side::Ask.sort_direction()),
            initialized: false,
            update_count: 0,
            last_update_time: 0,
        }
    }

    /// Replace both sides wholesale
    ///
    /// Applying the same snapshot twice yields the same view.
    pub fn on_snapshot(&mut self, snapshot: &BookUpdate) -> BookView {
        self.bids.replace_all(&snapshot.bids);
        self.asks.replace_all(&snapshot.asks);

        self.initialized = true;
        self.touch();
        self.view()
    }

    /// Apply a delta to each side independently
    ///
    /// A side with no entries in the delta is left untouched.
    pub fn on_delta(&mut self, delta: &BookUpdate) -> BookView {
        if !delta.bids.is_empty() {
            self.bids.apply_delta(&delta.bids);
        }
        if !delta.asks.is_empty() {
            self.asks.apply_delta(&delta.asks);
        }

        self.touch();
        self.view()
    }

    /// Current materialized state, full depth, no depth annotation
    pub fn view(&self) -> BookView {
        BookView {
            bids: self.bids.snapshot(),
            asks: self.asks.snapshot(),
        }
    }

    /// Switch to another product, dropping the old product's levels
    pub fn reset(&mut self, product: &str) {
        self.product = product.to_string();
        self.bids.clear();
        self.asks.clear();
        self.initialized = false;
    }

    pub fn product(&self) -> &str {
        &self.product
    }

    pub fn bids(&self) -> &BookSide {
        &self.bids
    }

    pub fn asks(&self) -> &BookSide {
        &self.asks
    }

    pub fn best_bid(&self) -> Option<&OrderLevel> {
        self.bids.best()
    }

    pub fn best_ask(&self) -> Option<&OrderLevel> {
        self.asks.best()
    }

    /// Check if the book has been seeded by a snapshot
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn update_count(&self) -> u64 {
        self.update_count
    }

    pub fn last_update_time(&self) -> i64 {
        self.last_update_time
    }

    /// Get current state for publishing, depth-annotated over `visible_rows`
    pub fn state(&self, visible_rows: usize, policy: DepthPolicy) -> BookState {
        let view = compute_depth_with(&self.view(), visible_rows, policy);
        let metrics = BookMetrics::from_view(&view);

        BookState {
            product: self.product.clone(),
            timestamp: self.last_update_time,
            visible_rows,
            bids: view.bids,
            asks: view.asks,
            metrics,
        }
    }

    fn touch(&mut self) {
        self.update_count += 1;
        self.last_update_time = chrono::Utc::now().timestamp_millis();
    }
}

impl BookConsumer for OrderBook {
    fn apply_snapshot(&mut self, update: &BookUpdate) {
        self.on_snapshot(update);
    }

    fn apply_delta(&mut self, update: &BookUpdate) {
        self.on_delta(update);
    }
}
