//! Price level store for one side of the book
//!
//! Levels are kept in a `Vec` sorted by the side's direction so the running
//! totals can be computed as a single prefix sum in display order.

use std::cmp::Ordering;

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use super::{OrderLevel, PriceLevel};

/// Price ordering of a side, best price first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    /// Compare two prices in this direction
    pub fn compare(self, a: f64, b: f64) -> Ordering {
        let ord = OrderedFloat(a).cmp(&OrderedFloat(b));
        match self {
            SortDirection::Ascending => ord,
            SortDirection::Descending => ord.reverse(),
        }
    }
}

/// One side of the ladder
#[derive(Debug, Clone)]
pub struct BookSide {
    direction: SortDirection,
    levels: Vec<OrderLevel>,
}

impl BookSide {
    /// Create an empty side
    pub fn new(direction: SortDirection) -> Self {
        Self {
            direction,
            levels: Vec::new(),
        }
    }

    pub fn direction(&self) -> SortDirection {
        self.direction
    }

    /// Levels in display order
    pub fn levels(&self) -> &[OrderLevel] {
        &self.levels
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn best(&self) -> Option<&OrderLevel> {
        self.levels.first()
    }

    /// Cumulative size of the whole side
    pub fn total(&self) -> f64 {
        self.levels.last().map(|l| l.total).unwrap_or(0.0)
    }

    /// Replace every level with the snapshot contents
    ///
    /// Snapshot prices are expected to be unique; if one repeats, the later
    /// entry wins.
    pub fn replace_all(&mut self, levels: &[PriceLevel]) {
        let direction = self.direction;

        let mut sorted: Vec<OrderLevel> = levels
            .iter()
            .map(|l| OrderLevel::new(l.price, l.size, 0.0))
            .collect();
        // Stable, so duplicates stay in arrival order
        sorted.sort_by(|a, b| direction.compare(a.price, b.price));
        sorted.reverse();
        sorted.dedup_by(|a, b| a.price == b.price);
        sorted.reverse();

        self.levels = sorted;
        self.recompute_totals();
    }

    /// Apply one delta batch in order
    ///
    /// Zero size removes a known price, a positive size updates it in place or
    /// inserts it at its sorted position. Removing an unknown price is a no-op.
    /// Totals are recomputed once at the end. Returns whether any level changed.
    pub fn apply_delta(&mut self, delta: &[PriceLevel]) -> bool {
        let mut changed = false;

        for level in delta {
            match self.find(level.price) {
                Ok(index) => {
                    if level.size <= 0.0 {
                        self.levels.remove(index);
                    } else {
                        self.levels[index].size = level.size;
                    }
                    changed = true;
                }
                Err(index) => {
                    if level.size > 0.0 {
                        self.levels
                            .insert(index, OrderLevel::new(level.price, level.size, 0.0));
                        changed = true;
                    }
                }
            }
        }

        if changed {
            self.recompute_totals();
        }
        changed
    }

    /// Drop every level
    pub fn clear(&mut self) {
        self.levels.clear();
    }

    /// Owned copy of the levels for a view
    pub fn snapshot(&self) -> Vec<OrderLevel> {
        self.levels.clone()
    }

    fn find(&self, price: f64) -> Result<usize, usize> {
        let direction = self.direction;
        self.levels
            .binary_search_by(|l| direction.compare(l.price, price))
    }

    fn recompute_totals(&mut self) {
        let mut running = 0.0;
        for level in &mut self.levels {
            running += level.size;
            level.total = running;
            level.depth = 0.0;
        }
    }
}
