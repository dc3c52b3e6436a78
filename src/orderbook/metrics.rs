//! Order book metrics calculation

use serde::{Deserialize, Serialize};

use super::BookView;

/// Computed metrics for an order book
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BookMetrics {
    pub best_bid: Option<f64>,
    pub best_ask: Option<f64>,

    /// Mid price (average of best bid and ask)
    pub mid_price: Option<f64>,

    /// Absolute distance between best ask and best bid
    pub spread: Option<f64>,

    /// Spread as a percentage of the best bid, 0 when the bid is 0
    pub spread_pct: Option<f64>,

    /// Cumulative bid size
    pub bid_total: f64,

    /// Cumulative ask size
    pub ask_total: f64,

    pub bid_levels: usize,
    pub ask_levels: usize,
}

impl BookMetrics {
    pub fn from_view(view: &BookView) -> Self {
        let best_bid = view.best_bid().map(|l| l.price);
        let best_ask = view.best_ask().map(|l| l.price);

        let (mid_price, spread, spread_pct) = match (best_bid, best_ask) {
            (Some(bid), Some(ask)) => {
                let spread = (ask - bid).abs();
                let pct = if bid == 0.0 { 0.0 } else { spread * 100.0 / bid };
                (Some((bid + ask) / 2.0), Some(spread), Some(pct))
            }
            _ => (None, None, None),
        };

        Self {
            best_bid,
            best_ask,
            mid_price,
            spread,
            spread_pct,
            bid_total: view.bids.last().map(|l| l.total).unwrap_or(0.0),
            ask_total: view.asks.last().map(|l| l.total).unwrap_or(0.0),
            bid_levels: view.bids.len(),
            ask_levels: view.asks.len(),
        }
    }

    /// Check if the order book is healthy (has both sides)
    pub fn is_healthy(&self) -> bool {
        self.spread.is_some() && self.bid_levels > 0 && self.ask_levels > 0
    }

    /// Get volume ratio (bid_total / ask_total)
    pub fn volume_ratio(&self) -> Option<f64> {
        if self.ask_total > 0.0 {
            Some(self.bid_total / self.ask_total)
        } else {
            None
        }
    }
}
