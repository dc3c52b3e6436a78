//! Depth Ladder - order book reconstruction for the `book_ui_1` feed
//!
//! This crate keeps a local two-sided price ladder consistent with a
//! snapshot-plus-delta feed, computes cumulative totals per level and
//! normalizes a depth percentage for the visible rows of each side.

use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};

pub mod config;
pub mod error;
pub mod orderbook;
pub mod parser;
pub mod publisher;
pub mod sequencer;
pub mod telemetry;
pub mod websocket;

pub use config::Config;
pub use error::{FeedError, Result};
pub use orderbook::{
    compute_depth, compute_depth_with, BookConsumer, BookMetrics, BookSide, BookState, BookUpdate,
    BookView, DepthPolicy, OrderBook, OrderLevel, PriceLevel, Side, SortDirection,
};
pub use parser::{ParsedMessage, Product};
pub use publisher::Publisher;
pub use sequencer::{ConnectionState, FeedUpdate, UpdateSequencer};
pub use telemetry::FeedMetrics;
pub use websocket::{FeedCommand, FeedManager};

/// Application state shared across components
pub struct AppState {
    pub book: Arc<RwLock<OrderBook>>,
    pub publisher: Arc<Publisher>,
    pub config: Arc<Config>,
    pub metrics: FeedMetrics,
    /// Control channel into the feed manager
    pub commands: mpsc::Sender<FeedCommand>,
}
