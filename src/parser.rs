//! Parser module for Crypto Facilities `book_ui_1` messages
//!
//! Handles deserialization of subscription events, book snapshots and book
//! deltas, and serialization of subscribe/unsubscribe requests.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::FeedError;
use crate::orderbook::{BookUpdate, PriceLevel};

/// Feed carrying the grouped order book
pub const BOOK_FEED: &str = "book_ui_1";

/// Feed name of the initial snapshot
pub const BOOK_SNAPSHOT_FEED: &str = "book_ui_1_snapshot";

/// Tradable instruments on the book feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Product {
    #[serde(rename = "PI_XBTUSD")]
    XbtUsd,
    #[serde(rename = "PI_ETHUSD")]
    EthUsd,
}

impl Product {
    pub fn as_str(self) -> &'static str {
        match self {
            Product::XbtUsd => "PI_XBTUSD",
            Product::EthUsd => "PI_ETHUSD",
        }
    }

    /// The other product
    pub fn toggle(self) -> Self {
        match self {
            Product::XbtUsd => Product::EthUsd,
            Product::EthUsd => Product::XbtUsd,
        }
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Product {
    type Err = FeedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PI_XBTUSD" => Ok(Product::XbtUsd),
            "PI_ETHUSD" => Ok(Product::EthUsd),
            other => Err(FeedError::ConfigError(format!("Unknown product: {}", other))),
        }
    }
}

/// Subscribe or unsubscribe request
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionRequest {
    pub event: &'static str,
    pub feed: &'static str,
    pub product_ids: Vec<Product>,
}

impl SubscriptionRequest {
    pub fn subscribe(product: Product) -> Self {
        Self {
            event: "subscribe",
            feed: BOOK_FEED,
            product_ids: vec![product],
        }
    }

    pub fn unsubscribe(product: Product) -> Self {
        Self {
            event: "unsubscribe",
            feed: BOOK_FEED,
            product_ids: vec![product],
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Control message from the exchange
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    Info { version: Option<u64> },
    Subscribed { product: Option<Product> },
    Unsubscribed { product: Option<Product> },
    Alert { message: String },
    Error { message: String },
    Other(String),
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    event: String,
    #[serde(default)]
    version: Option<u64>,
    #[serde(default)]
    product_ids: Vec<Product>,
    #[serde(default)]
    message: Option<String>,
}

/// Snapshot or delta on the book feed
#[derive(Debug, Clone, Deserialize)]
pub struct BookMessage {
    /// Feed name
    pub feed: String,

    /// Instrument the levels belong to
    pub product_id: Product,

    /// Levels to set
    #[serde(default)]
    pub bids: Vec<PriceLevel>,

    /// Levels to set
    #[serde(default)]
    pub asks: Vec<PriceLevel>,

    /// Grouping depth, snapshots only
    #[serde(rename = "numLevels", default)]
    pub num_levels: Option<u32>,
}

impl BookMessage {
    pub fn into_update(self) -> BookUpdate {
        BookUpdate::new(self.bids, self.asks)
    }
}

/// Parsed WebSocket message
#[derive(Debug, Clone)]
pub enum ParsedMessage {
    Event(FeedEvent),
    Snapshot { product: Product, update: BookUpdate },
    Delta { product: Product, update: BookUpdate },
    Unknown(String),
}

impl ParsedMessage {
    /// Parse a raw WebSocket message
    pub fn parse(raw: &str) -> Result<Self, serde_json::Error> {
        let value: serde_json::Value = serde_json::from_str(raw)?;

        if value.get("event").is_some() {
            let event: RawEvent = serde_json::from_value(value)?;
            return Ok(ParsedMessage::Event(Self::parse_event(event)));
        }

        match value.get("feed").and_then(|f| f.as_str()) {
            Some(BOOK_SNAPSHOT_FEED) => {
                let msg: BookMessage = serde_json::from_value(value)?;
                Ok(ParsedMessage::Snapshot {
                    product: msg.product_id,
                    update: msg.into_update(),
                })
            }
            Some(BOOK_FEED) => {
                let msg: BookMessage = serde_json::from_value(value)?;
                Ok(ParsedMessage::Delta {
                    product: msg.product_id,
                    update: msg.into_update(),
                })
            }
            _ => Ok(ParsedMessage::Unknown(raw.to_string())),
        }
    }

    fn parse_event(event: RawEvent) -> FeedEvent {
        let product = event.product_ids.first().copied();
        match event.event.as_str() {
            "info" => FeedEvent::Info {
                version: event.version,
            },
            "subscribed" => FeedEvent::Subscribed { product },
            "unsubscribed" => FeedEvent::Unsubscribed { product },
            "alert" => FeedEvent::Alert {
                message: event.message.unwrap_or_default(),
            },
            "error" => FeedEvent::Error {
                message: event.message.unwrap_or_default(),
            },
            _ => FeedEvent::Other(event.event),
        }
    }
}
