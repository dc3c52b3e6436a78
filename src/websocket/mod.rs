//! WebSocket module for the book feed subscription

mod client;
mod manager;

pub use client::{Inbound, WebSocketClient};
pub use manager::{FeedCommand, FeedManager};
