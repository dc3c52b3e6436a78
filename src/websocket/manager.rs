//! Feed connection manager
//!
//! Drives the subscription lifecycle: waits for a connect command, connects
//! and subscribes, routes snapshots and deltas through the sequencer, applies
//! queued updates on every processing tick and publishes the result.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use super::{Inbound, WebSocketClient};
use crate::error::{FeedError, Result};
use crate::orderbook::{BookConsumer, BookUpdate, OrderBook};
use crate::parser::{FeedEvent, ParsedMessage, Product, SubscriptionRequest};
use crate::sequencer::{PushOutcome, UpdateSequencer};
use crate::telemetry::FeedMetrics;
use crate::AppState;

/// Maximum backoff delay in milliseconds (60 seconds)
const MAX_BACKOFF_MS: u64 = 60_000;

/// Requests from the host environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedCommand {
    /// Activate the feed
    Connect,
    /// Deactivate on user request
    Disconnect,
    /// Deactivate because the host went to the background
    Background,
    /// Switch to the other product
    ToggleProduct,
    /// Stop the manager
    Shutdown,
}

/// How a connected session ended without error
enum SessionEnd {
    Deactivated,
    Shutdown,
}

/// Server-side subscription as far as the manager knows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Subscription {
    Idle,
    /// Subscribe sent, no confirmation yet
    Requested(Product),
    Live(Product),
    /// Unsubscribe sent; the selected product is subscribed once it is confirmed
    Releasing,
}

/// Applies sequenced updates to the book and counts them
struct CountingConsumer<'a> {
    book: &'a mut OrderBook,
    metrics: &'a FeedMetrics,
}

impl BookConsumer for CountingConsumer<'_> {
    fn apply_snapshot(&mut self, update: &BookUpdate) {
        self.book.on_snapshot(update);
        self.metrics.snapshots.inc();
    }

    fn apply_delta(&mut self, update: &BookUpdate) {
        self.book.on_delta(update);
        self.metrics.deltas.inc();
    }
}

/// Manages the feed connection with automatic reconnection
pub struct FeedManager {
    state: Arc<AppState>,
    client: WebSocketClient,
    sequencer: UpdateSequencer,
    commands: mpsc::Receiver<FeedCommand>,
    selected: Product,
    subscription: Subscription,
    reconnect_attempts: u32,
}

impl FeedManager {
    /// Create a new feed manager
    pub fn new(state: Arc<AppState>, commands: mpsc::Receiver<FeedCommand>) -> Self {
        let client = WebSocketClient::new(&state.config.ws_endpoint);
        let sequencer = UpdateSequencer::new(state.config.max_pending_updates);
        let selected = state.config.product;

        Self {
            state,
            client,
            sequencer,
            commands,
            selected,
            subscription: Subscription::Idle,
            reconnect_attempts: 0,
        }
    }

    pub fn selected_product(&self) -> Product {
        self.selected
    }

    pub fn sequencer(&self) -> &UpdateSequencer {
        &self.sequencer
    }

    /// Run until a shutdown command arrives or the command channel closes
    pub async fn run(&mut self) -> Result<()> {
        info!(product = %self.selected, "Starting feed manager");

        loop {
            if !self.sequencer.is_active() {
                match self.commands.recv().await {
                    Some(FeedCommand::Connect) => {
                        self.reconnect_attempts = 0;
                        self.sequencer.activate();
                    }
                    Some(FeedCommand::ToggleProduct) => self.select_product(self.selected.toggle()).await,
                    Some(FeedCommand::Disconnect) | Some(FeedCommand::Background) => {
                        debug!("Feed already inactive");
                    }
                    Some(FeedCommand::Shutdown) | None => return Ok(()),
                }
                continue;
            }

            match self.connect_and_process().await {
                Ok(SessionEnd::Deactivated) => continue,
                Ok(SessionEnd::Shutdown) => return Ok(()),
                Err(e) => {
                    error!(error = %e, "Feed error");
                    self.end_session().await;
                    self.reconnect_attempts += 1;
                    self.state.metrics.reconnects.inc();

                    if self.reconnect_attempts > self.state.config.max_reconnect_attempts {
                        error!(
                            attempts = self.reconnect_attempts,
                            error = %FeedError::MaxReconnectAttemptsExceeded,
                            "Feed left inactive until the next connect"
                        );
                        continue;
                    }

                    // Exponential backoff, capped at MAX_BACKOFF_MS
                    let base_delay = self.state.config.reconnect_delay_ms
                        * 2u64.pow(self.reconnect_attempts.min(6));
                    let delay = Duration::from_millis(base_delay.min(MAX_BACKOFF_MS));

                    warn!(
                        attempt = self.reconnect_attempts,
                        delay_ms = delay.as_millis() as u64,
                        "Reconnecting after error..."
                    );
                    if !self.wait_for_reconnect(delay).await {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Sleep out the backoff while still honoring commands. Returns false on
    /// shutdown.
    async fn wait_for_reconnect(&mut self, delay: Duration) -> bool {
        let deadline = sleep(delay);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => {
                    self.sequencer.activate();
                    return true;
                }
                cmd = self.commands.recv() => match cmd {
                    Some(FeedCommand::Connect) => {
                        self.sequencer.activate();
                        return true;
                    }
                    Some(FeedCommand::Disconnect) | Some(FeedCommand::Background) => {
                        info!("Reconnect cancelled");
                        return true;
                    }
                    Some(FeedCommand::ToggleProduct) => {
                        self.select_product(self.selected.toggle()).await;
                    }
                    Some(FeedCommand::Shutdown) | None => return false,
                },
            }
        }
    }

    /// Connect, subscribe and process until deactivated or an error occurs
    ///
    /// A quiet feed is pinged after `keepalive_interval_ms`; if still nothing
    /// arrives within `recv_timeout_ms` of the last frame the session fails
    /// with [`FeedError::ConnectionTimeout`].
    async fn connect_and_process(&mut self) -> Result<SessionEnd> {
        self.client.connect().await?;
        self.reconnect_attempts = 0;
        self.subscribe().await?;

        let config = self.state.config.clone();
        let mut tick = interval(Duration::from_millis(config.tick_interval_ms.max(1)));
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let keepalive = Duration::from_millis(config.keepalive_interval_ms.max(1));
        let recv_timeout = Duration::from_millis(config.recv_timeout_ms).max(keepalive);
        let mut last_frame = Instant::now();
        let mut ping_sent = false;
        let liveness = sleep_until(last_frame + keepalive);
        tokio::pin!(liveness);

        loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(FeedCommand::Connect) => debug!("Feed already active"),
                    Some(FeedCommand::Disconnect) => {
                        self.deactivate("disconnect requested").await;
                        return Ok(SessionEnd::Deactivated);
                    }
                    Some(FeedCommand::Background) => {
                        self.deactivate("host in background").await;
                        return Ok(SessionEnd::Deactivated);
                    }
                    Some(FeedCommand::ToggleProduct) => {
                        self.select_product(self.selected.toggle()).await;
                        self.resubscribe().await?;
                    }
                    Some(FeedCommand::Shutdown) | None => {
                        self.deactivate("shutdown").await;
                        return Ok(SessionEnd::Shutdown);
                    }
                },
                received = self.client.recv() => {
                    let inbound = match received {
                        Ok(inbound) => inbound,
                        Err(e @ FeedError::ParseError(_)) => {
                            warn!(error = %e, "Unreadable frame dropped");
                            continue;
                        }
                        Err(e) => return Err(e),
                    };
                    last_frame = Instant::now();
                    ping_sent = false;
                    liveness.as_mut().reset(last_frame + keepalive);

                    if let Inbound::Text(text) = inbound {
                        if let Err(e) = self.process_message(&text).await {
                            warn!(error = %e, "Failed to process message");
                        }
                    }
                }
                _ = &mut liveness => {
                    if ping_sent {
                        warn!(
                            silent_ms = last_frame.elapsed().as_millis() as u64,
                            "No frame since keepalive ping, reconnecting"
                        );
                        return Err(FeedError::ConnectionTimeout);
                    }
                    debug!("Feed quiet, sending keepalive ping");
                    self.client.ping().await?;
                    ping_sent = true;
                    liveness.as_mut().reset(last_frame + recv_timeout);
                }
                _ = tick.tick() => {
                    self.process_tick().await?;
                }
            }
        }
    }

    /// Route a single WebSocket message
    pub async fn process_message(&mut self, raw: &str) -> Result<()> {
        match ParsedMessage::parse(raw)? {
            ParsedMessage::Event(event) => self.handle_event(event).await,
            ParsedMessage::Snapshot { product, update } => {
                if product != self.selected {
                    debug!(product = %product, "Snapshot for unselected product ignored");
                    return Ok(());
                }
                info!(
                    product = %product,
                    bids = update.bids.len(),
                    asks = update.asks.len(),
                    "Snapshot received"
                );
                self.sequencer.push_snapshot(update);
                self.state.metrics.pending_updates.set(self.sequencer.pending() as i64);
                Ok(())
            }
            ParsedMessage::Delta { product, update } => {
                if product != self.selected {
                    trace!(product = %product, "Delta for unselected product ignored");
                    return Ok(());
                }
                match self.sequencer.push_delta(update) {
                    Ok(PushOutcome::Queued) => {
                        self.state.metrics.pending_updates.set(self.sequencer.pending() as i64);
                        Ok(())
                    }
                    Ok(outcome) => {
                        trace!(outcome = ?outcome, "Delta not queued");
                        Ok(())
                    }
                    Err(FeedError::SequencerOverflow { discarded, .. }) => {
                        self.state.metrics.resyncs.inc();
                        self.state.metrics.discarded_updates.inc_by(discarded as u64);
                        self.state.metrics.pending_updates.set(0);
                        self.request_resync().await
                    }
                    Err(e) => Err(e),
                }
            }
            ParsedMessage::Unknown(msg) => {
                trace!(msg = %msg, "Unknown message type");
                Ok(())
            }
        }
    }

    /// Apply queued updates and publish if anything changed
    pub async fn process_tick(&mut self) -> Result<usize> {
        let (applied, book_state) = {
            let mut book = self.state.book.write().await;
            let mut consumer = CountingConsumer {
                book: &mut *book,
                metrics: &self.state.metrics,
            };
            let applied = self
                .sequencer
                .drain(&mut consumer, self.state.config.updates_per_tick.max(1));

            self.state.metrics.pending_updates.set(self.sequencer.pending() as i64);
            self.state.metrics.bid_levels.set(book.bids().len() as i64);
            self.state.metrics.ask_levels.set(book.asks().len() as i64);

            if applied == 0 || !book.is_initialized() {
                (applied, None)
            } else {
                let state = book.state(self.state.config.visible_rows, self.state.config.depth_policy);
                (applied, Some(state))
            }
        };

        if let Some(state) = book_state {
            self.state.publisher.publish(&state).await?;
        }
        Ok(applied)
    }

    async fn handle_event(&mut self, event: FeedEvent) -> Result<()> {
        match event {
            FeedEvent::Info { version } => {
                info!(version = ?version, "Feed info");
                Ok(())
            }
            FeedEvent::Subscribed { product } => {
                info!(product = ?product, "Subscribed");
                let confirmed = match (product, self.subscription) {
                    (Some(product), _) => product,
                    (None, Subscription::Requested(product)) => product,
                    (None, _) => self.selected,
                };
                self.subscription = Subscription::Live(confirmed);
                if confirmed != self.selected {
                    // selection changed while the subscribe was in flight
                    self.resubscribe().await?;
                }
                Ok(())
            }
            FeedEvent::Unsubscribed { product } => {
                info!(product = ?product, "Unsubscribed");
                if matches!(self.subscription, Subscription::Requested(_)) {
                    return Ok(());
                }
                self.subscription = Subscription::Idle;
                if self.sequencer.is_active() && self.client.is_connected() {
                    self.subscribe().await?;
                }
                Ok(())
            }
            FeedEvent::Alert { message } => {
                warn!(message = %message, "Feed alert");
                Ok(())
            }
            FeedEvent::Error { message } => Err(FeedError::SubscriptionError(message)),
            FeedEvent::Other(name) => {
                debug!(event = %name, "Unhandled feed event");
                Ok(())
            }
        }
    }

    /// Ask for a fresh snapshot after the queue overflowed
    async fn request_resync(&mut self) -> Result<()> {
        warn!(product = %self.selected, "Resubscribing for a fresh snapshot");
        self.resubscribe().await
    }

    /// Subscribe to the selected product
    async fn subscribe(&mut self) -> Result<()> {
        self.client
            .send_request(&SubscriptionRequest::subscribe(self.selected))
            .await?;
        self.subscription = Subscription::Requested(self.selected);
        Ok(())
    }

    /// Cycle the server-side subscription onto the selected product
    ///
    /// At most one subscribe or unsubscribe is outstanding at a time; whatever
    /// is in flight is reconciled when the server confirms it.
    async fn resubscribe(&mut self) -> Result<()> {
        match self.subscription {
            Subscription::Live(product) => {
                self.client
                    .send_request(&SubscriptionRequest::unsubscribe(product))
                    .await?;
                self.subscription = Subscription::Releasing;
                Ok(())
            }
            Subscription::Requested(product) => {
                debug!(product = %product, "Subscribe in flight, reconciling on confirmation");
                Ok(())
            }
            Subscription::Releasing => Ok(()),
            Subscription::Idle => self.subscribe().await,
        }
    }

    /// Change the selected product; the book waits for the new product's snapshot
    async fn select_product(&mut self, product: Product) {
        info!(from = %self.selected, to = %product, "Switching product");
        let dropped = self.sequencer.resync();
        self.state.metrics.discarded_updates.inc_by(dropped as u64);
        self.selected = product;
        self.state.book.write().await.reset(product.as_str());
    }

    async fn deactivate(&mut self, reason: &str) {
        info!(reason = %reason, "Deactivating feed");
        if let Subscription::Live(product) | Subscription::Requested(product) = self.subscription {
            if let Err(e) = self
                .client
                .send_request(&SubscriptionRequest::unsubscribe(product))
                .await
            {
                debug!(error = %e, "Unsubscribe on deactivation failed");
            }
        }
        self.end_session().await;
    }

    async fn end_session(&mut self) {
        let dropped = self.sequencer.deactivate();
        self.state.metrics.discarded_updates.inc_by(dropped as u64);
        self.state.metrics.pending_updates.set(0);
        self.subscription = Subscription::Idle;
        self.client.close().await;
    }
}
