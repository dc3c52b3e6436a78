//! Prometheus instruments for the feed

use prometheus::{IntCounter, IntGauge, Opts, Registry};

/// Counters and gauges updated by the feed manager
#[derive(Clone)]
pub struct FeedMetrics {
    pub snapshots: IntCounter,
    pub deltas: IntCounter,
    pub discarded_updates: IntCounter,
    pub resyncs: IntCounter,
    pub reconnects: IntCounter,
    pub pending_updates: IntGauge,
    pub bid_levels: IntGauge,
    pub ask_levels: IntGauge,
}

impl FeedMetrics {
    /// Create the instruments and register them with `registry`
    pub fn register(registry: &Registry) -> prometheus::Result<Self> {
        let metrics = Self {
            snapshots: IntCounter::with_opts(Opts::new(
                "depth_ladder_snapshots_total",
                "Snapshots applied to the book",
            ))?,
            deltas: IntCounter::with_opts(Opts::new(
                "depth_ladder_deltas_total",
                "Delta batches applied to the book",
            ))?,
            discarded_updates: IntCounter::with_opts(Opts::new(
                "depth_ladder_discarded_updates_total",
                "Queued updates dropped on deactivation or overflow",
            ))?,
            resyncs: IntCounter::with_opts(Opts::new(
                "depth_ladder_resyncs_total",
                "Resubscriptions forced by queue overflow",
            ))?,
            reconnects: IntCounter::with_opts(Opts::new(
                "depth_ladder_reconnects_total",
                "WebSocket reconnection attempts",
            ))?,
            pending_updates: IntGauge::with_opts(Opts::new(
                "depth_ladder_pending_updates",
                "Updates waiting in the sequencer",
            ))?,
            bid_levels: IntGauge::with_opts(Opts::new(
                "depth_ladder_bid_levels",
                "Bid levels held",
            ))?,
            ask_levels: IntGauge::with_opts(Opts::new(
                "depth_ladder_ask_levels",
                "Ask levels held",
            ))?,
        };

        registry.register(Box::new(metrics.snapshots.clone()))?;
        registry.register(Box::new(metrics.deltas.clone()))?;
        registry.register(Box::new(metrics.discarded_updates.clone()))?;
        registry.register(Box::new(metrics.resyncs.clone()))?;
        registry.register(Box::new(metrics.reconnects.clone()))?;
        registry.register(Box::new(metrics.pending_updates.clone()))?;
        registry.register(Box::new(metrics.bid_levels.clone()))?;
        registry.register(Box::new(metrics.ask_levels.clone()))?;

        Ok(metrics)
    }

    /// Instruments attached to a private registry, for tests and tools
    pub fn unregistered() -> prometheus::Result<Self> {
        Self::register(&Registry::new())
    }
}
