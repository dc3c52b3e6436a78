//! Update sequencer
//!
//! Buffers incoming feed updates and hands them to the book one at a time in
//! arrival order. Also tracks whether the feed is active, since queued
//! updates only make sense for the subscription they arrived on.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{FeedError, Result};
use crate::orderbook::{BookConsumer, BookUpdate};

/// Default bound on queued updates before a resync is forced
pub const DEFAULT_MAX_PENDING: usize = 4096;

/// Connection lifecycle as seen by the sequencer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Inactive,
    Active,
}

/// A queued update
#[derive(Debug, Clone, PartialEq)]
pub enum FeedUpdate {
    Snapshot(BookUpdate),
    Delta(BookUpdate),
}

/// What happened to a pushed update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Feed is inactive
    IgnoredInactive,
    /// No snapshot seen since activation or the last resync
    IgnoredAwaitingSnapshot,
}

/// FIFO of pending updates gated by the connection state
#[derive(Debug)]
pub struct UpdateSequencer {
    state: ConnectionState,
    pending: VecDeque<FeedUpdate>,
    awaiting_snapshot: bool,
    max_pending: usize,
    applied: u64,
    discarded: u64,
}

impl Default for UpdateSequencer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PENDING)
    }
}

impl UpdateSequencer {
    /// Create an inactive sequencer holding at most `max_pending` deltas
    pub fn new(max_pending: usize) -> Self {
        Self {
            state: ConnectionState::Inactive,
            pending: VecDeque::new(),
            awaiting_snapshot: true,
            max_pending: max_pending.max(1),
            applied: 0,
            discarded: 0,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state == ConnectionState::Active
    }

    pub fn is_awaiting_snapshot(&self) -> bool {
        self.awaiting_snapshot
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Total updates handed to a consumer
    pub fn applied(&self) -> u64 {
        self.applied
    }

    /// Total updates dropped by deactivation, activation or overflow
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    /// Inactive to active. Starts from a clean queue and waits for a snapshot.
    ///
    /// Returns false if already active.
    pub fn activate(&mut self) -> bool {
        if self.is_active() {
            return false;
        }
        let stale = self.clear();
        self.state = ConnectionState::Active;
        self.awaiting_snapshot = true;
        info!(discarded = stale, "Sequencer activated");
        true
    }

    /// Active to inactive. Queued updates are discarded, not flushed.
    ///
    /// Returns the number of discarded updates.
    pub fn deactivate(&mut self) -> usize {
        if !self.is_active() {
            return 0;
        }
        let dropped = self.clear();
        self.state = ConnectionState::Inactive;
        info!(discarded = dropped, "Sequencer deactivated");
        dropped
    }

    /// Drop everything queued and wait for a fresh snapshot
    pub fn resync(&mut self) -> usize {
        let dropped = self.clear();
        self.awaiting_snapshot = true;
        dropped
    }

    /// Queue a snapshot. Snapshots are never refused while active.
    pub fn push_snapshot(&mut self, update: BookUpdate) -> PushOutcome {
        if !self.is_active() {
            return PushOutcome::IgnoredInactive;
        }
        self.awaiting_snapshot = false;
        self.pending.push_back(FeedUpdate::Snapshot(update));
        PushOutcome::Queued
    }

    /// Queue a delta
    ///
    /// Fails with [`FeedError::SequencerOverflow`] when the queue is full. The
    /// queue is cleared at that point and later deltas are ignored until the
    /// next snapshot.
    pub fn push_delta(&mut self, update: BookUpdate) -> Result<PushOutcome> {
        if !self.is_active() {
            return Ok(PushOutcome::IgnoredInactive);
        }
        if self.awaiting_snapshot {
            debug!(levels = update.len(), "Delta before snapshot ignored");
            return Ok(PushOutcome::IgnoredAwaitingSnapshot);
        }
        if self.pending.len() >= self.max_pending {
            let dropped = self.resync();
            warn!(
                capacity = self.max_pending,
                discarded = dropped,
                "Update queue overflow, awaiting resync"
            );
            return Err(FeedError::SequencerOverflow {
                capacity: self.max_pending,
                discarded: dropped,
            });
        }
        self.pending.push_back(FeedUpdate::Delta(update));
        Ok(PushOutcome::Queued)
    }

    /// Apply the oldest queued update. Returns false if nothing was queued or
    /// the feed is inactive.
    pub fn tick<C: BookConsumer + ?Sized>(&mut self, consumer: &mut C) -> bool {
        if !self.is_active() {
            return false;
        }
        match self.pending.pop_front() {
            Some(FeedUpdate::Snapshot(update)) => consumer.apply_snapshot(&update),
            Some(FeedUpdate::Delta(update)) => consumer.apply_delta(&update),
            None => return false,
        }
        self.applied += 1;
        true
    }

    /// Apply up to `max` queued updates in order. Returns how many were applied.
    pub fn drain<C: BookConsumer + ?Sized>(&mut self, consumer: &mut C, max: usize) -> usize {
        let mut count = 0;
        while count < max && self.tick(consumer) {
            count += 1;
        }
        count
    }

    fn clear(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        self.discarded += dropped as u64;
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orderbook::{MockBookConsumer, OrderBook};
    use mockall::Sequence;

    fn delta(price: f64, size: f64) -> BookUpdate {
        BookUpdate::from_pairs(&[(price, size)], &[])
    }

    fn active_with_snapshot() -> UpdateSequencer {
        let mut sequencer = UpdateSequencer::new(8);
        sequencer.activate();
        sequencer.push_snapshot(BookUpdate::from_pairs(&[(1.0, 1.0)], &[(2.0, 1.0)]));
        sequencer
    }

    #[test]
    fn test_starts_inactive_and_ignores_pushes() {
        let mut sequencer = UpdateSequencer::default();
        assert_eq!(sequencer.state(), ConnectionState::Inactive);
        assert_eq!(
            sequencer.push_snapshot(BookUpdate::default()),
            PushOutcome::IgnoredInactive
        );
        assert_eq!(
            sequencer.push_delta(delta(1.0, 1.0)).unwrap(),
            PushOutcome::IgnoredInactive
        );
        assert_eq!(sequencer.pending(), 0);
    }

    #[test]
    fn test_applies_in_arrival_order_one_per_tick() {
        let mut sequencer = active_with_snapshot();
        for size in [1.0, 2.0, 3.0] {
            sequencer.push_delta(delta(1.0, size)).unwrap();
        }

        let mut consumer = MockBookConsumer::new();
        let mut seq = Sequence::new();
        consumer
            .expect_apply_snapshot()
            .times(1)
            .in_sequence(&mut seq)
            .return_const(());
        for size in [1.0, 2.0, 3.0] {
            consumer
                .expect_apply_delta()
                .withf(move |u| u.bids[0].size == size)
                .times(1)
                .in_sequence(&mut seq)
                .return_const(());
        }

        for remaining in [3, 2, 1, 0] {
            assert!(sequencer.tick(&mut consumer));
            assert_eq!(sequencer.pending(), remaining);
        }
        assert!(!sequencer.tick(&mut consumer));
        assert_eq!(sequencer.applied(), 4);
    }

    #[test]
    fn test_deltas_before_snapshot_are_ignored() {
        let mut sequencer = UpdateSequencer::new(8);
        sequencer.activate();

        assert_eq!(
            sequencer.push_delta(delta(1.0, 1.0)).unwrap(),
            PushOutcome::IgnoredAwaitingSnapshot
        );
        assert_eq!(sequencer.pending(), 0);
    }

    #[test]
    fn test_deactivate_discards_pending() {
        let mut sequencer = active_with_snapshot();
        sequencer.push_delta(delta(1.0, 2.0)).unwrap();

        assert_eq!(sequencer.deactivate(), 2);
        assert_eq!(sequencer.pending(), 0);
        assert_eq!(sequencer.discarded(), 2);

        let mut consumer = MockBookConsumer::new();
        consumer.expect_apply_snapshot().never();
        consumer.expect_apply_delta().never();
        assert!(!sequencer.tick(&mut consumer));
    }

    #[test]
    fn test_reactivation_requires_fresh_snapshot() {
        let mut sequencer = active_with_snapshot();
        sequencer.deactivate();

        assert!(sequencer.activate());
        assert!(!sequencer.activate());
        assert!(sequencer.is_awaiting_snapshot());
        assert_eq!(
            sequencer.push_delta(delta(1.0, 1.0)).unwrap(),
            PushOutcome::IgnoredAwaitingSnapshot
        );
    }

    #[test]
    fn test_overflow_forces_resync() {
        let mut sequencer = UpdateSequencer::new(2);
        sequencer.activate();
        sequencer.push_snapshot(BookUpdate::default());
        sequencer.push_delta(delta(1.0, 1.0)).unwrap();

        let err = sequencer.push_delta(delta(1.0, 2.0)).unwrap_err();
        assert!(matches!(
            err,
            FeedError::SequencerOverflow {
                capacity: 2,
                discarded: 2
            }
        ));
        assert_eq!(sequencer.pending(), 0);
        assert!(sequencer.is_awaiting_snapshot());

        // the queue stays shut until the resync snapshot arrives
        assert_eq!(
            sequencer.push_delta(delta(1.0, 3.0)).unwrap(),
            PushOutcome::IgnoredAwaitingSnapshot
        );
        assert_eq!(
            sequencer.push_snapshot(BookUpdate::default()),
            PushOutcome::Queued
        );
        assert_eq!(
            sequencer.push_delta(delta(1.0, 4.0)).unwrap(),
            PushOutcome::Queued
        );
    }

    #[test]
    fn test_overflow_reports_everything_dropped() {
        let mut sequencer = UpdateSequencer::new(2);
        sequencer.activate();
        sequencer.push_snapshot(BookUpdate::default());
        sequencer.push_delta(delta(1.0, 1.0)).unwrap();
        // snapshots go past the bound
        sequencer.push_snapshot(BookUpdate::default());
        assert_eq!(sequencer.pending(), 3);

        match sequencer.push_delta(delta(1.0, 2.0)) {
            Err(FeedError::SequencerOverflow { capacity, discarded }) => {
                assert_eq!(capacity, 2);
                assert_eq!(discarded, 3);
            }
            other => panic!("expected overflow, got {:?}", other),
        }
        assert_eq!(sequencer.discarded(), 3);
    }

    #[test]
    fn test_drain_respects_limit_and_order() {
        let mut sequencer = active_with_snapshot();
        sequencer.push_delta(delta(1.0, 5.0)).unwrap();
        sequencer.push_delta(delta(0.5, 2.0)).unwrap();
        sequencer.push_delta(delta(1.0, 0.0)).unwrap();

        let mut book = OrderBook::new("PI_XBTUSD");
        assert_eq!(sequencer.drain(&mut book, 2), 2);
        assert_eq!(book.view().bids[0].size, 5.0);
        assert_eq!(sequencer.pending(), 2);

        assert_eq!(sequencer.drain(&mut book, 10), 2);
        let view = book.view();
        assert_eq!(view.bids.len(), 1);
        assert_eq!(view.bids[0].price, 0.5);
        assert_eq!(view.asks[0].total, 1.0);
    }
}
