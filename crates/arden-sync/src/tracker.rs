//! Per-peer sync status tracking.

use crate::SyncConfig;
use arden_network::PeerId;
use arden_view::ChainComparison;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Tracks how each connected peer's chain compares to ours and when we last
/// sent it our chain summary.
#[derive(Debug)]
pub struct SyncTracker {
    statuses: HashMap<PeerId, ChainComparison>,
    last_sync_sent: HashMap<PeerId, Instant>,
    sync_interval: Duration,
    sync_status_refresh: Duration,
}

impl SyncTracker {
    /// Create a tracker with the configured send gating.
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            statuses: HashMap::new(),
            last_sync_sent: HashMap::new(),
            sync_interval: config.sync_interval,
            sync_status_refresh: config.sync_status_refresh,
        }
    }

    /// Record the comparison status of a peer, inserting it if new.
    pub fn update_status(&mut self, peer: PeerId, status: ChainComparison) {
        debug!(peer = %peer, status = %status, "peer sync status");
        self.statuses.insert(peer, status);
    }

    /// Remove a peer on disconnect.
    pub fn clear_status(&mut self, peer: &PeerId) {
        self.statuses.remove(peer);
        self.last_sync_sent.remove(peer);
    }

    /// Current comparison status of a peer.
    pub fn status_of(&self, peer: &PeerId) -> Option<ChainComparison> {
        self.statuses.get(peer).copied()
    }

    /// Number of tracked peers.
    pub fn peer_count(&self) -> usize {
        self.statuses.len()
    }

    /// Peers eligible for a chain-summary send this tick.
    ///
    /// A peer we never synced is always eligible. Otherwise the hard minimum
    /// gap must have elapsed, and peers already known to be `Equal` or
    /// `Younger` additionally wait out the full sync interval.
    pub fn peers_to_sync_with(&self) -> Vec<PeerId> {
        let mut eligible: Vec<PeerId> = self
            .statuses
            .iter()
            .filter(|(peer, status)| match self.last_sync_sent.get(*peer) {
                None => true,
                Some(sent) => {
                    let elapsed = sent.elapsed();
                    elapsed >= self.sync_status_refresh
                        && (matches!(
                            status,
                            ChainComparison::Unknown | ChainComparison::Older
                        ) || elapsed >= self.sync_interval)
                }
            })
            .map(|(peer, _)| (*peer).clone())
            .collect();
        eligible.sort();
        eligible
    }

    /// Record an outbound summary to a peer.
    pub fn mark_sync_sent(&mut self, peer: &PeerId) {
        self.last_sync_sent.insert(peer.clone(), Instant::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(n: u8) -> PeerId {
        PeerId::from_bytes(vec![n; 4])
    }

    fn config(refresh_secs: u64) -> SyncConfig {
        SyncConfig {
            sync_interval: Duration::from_secs(refresh_secs),
            sync_status_refresh: Duration::from_secs(refresh_secs),
            ..SyncConfig::default()
        }
    }

    #[test]
    fn test_status_upsert_and_clear() {
        let mut tracker = SyncTracker::new(&config(10));

        tracker.update_status(peer(1), ChainComparison::Unknown);
        tracker.update_status(peer(1), ChainComparison::Older);
        assert_eq!(tracker.status_of(&peer(1)), Some(ChainComparison::Older));
        assert_eq!(tracker.peer_count(), 1);

        tracker.clear_status(&peer(1));
        assert_eq!(tracker.status_of(&peer(1)), None);
        assert_eq!(tracker.peer_count(), 0);
    }

    #[test]
    fn test_new_peers_are_eligible_immediately() {
        let mut tracker = SyncTracker::new(&config(3600));

        tracker.update_status(peer(2), ChainComparison::Unknown);
        tracker.update_status(peer(1), ChainComparison::Unknown);

        assert_eq!(tracker.peers_to_sync_with(), vec![peer(1), peer(2)]);
    }

    #[test]
    fn test_recently_synced_peers_are_gated() {
        let mut tracker = SyncTracker::new(&config(3600));

        tracker.update_status(peer(1), ChainComparison::Unknown);
        tracker.mark_sync_sent(&peer(1));

        assert!(tracker.peers_to_sync_with().is_empty());
    }

    #[test]
    fn test_elapsed_gap_restores_eligibility() {
        let mut tracker = SyncTracker::new(&config(0));

        tracker.update_status(peer(1), ChainComparison::Equal);
        tracker.mark_sync_sent(&peer(1));

        // With a zero gap every known peer is immediately eligible again.
        assert_eq!(tracker.peers_to_sync_with(), vec![peer(1)]);
    }
}
