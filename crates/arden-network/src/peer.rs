//! Peer identity and bookkeeping.

use crate::penalties::{PenaltyHandler, PenaltyReason};
use crate::scoring::PeerScore;
use dashmap::DashMap;
use parking_lot::RwLock;
use rand::seq::SliceRandom;
use std::collections::HashSet;
use std::net::SocketAddr;
use tracing::{debug, warn};

/// Stable identity of a connected peer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(pub Vec<u8>);

impl PeerId {
    /// Create from raw bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Create from a socket address.
    pub fn from_addr(addr: &SocketAddr) -> Self {
        Self(format!("{}", addr).into_bytes())
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(s) => write!(f, "{}", s),
            Err(_) => write!(f, "{}", hex::encode(&self.0)),
        }
    }
}

/// The set of currently connected peers.
///
/// Maintained by the network controller; used to resolve broadcast and
/// random-peer send targets.
#[derive(Debug, Default)]
pub struct ConnectedPeers {
    peers: RwLock<HashSet<PeerId>>,
}

impl ConnectedPeers {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a peer as connected.
    pub fn add(&self, peer: PeerId) {
        self.peers.write().insert(peer);
    }

    /// Remove a disconnected peer.
    pub fn remove(&self, peer: &PeerId) {
        self.peers.write().remove(peer);
    }

    /// Whether the peer is currently connected.
    pub fn contains(&self, peer: &PeerId) -> bool {
        self.peers.read().contains(peer)
    }

    /// All connected peers.
    pub fn all(&self) -> Vec<PeerId> {
        self.peers.read().iter().cloned().collect()
    }

    /// Number of connected peers.
    pub fn len(&self) -> usize {
        self.peers.read().len()
    }

    /// Whether no peers are connected.
    pub fn is_empty(&self) -> bool {
        self.peers.read().is_empty()
    }

    /// A uniformly random connected peer, if any.
    pub fn random(&self) -> Option<PeerId> {
        let peers: Vec<_> = self.peers.read().iter().cloned().collect();
        peers.choose(&mut rand::thread_rng()).cloned()
    }
}

/// Per-peer penalty ledger: the default [`PenaltyHandler`].
///
/// Records decaying scores without disconnecting anyone; the peer manager
/// reads the scores and applies graduated consequences.
#[derive(Debug, Default)]
pub struct PeerBook {
    scores: DashMap<PeerId, PeerScore>,
}

impl PeerBook {
    /// Empty book.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a penalty to a peer, creating its entry if needed.
    pub fn penalize(&self, peer: &PeerId, reason: PenaltyReason) {
        let mut score = self.scores.entry(peer.clone()).or_default();
        let over_threshold = score.apply_penalty(reason);
        if over_threshold {
            warn!(peer = %peer, reason = %reason, penalty = score.current_penalty(),
                  "peer penalty over threshold");
        } else {
            debug!(peer = %peer, reason = %reason, penalty = score.current_penalty(),
                   "penalized peer");
        }
    }

    /// Current decayed penalty of a peer.
    pub fn penalty_of(&self, peer: &PeerId) -> u32 {
        self.scores
            .get(peer)
            .map(|s| s.current_penalty())
            .unwrap_or(0)
    }

    /// Whether the peer's decayed penalty is over the ban threshold.
    pub fn over_threshold(&self, peer: &PeerId) -> bool {
        self.scores
            .get(peer)
            .map(|s| s.over_threshold())
            .unwrap_or(false)
    }

    /// Drop a peer's ledger entry.
    pub fn forget(&self, peer: &PeerId) {
        self.scores.remove(peer);
    }
}

impl PenaltyHandler for PeerBook {
    fn penalize_spamming_peer(&self, peer: &PeerId) {
        self.penalize(peer, PenaltyReason::SpamDetected);
    }

    fn penalize_misbehaving_peer(&self, peer: &PeerId) {
        self.penalize(peer, PenaltyReason::Misbehavior);
    }

    fn penalize_non_delivering_peer(&self, peer: &PeerId) {
        self.penalize(peer, PenaltyReason::NonDelivery);
    }
}
