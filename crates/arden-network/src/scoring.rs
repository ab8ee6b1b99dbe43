//! Decaying per-peer penalty score.

use crate::penalties::{Penalties, PenaltyReason};
use std::time::Instant;

/// Accumulated peer penalty with time decay.
#[derive(Debug, Clone)]
pub struct PeerScore {
    /// Accumulated penalty points (0 to MAX_PENALTY).
    penalty: u32,
    /// Last time the penalty was updated, for decay calculation.
    last_penalty_time: Instant,
}

impl Default for PeerScore {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerScore {
    /// A clean score.
    pub fn new() -> Self {
        Self {
            penalty: 0,
            last_penalty_time: Instant::now(),
        }
    }

    /// Current penalty after decay.
    ///
    /// Penalties decay at [`Penalties::DECAY_PER_MINUTE`].
    pub fn current_penalty(&self) -> u32 {
        let minutes_elapsed = self.last_penalty_time.elapsed().as_secs() / 60;
        let decay = (minutes_elapsed as u32).saturating_mul(Penalties::DECAY_PER_MINUTE);
        self.penalty.saturating_sub(decay)
    }

    /// Apply a penalty.
    ///
    /// Returns `true` if the decayed score is now over the threshold.
    pub fn apply_penalty(&mut self, reason: PenaltyReason) -> bool {
        let current = self.current_penalty();
        self.penalty = current
            .saturating_add(reason.penalty())
            .min(Penalties::MAX_PENALTY);
        self.last_penalty_time = Instant::now();
        self.over_threshold()
    }

    /// Whether the decayed score is over the threshold.
    pub fn over_threshold(&self) -> bool {
        self.current_penalty() >= Penalties::PENALTY_THRESHOLD
    }
}
