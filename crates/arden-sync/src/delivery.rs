//! Per-modifier delivery tracking.
//!
//! The tracker records which modifier ids are awaiting delivery, from whom,
//! and how many attempts have been made. Each expectation arms a timer task
//! that delivers a [`SyncEvent::CheckDelivery`] back into the synchronizer's
//! queue; the synchronizer decides whether to retry or give up. A timer that
//! fires after its id moved on finds the id no longer `Requested` and the
//! check is a no-op.

use crate::{SyncConfig, SyncError, SyncEvent, SyncResult};
use arden_network::PeerId;
use arden_types::ModifierId;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::trace;

/// Lifecycle states of a modifier id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModifierStatus {
    /// Not seen, or forgotten.
    Unknown,
    /// An outstanding request has been sent.
    Requested,
    /// Arrived from a peer and passed framing; awaits application.
    Received,
    /// In the out-of-order cache awaiting dependencies.
    Held,
    /// Known to the local view (history or mempool).
    Applied,
    /// Permanently rejected.
    Invalid,
}

#[derive(Debug)]
struct RequestedInfo {
    attempts: u32,
    peer: Option<PeerId>,
    timer: JoinHandle<()>,
}

#[derive(Debug)]
enum Entry {
    Requested(RequestedInfo),
    Received,
    Held,
    Invalid,
}

impl Entry {
    fn cancel_timer(&self) {
        if let Entry::Requested(info) = self {
            info.timer.abort();
        }
    }
}

/// Tracks delivery state for every modifier id in flight.
#[derive(Debug)]
pub struct DeliveryTracker {
    entries: HashMap<ModifierId, Entry>,
    event_tx: mpsc::Sender<SyncEvent>,
    delivery_timeout: Duration,
    max_delivery_checks: u32,
}

impl DeliveryTracker {
    /// Create a tracker delivering check signals on `event_tx`.
    pub fn new(config: &SyncConfig, event_tx: mpsc::Sender<SyncEvent>) -> Self {
        Self {
            entries: HashMap::new(),
            event_tx,
            delivery_timeout: config.delivery_timeout,
            max_delivery_checks: config.max_delivery_checks,
        }
    }

    /// Status of an id, falling back to the applied-membership check for
    /// ids the tracker has no record of.
    pub fn status<F>(&self, id: &ModifierId, applied: F) -> ModifierStatus
    where
        F: FnOnce(&ModifierId) -> bool,
    {
        match self.entries.get(id) {
            Some(Entry::Requested(_)) => ModifierStatus::Requested,
            Some(Entry::Received) => ModifierStatus::Received,
            Some(Entry::Held) => ModifierStatus::Held,
            Some(Entry::Invalid) => ModifierStatus::Invalid,
            None => {
                if applied(id) {
                    ModifierStatus::Applied
                } else {
                    ModifierStatus::Unknown
                }
            }
        }
    }

    /// Start expecting `ids` of `type_id` from `peer`.
    ///
    /// Only ids whose status is `Unknown` or `Invalid` transition to
    /// `Requested`; everything else is left alone.
    pub fn expect<F>(&mut self, peer: &PeerId, type_id: u8, ids: &[ModifierId], applied: F)
    where
        F: Fn(&ModifierId) -> bool,
    {
        for id in ids {
            match self.status(id, &applied) {
                ModifierStatus::Unknown | ModifierStatus::Invalid => {
                    let timer = self.arm_timer(Some(peer.clone()), type_id, *id);
                    if let Some(old) = self.entries.insert(
                        *id,
                        Entry::Requested(RequestedInfo {
                            attempts: 1,
                            peer: Some(peer.clone()),
                            timer,
                        }),
                    ) {
                        old.cancel_timer();
                    }
                }
                other => {
                    trace!(id = %id, status = ?other, "not expecting modifier");
                }
            }
        }
    }

    /// Bump the attempt count for `id` and re-arm its timer.
    ///
    /// A `peer` of `None` preserves any existing expected peer. An id the
    /// tracker has no record of becomes `Requested` with one attempt. When
    /// the attempt budget is used up the id is forgotten and an error is
    /// returned.
    pub fn reexpect(
        &mut self,
        peer: Option<&PeerId>,
        type_id: u8,
        id: &ModifierId,
    ) -> SyncResult<()> {
        enum Probe {
            Fresh,
            Bump,
            Exhausted,
            NotRequested,
        }

        let probe = match self.entries.get(id) {
            None => Probe::Fresh,
            Some(Entry::Requested(info)) => {
                if info.attempts < self.max_delivery_checks {
                    Probe::Bump
                } else {
                    Probe::Exhausted
                }
            }
            Some(_) => Probe::NotRequested,
        };

        match probe {
            Probe::Fresh => {
                let timer = self.arm_timer(peer.cloned(), type_id, *id);
                self.entries.insert(
                    *id,
                    Entry::Requested(RequestedInfo {
                        attempts: 1,
                        peer: peer.cloned(),
                        timer,
                    }),
                );
                Ok(())
            }
            Probe::Bump => {
                let event_tx = self.event_tx.clone();
                let timeout = self.delivery_timeout;
                if let Some(Entry::Requested(info)) = self.entries.get_mut(id) {
                    info.attempts += 1;
                    if let Some(p) = peer {
                        info.peer = Some(p.clone());
                    }
                    info.timer.abort();
                    info.timer =
                        Self::spawn_timer(event_tx, timeout, info.peer.clone(), type_id, *id);
                }
                Ok(())
            }
            Probe::Exhausted => {
                if let Some(entry) = self.entries.remove(id) {
                    entry.cancel_timer();
                }
                Err(SyncError::DeliveryAttemptsExhausted(*id))
            }
            Probe::NotRequested => Err(SyncError::NotRequested(*id)),
        }
    }

    /// Record an arrival. Returns `true` when the id was `Requested` and the
    /// sender matches the expected peer (or no peer was pinned); the timer is
    /// cancelled and the id becomes `Received`. Returns `false` otherwise,
    /// classifying the arrival as spam.
    pub fn on_receive(&mut self, _type_id: u8, id: &ModifierId, peer: &PeerId) -> bool {
        let expected = matches!(
            self.entries.get(id),
            Some(Entry::Requested(info)) if info.peer.as_ref().map_or(true, |p| p == peer)
        );
        if !expected {
            return false;
        }
        if let Some(old) = self.entries.insert(*id, Entry::Received) {
            old.cancel_timer();
        }
        true
    }

    /// Forget the id entirely; its status becomes `Applied` via the reader
    /// fallback once the view contains it.
    pub fn to_applied(&mut self, id: &ModifierId) {
        if let Some(entry) = self.entries.remove(id) {
            entry.cancel_timer();
        }
    }

    /// Forget the id entirely; its status reverts to `Unknown`.
    pub fn to_unknown(&mut self, id: &ModifierId) {
        if let Some(entry) = self.entries.remove(id) {
            entry.cancel_timer();
        }
    }

    /// Mark the id permanently rejected.
    pub fn to_invalid(&mut self, id: &ModifierId) {
        if let Some(old) = self.entries.insert(*id, Entry::Invalid) {
            old.cancel_timer();
        }
    }

    /// Mark the id as held in the out-of-order cache.
    pub fn to_held(&mut self, id: &ModifierId) {
        if let Some(old) = self.entries.insert(*id, Entry::Held) {
            old.cancel_timer();
        }
    }

    /// Whether the id is currently awaiting delivery.
    pub fn is_requested(&self, id: &ModifierId) -> bool {
        matches!(self.entries.get(id), Some(Entry::Requested(_)))
    }

    /// The peer a requested id is pinned to, if any.
    pub fn expected_peer(&self, id: &ModifierId) -> Option<PeerId> {
        match self.entries.get(id) {
            Some(Entry::Requested(info)) => info.peer.clone(),
            _ => None,
        }
    }

    /// Attempt count of a requested id.
    pub fn attempts(&self, id: &ModifierId) -> Option<u32> {
        match self.entries.get(id) {
            Some(Entry::Requested(info)) => Some(info.attempts),
            _ => None,
        }
    }

    /// Unpin every expectation targeting a disconnected peer.
    ///
    /// The ids stay `Requested`; their next delivery check falls into the
    /// untargeted re-request branch.
    pub fn clear_peer(&mut self, peer: &PeerId) {
        for entry in self.entries.values_mut() {
            if let Entry::Requested(info) = entry {
                if info.peer.as_ref() == Some(peer) {
                    info.peer = None;
                }
            }
        }
    }

    fn arm_timer(&self, peer: Option<PeerId>, type_id: u8, id: ModifierId) -> JoinHandle<()> {
        Self::spawn_timer(
            self.event_tx.clone(),
            self.delivery_timeout,
            peer,
            type_id,
            id,
        )
    }

    fn spawn_timer(
        event_tx: mpsc::Sender<SyncEvent>,
        timeout: Duration,
        peer: Option<PeerId>,
        type_id: u8,
        id: ModifierId,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            let _ = event_tx
                .send(SyncEvent::CheckDelivery { peer, type_id, id })
                .await;
        })
    }
}
