//! Test harness for synchronizer integration tests.
//!
//! The harness owns both ends the synchronizer normally talks to: it injects
//! events the way the network controller and view holder would, and captures
//! everything the synchronizer sends back. Timer events land in the same
//! queue a running synchronizer would drain; tests pump them explicitly so
//! every step is observable.

use arden_network::{Message, NetworkCommand, PeerId, PenaltyHandler, SendTarget};
use arden_sync::{SyncConfig, SyncEvent, Synchronizer, ViewCommand};
use arden_types::ModifierRegistry;
use arden_view::{HistoryReader, MemoryHistory, MemoryMempool, MempoolReader};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Penalty handler that records every call for later assertions.
#[derive(Debug, Default)]
pub struct RecordingPenalties {
    spamming: Mutex<Vec<PeerId>>,
    misbehaving: Mutex<Vec<PeerId>>,
    non_delivering: Mutex<Vec<PeerId>>,
}

impl RecordingPenalties {
    /// Peers penalized for spam, in call order.
    pub fn spamming(&self) -> Vec<PeerId> {
        self.spamming.lock().clone()
    }

    /// Peers penalized for misbehavior, in call order.
    pub fn misbehaving(&self) -> Vec<PeerId> {
        self.misbehaving.lock().clone()
    }

    /// Peers penalized for non-delivery, in call order.
    pub fn non_delivering(&self) -> Vec<PeerId> {
        self.non_delivering.lock().clone()
    }
}

impl PenaltyHandler for RecordingPenalties {
    fn penalize_misbehaving_peer(&self, peer: &PeerId) {
        self.misbehaving.lock().push(peer.clone());
    }

    fn penalize_spamming_peer(&self, peer: &PeerId) {
        self.spamming.lock().push(peer.clone());
    }

    fn penalize_non_delivering_peer(&self, peer: &PeerId) {
        self.non_delivering.lock().push(peer.clone());
    }
}

/// A synchronizer wired to scripted collaborators.
pub struct SyncHarness {
    /// The synchronizer under test.
    pub synchronizer: Synchronizer,
    /// Sender half of the synchronizer's event queue.
    pub event_tx: mpsc::Sender<SyncEvent>,
    /// Receiver half of the event queue; timer events arrive here.
    pub event_rx: mpsc::Receiver<SyncEvent>,
    /// Commands the synchronizer sent to the network controller.
    pub network_rx: mpsc::Receiver<NetworkCommand>,
    /// Commands the synchronizer sent to the view holder.
    pub view_rx: mpsc::Receiver<ViewCommand>,
    /// The history behind the installed reader handle.
    pub history: Arc<MemoryHistory>,
    /// The mempool behind the installed reader handle.
    pub mempool: Arc<MemoryMempool>,
    /// Recorded penalties.
    pub penalties: Arc<RecordingPenalties>,
}

impl SyncHarness {
    /// Harness with default configuration.
    pub async fn new() -> Self {
        Self::with_config(SyncConfig::default()).await
    }

    /// Harness with a custom configuration. Reader handles for a fresh
    /// in-memory history and mempool are installed before returning.
    pub async fn with_config(config: SyncConfig) -> Self {
        let (network_tx, network_rx) = mpsc::channel(256);
        let (view_tx, view_rx) = mpsc::channel(256);
        let penalties = Arc::new(RecordingPenalties::default());

        let (mut synchronizer, event_tx) = Synchronizer::new(
            config,
            ModifierRegistry::standard(),
            Arc::clone(&penalties) as Arc<dyn PenaltyHandler>,
            network_tx,
            view_tx,
        );
        let event_rx = synchronizer
            .take_event_receiver()
            .expect("fresh synchronizer has its event queue");

        let mut harness = Self {
            synchronizer,
            event_tx,
            event_rx,
            network_rx,
            view_rx,
            history: Arc::new(MemoryHistory::new()),
            mempool: Arc::new(MemoryMempool::new()),
            penalties,
        };
        harness
            .deliver(SyncEvent::ChangedHistory {
                reader: Arc::clone(&harness.history) as Arc<dyn HistoryReader>,
            })
            .await;
        harness
            .deliver(SyncEvent::ChangedMempool {
                reader: Arc::clone(&harness.mempool) as Arc<dyn MempoolReader>,
            })
            .await;
        harness
    }

    /// Feed one event straight into the synchronizer.
    pub async fn deliver(&mut self, event: SyncEvent) {
        self.synchronizer
            .handle_event(event)
            .await
            .expect("event handler failed");
    }

    /// Handshake a peer.
    pub async fn connect(&mut self, peer: &PeerId) {
        self.deliver(SyncEvent::HandshakedPeer { peer: peer.clone() })
            .await;
    }

    /// Deliver a gossip message from a peer.
    pub async fn peer_message(&mut self, peer: &PeerId, message: Message) {
        self.deliver(SyncEvent::DataFromPeer {
            peer: peer.clone(),
            message,
        })
        .await;
    }

    /// Wait for the next queued event (typically a timer firing) and feed it
    /// to the synchronizer.
    pub async fn pump_queued_event(&mut self) {
        let event = self
            .event_rx
            .recv()
            .await
            .expect("event queue stays open while the harness lives");
        self.deliver(event).await;
    }

    /// All pending network commands.
    pub fn drain_network(&mut self) -> Vec<NetworkCommand> {
        let mut commands = Vec::new();
        while let Ok(command) = self.network_rx.try_recv() {
            commands.push(command);
        }
        commands
    }

    /// All pending outbound messages with their targets.
    pub fn sent_messages(&mut self) -> Vec<(Message, SendTarget)> {
        self.drain_network()
            .into_iter()
            .filter_map(|command| match command {
                NetworkCommand::SendMessage { message, target } => Some((message, target)),
                NetworkCommand::RegisterMessagesHandler { .. } => None,
            })
            .collect()
    }

    /// All pending view-holder commands.
    pub fn drain_view(&mut self) -> Vec<ViewCommand> {
        let mut commands = Vec::new();
        while let Ok(command) = self.view_rx.try_recv() {
            commands.push(command);
        }
        commands
    }

    /// Play the view holder's pull loop: apply every cached block that has
    /// become applicable, emitting the success event for each.
    pub async fn apply_applicable(&mut self) {
        loop {
            let next = {
                let cache = self.synchronizer.cache();
                let mut cache = cache.write();
                cache.find_applicable(self.history.as_ref())
            };
            match next {
                Some(block) => {
                    self.history
                        .apply(block.clone())
                        .expect("applicable block applies");
                    self.deliver(SyncEvent::SyntacticallySuccessfulModifier { block })
                        .await;
                }
                None => break,
            }
        }
    }
}
