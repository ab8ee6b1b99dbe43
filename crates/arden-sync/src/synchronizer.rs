//! The synchronizer event loop.
//!
//! One owned task per synchronizer serializes every input (peer messages,
//! view-holder events, timer firings) through a single bounded queue, so no
//! handler ever races another. Outbound traffic goes to the network
//! controller and the view holder over their own channels; neither send
//! blocks on the wire.

use crate::{
    DeliveryTracker, ModifierStatus, ModifiersCache, SyncConfig, SyncError, SyncResult,
    SyncTracker, EVENT_QUEUE_SIZE,
};
use arden_network::{
    InvData, Message, MessageType, ModifierItem, ModifierRequest, ModifiersData, NetworkCommand,
    PeerId, PenaltyHandler, SendTarget,
};
use arden_types::{
    Block, Modifier, ModifierId, ModifierRegistry, ModifierType, SyncInfo, Transaction,
    MODIFIER_ID_LENGTH,
};
use arden_view::{ChainComparison, HistoryReader, MempoolReader};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, trace, warn};

/// Shared read handle to the out-of-order modifiers cache.
pub type CacheHandle = Arc<RwLock<ModifiersCache>>;

/// Everything the synchronizer consumes, in one variant.
///
/// Peer messages, view-holder notifications and timer firings all enter
/// through the same bounded queue and are handled one at a time.
#[derive(Debug)]
pub enum SyncEvent {
    /// A gossip message arrived from a peer.
    DataFromPeer {
        /// Sending peer.
        peer: PeerId,
        /// The decoded message.
        message: Message,
    },
    /// A peer completed its handshake.
    HandshakedPeer {
        /// The new peer.
        peer: PeerId,
    },
    /// A peer disconnected.
    DisconnectedPeer {
        /// The departed peer.
        peer: PeerId,
    },
    /// The view holder accepted a transaction into the mempool.
    SuccessfulTransaction {
        /// The applied transaction.
        tx: Transaction,
    },
    /// The view holder rejected a transaction.
    FailedTransaction {
        /// The rejected transaction.
        tx: Transaction,
    },
    /// A block passed syntactic validation and was applied.
    SyntacticallySuccessfulModifier {
        /// The applied block.
        block: Block,
    },
    /// A block failed syntactic validation.
    SyntacticallyFailedModification {
        /// The rejected block.
        block: Block,
    },
    /// A block passed semantic validation.
    SemanticallySuccessfulModifier {
        /// The validated block.
        block: Block,
    },
    /// A block failed semantic validation.
    SemanticallyFailedModification {
        /// The rejected block.
        block: Block,
    },
    /// The view holder published a fresh history read handle.
    ChangedHistory {
        /// The new handle.
        reader: Arc<dyn HistoryReader>,
    },
    /// The view holder published a fresh mempool read handle.
    ChangedMempool {
        /// The new handle.
        reader: Arc<dyn MempoolReader>,
    },
    /// Some local component wants a modifier fetched from the network.
    DownloadRequest {
        /// Modifier type tag.
        type_id: u8,
        /// Wanted id.
        id: ModifierId,
    },
    /// Periodic tick: send our chain summary to eligible peers.
    SendLocalSyncInfo,
    /// Delivery timer fired for a requested modifier.
    CheckDelivery {
        /// Peer the request was pinned to when the timer was armed.
        peer: Option<PeerId>,
        /// Modifier type tag.
        type_id: u8,
        /// The id whose delivery is overdue.
        id: ModifierId,
    },
}

/// Commands the synchronizer sends to the view holder.
#[derive(Debug)]
pub enum ViewCommand {
    /// A transaction parsed from the wire, ready for mempool validation.
    LocallyGeneratedTransaction(Transaction),
    /// Cache membership changed; the view holder may pull applicable blocks.
    ChangedCache(CacheHandle),
    /// Bootstrap request for the initial reader handles.
    GetNodeViewChanges {
        /// Request a history reader.
        history: bool,
        /// Request a state reader.
        state: bool,
        /// Request a vault reader.
        vault: bool,
        /// Request a mempool reader.
        mempool: bool,
    },
}

/// The node view synchronizer.
pub struct Synchronizer {
    config: SyncConfig,
    registry: ModifierRegistry,
    delivery: DeliveryTracker,
    sync_tracker: SyncTracker,
    cache: CacheHandle,
    history: Option<Arc<dyn HistoryReader>>,
    mempool: Option<Arc<dyn MempoolReader>>,
    penalties: Arc<dyn PenaltyHandler>,
    network_tx: mpsc::Sender<NetworkCommand>,
    view_tx: mpsc::Sender<ViewCommand>,
    event_rx: Option<mpsc::Receiver<SyncEvent>>,
}

impl Synchronizer {
    /// Create a synchronizer and the sender half of its event queue.
    pub fn new(
        config: SyncConfig,
        registry: ModifierRegistry,
        penalties: Arc<dyn PenaltyHandler>,
        network_tx: mpsc::Sender<NetworkCommand>,
        view_tx: mpsc::Sender<ViewCommand>,
    ) -> (Self, mpsc::Sender<SyncEvent>) {
        let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE_SIZE);
        let delivery = DeliveryTracker::new(&config, event_tx.clone());
        let sync_tracker = SyncTracker::new(&config);
        let cache = Arc::new(RwLock::new(ModifiersCache::new(
            config.max_modifiers_cache_size,
        )));

        let synchronizer = Self {
            config,
            registry,
            delivery,
            sync_tracker,
            cache,
            history: None,
            mempool: None,
            penalties,
            network_tx,
            view_tx,
            event_rx: Some(event_rx),
        };
        (synchronizer, event_tx)
    }

    /// The delivery tracker.
    pub fn delivery(&self) -> &DeliveryTracker {
        &self.delivery
    }

    /// The per-peer sync tracker.
    pub fn sync_tracker(&self) -> &SyncTracker {
        &self.sync_tracker
    }

    /// Shared handle to the out-of-order cache.
    pub fn cache(&self) -> CacheHandle {
        Arc::clone(&self.cache)
    }

    /// Take the inbound event queue to drive the synchronizer manually
    /// instead of through [`Synchronizer::run`].
    pub fn take_event_receiver(&mut self) -> Option<mpsc::Receiver<SyncEvent>> {
        self.event_rx.take()
    }

    /// Announce the message codes we handle and ask the view holder for the
    /// initial reader handles.
    pub async fn register(&self) -> SyncResult<()> {
        self.network_tx
            .send(NetworkCommand::RegisterMessagesHandler {
                codes: vec![
                    MessageType::SyncInfo as u8,
                    MessageType::Inv as u8,
                    MessageType::RequestModifier as u8,
                    MessageType::Modifier as u8,
                ],
            })
            .await
            .map_err(|_| SyncError::NetworkChannelClosed)?;
        self.send_to_view(ViewCommand::GetNodeViewChanges {
            history: true,
            state: false,
            vault: false,
            mempool: true,
        })
        .await
    }

    /// Run the event loop until the queue closes.
    pub async fn run(mut self) -> SyncResult<()> {
        self.register().await?;

        let Some(mut event_rx) = self.event_rx.take() else {
            debug!("event receiver already taken, nothing to run");
            return Ok(());
        };
        let mut sync_ticker = tokio::time::interval(self.config.sync_interval);

        loop {
            tokio::select! {
                maybe_event = event_rx.recv() => match maybe_event {
                    Some(event) => self.handle_event(event).await?,
                    None => break,
                },
                _ = sync_ticker.tick() => {
                    self.handle_event(SyncEvent::SendLocalSyncInfo).await?;
                }
            }
        }

        debug!("event queue closed, synchronizer stopping");
        Ok(())
    }

    /// Handle one inbound event.
    pub async fn handle_event(&mut self, event: SyncEvent) -> SyncResult<()> {
        match event {
            SyncEvent::DataFromPeer { peer, message } => match message {
                Message::SyncInfo(info) => self.on_sync_info(peer, info).await?,
                Message::Inv(inv) => self.on_inv(peer, inv).await?,
                Message::RequestModifier(req) => self.on_request_modifiers(peer, req).await?,
                Message::Modifier(data) => self.on_modifiers(peer, data).await?,
            },
            SyncEvent::HandshakedPeer { peer } => {
                self.sync_tracker
                    .update_status(peer, ChainComparison::Unknown);
            }
            SyncEvent::DisconnectedPeer { peer } => {
                self.sync_tracker.clear_status(&peer);
                self.delivery.clear_peer(&peer);
            }
            SyncEvent::SuccessfulTransaction { tx } => {
                let id = tx.id();
                self.delivery.to_applied(&id);
                self.send_inv(
                    ModifierType::Transaction.to_byte(),
                    vec![id],
                    SendTarget::Broadcast,
                )
                .await?;
            }
            SyncEvent::FailedTransaction { tx } => {
                self.delivery.to_unknown(&tx.id());
            }
            SyncEvent::SyntacticallySuccessfulModifier { block } => {
                let id = block.id();
                // An applied block must not linger in the cache.
                self.cache.write().remove(&id);
                self.delivery.to_applied(&id);
            }
            SyncEvent::SyntacticallyFailedModification { block } => {
                self.delivery.to_unknown(&block.id());
            }
            SyncEvent::SemanticallySuccessfulModifier { block } => {
                self.send_inv(
                    ModifierType::Block.to_byte(),
                    vec![block.id()],
                    SendTarget::Broadcast,
                )
                .await?;
            }
            SyncEvent::SemanticallyFailedModification { block } => {
                // Policy hook: no penalty is attached to semantic failures yet.
                trace!(id = %block.id(), "semantically failed modification");
            }
            SyncEvent::ChangedHistory { reader } => {
                debug!("history reader updated");
                self.history = Some(reader);
            }
            SyncEvent::ChangedMempool { reader } => {
                debug!("mempool reader updated");
                self.mempool = Some(reader);
            }
            SyncEvent::DownloadRequest { type_id, id } => {
                self.on_download_request(type_id, id).await?;
            }
            SyncEvent::SendLocalSyncInfo => {
                self.on_send_sync_info().await?;
            }
            SyncEvent::CheckDelivery { peer, type_id, id } => {
                self.on_check_delivery(peer, type_id, id).await?;
            }
        }
        Ok(())
    }

    /// A peer told us about its chain.
    async fn on_sync_info(&mut self, peer: PeerId, info: SyncInfo) -> SyncResult<()> {
        let Some(history) = self.history.clone() else {
            warn!(peer = %peer, "sync info arrived before history reader is available");
            return Ok(());
        };

        let comparison = history.compare(&info);
        debug!(peer = %peer, comparison = %comparison, "peer chain comparison");
        self.sync_tracker.update_status(peer.clone(), comparison);

        match comparison {
            ChainComparison::Younger => {
                match history.continuation_ids(&info, self.config.max_inv_objects) {
                    Some(ids) if !ids.is_empty() => {
                        let mut by_type: BTreeMap<u8, Vec<ModifierId>> = BTreeMap::new();
                        for (type_id, id) in ids {
                            by_type.entry(type_id.to_byte()).or_default().push(id);
                        }
                        for (type_id, ids) in by_type {
                            self.send_inv(type_id, ids, SendTarget::ToPeer(peer.clone()))
                                .await?;
                        }
                    }
                    _ => {
                        warn!(peer = %peer, "peer is behind but no continuation was found");
                    }
                }
            }
            ChainComparison::Nonsense => {
                // Policy hook: log only, no penalty for incomparable summaries.
                warn!(peer = %peer, "nonsense chain summary from peer");
            }
            _ => {}
        }
        Ok(())
    }

    /// A peer announced modifiers; request the ones we do not know.
    async fn on_inv(&mut self, peer: PeerId, inv: InvData) -> SyncResult<()> {
        let is_tx = inv.type_id == ModifierType::Transaction.to_byte();
        let applied: Box<dyn Fn(&ModifierId) -> bool> = if is_tx {
            let Some(mempool) = self.mempool.clone() else {
                warn!(peer = %peer, "inv arrived before mempool reader is available");
                return Ok(());
            };
            Box::new(move |id| mempool.contains(id))
        } else {
            let Some(history) = self.history.clone() else {
                warn!(peer = %peer, "inv arrived before history reader is available");
                return Ok(());
            };
            Box::new(move |id| history.contains(id))
        };

        let mut unknown: Vec<ModifierId> = Vec::new();
        for id in &inv.ids {
            if self.delivery.status(id, &applied) == ModifierStatus::Unknown {
                unknown.push(*id);
            }
        }
        if unknown.is_empty() {
            return Ok(());
        }
        if unknown.len() > self.config.max_inv_objects {
            warn!(
                count = unknown.len(),
                max = self.config.max_inv_objects,
                "truncating modifier request"
            );
            unknown.truncate(self.config.max_inv_objects);
        }

        debug!(peer = %peer, type_id = inv.type_id, count = unknown.len(),
               "requesting announced modifiers");
        self.delivery.expect(&peer, inv.type_id, &unknown, &applied);
        self.send_request(inv.type_id, unknown, SendTarget::ToPeer(peer))
            .await
    }

    /// A peer asked for modifiers; serve what we have, silently omitting the
    /// rest.
    async fn on_request_modifiers(&mut self, peer: PeerId, req: ModifierRequest) -> SyncResult<()> {
        let is_tx = req.type_id == ModifierType::Transaction.to_byte();
        let objects: Vec<(ModifierId, Vec<u8>)> = if is_tx {
            let Some(mempool) = &self.mempool else {
                warn!(peer = %peer, "request arrived before mempool reader is available");
                return Ok(());
            };
            mempool
                .get_all(&req.ids)
                .into_iter()
                .map(|tx| (tx.id(), tx.to_bytes()))
                .collect()
        } else {
            let Some(history) = &self.history else {
                warn!(peer = %peer, "request arrived before history reader is available");
                return Ok(());
            };
            req.ids
                .iter()
                .filter_map(|id| history.modifier_by_id(id).map(|b| (*id, b.to_bytes())))
                .collect()
        };

        if objects.is_empty() {
            debug!(peer = %peer, type_id = req.type_id, "nothing to serve for request");
            return Ok(());
        }

        let total = objects.len();
        let mut items = Vec::new();
        let mut size = 2usize;
        for (id, data) in objects {
            let item_len = MODIFIER_ID_LENGTH + 5 + data.len();
            if size + item_len > self.config.max_packet_size {
                break;
            }
            size += item_len;
            items.push(ModifierItem { id, data });
        }
        if items.len() < total {
            warn!(
                served = items.len(),
                total, "modifiers response truncated to fit packet limit"
            );
        }
        if items.is_empty() {
            return Ok(());
        }

        debug!(peer = %peer, type_id = req.type_id, count = items.len(), "serving modifiers");
        self.send_to_network(
            Message::Modifier(ModifiersData {
                type_id: req.type_id,
                modifiers: items,
            }),
            SendTarget::ToPeer(peer),
        )
        .await
    }

    /// A peer delivered modifier payloads.
    async fn on_modifiers(&mut self, peer: PeerId, data: ModifiersData) -> SyncResult<()> {
        let Some(parser) = self.registry.parser(data.type_id) else {
            error!(type_id = data.type_id, "no serializer registered for modifier type");
            return Ok(());
        };

        debug!(peer = %peer, type_id = data.type_id, count = data.modifiers.len(),
               "modifiers from peer");

        let mut accepted = Vec::new();
        let mut spam = Vec::new();
        for item in data.modifiers {
            if self.delivery.on_receive(data.type_id, &item.id, &peer) {
                accepted.push(item);
            } else {
                spam.push(item.id);
            }
        }
        if !spam.is_empty() {
            warn!(peer = %peer, count = spam.len(), first = %spam[0],
                  "unrequested modifiers from peer");
            self.penalties.penalize_spamming_peer(&peer);
        }

        let is_tx = data.type_id == ModifierType::Transaction.to_byte();
        let mut cache_changed = false;
        for item in accepted {
            match parser(&item.data) {
                Ok(modifier) => {
                    let computed = modifier.id();
                    if computed != item.id {
                        warn!(peer = %peer, declared = %item.id, computed = %computed,
                              "modifier id mismatch");
                        self.penalties.penalize_misbehaving_peer(&peer);
                        self.delivery.to_unknown(&item.id);
                        continue;
                    }
                    match modifier {
                        Modifier::Transaction(tx) => {
                            self.send_to_view(ViewCommand::LocallyGeneratedTransaction(tx))
                                .await?;
                        }
                        Modifier::Block(block) => {
                            if self.process_expected_modifier(&peer, item.id, block) {
                                cache_changed = true;
                            }
                        }
                    }
                }
                Err(e) => {
                    warn!(peer = %peer, id = %item.id, error = %e, "malformed modifier");
                    self.penalties.penalize_misbehaving_peer(&peer);
                    self.delivery.to_unknown(&item.id);
                }
            }
        }

        if !is_tx {
            let evicted = self.cache.write().clean_overfull();
            if !evicted.is_empty() {
                debug!(count = evicted.len(), "evicted overfull cache entries");
                for (id, _) in &evicted {
                    self.delivery.to_unknown(id);
                }
                cache_changed = true;
            }
            if cache_changed {
                self.send_to_view(ViewCommand::ChangedCache(Arc::clone(&self.cache)))
                    .await?;
            }
        }
        Ok(())
    }

    /// Decide what to do with an expected persistent modifier: reject what is
    /// already known, invalidate permanent failures, cache the rest until its
    /// dependencies arrive. Returns whether the cache gained an entry.
    fn process_expected_modifier(&mut self, peer: &PeerId, id: ModifierId, block: Block) -> bool {
        let Some(history) = &self.history else {
            warn!(id = %id, "block arrived before history reader is available");
            self.delivery.to_unknown(&id);
            return false;
        };

        if self.cache.read().contains(&id) || history.contains(&id) {
            error!(peer = %peer, id = %id, "received modifier is already known");
            return false;
        }

        match history.applicable_try(&block) {
            Err(e) if e.is_permanent() => {
                warn!(peer = %peer, id = %id, error = %e, "permanently invalid modifier");
                self.delivery.to_invalid(&id);
                self.penalties.penalize_misbehaving_peer(peer);
                false
            }
            _ => {
                self.cache.write().put(id, block);
                self.delivery.to_held(&id);
                true
            }
        }
    }

    /// Local request to fetch a modifier from whoever has it.
    async fn on_download_request(&mut self, type_id: u8, id: ModifierId) -> SyncResult<()> {
        let Some(history) = self.history.clone() else {
            warn!(id = %id, "download request before history reader is available");
            return Ok(());
        };
        if self.delivery.status(&id, |i| history.contains(i)) == ModifierStatus::Unknown {
            self.request_download(type_id, vec![id]).await?;
        }
        Ok(())
    }

    /// Periodic tick: send our chain summary to eligible peers.
    async fn on_send_sync_info(&mut self) -> SyncResult<()> {
        let Some(history) = &self.history else {
            return Ok(());
        };
        let peers = self.sync_tracker.peers_to_sync_with();
        if peers.is_empty() {
            return Ok(());
        }

        debug!(count = peers.len(), "sending local chain summary");
        let info = history.sync_info();
        for peer in &peers {
            self.sync_tracker.mark_sync_sent(peer);
        }
        self.send_to_network(Message::SyncInfo(info), SendTarget::ToPeers(peers))
            .await
    }

    /// Delivery timer fired: retry against the expected peer, fall back to an
    /// untargeted request, or give the id up.
    async fn on_check_delivery(
        &mut self,
        _armed_for: Option<PeerId>,
        type_id: u8,
        id: ModifierId,
    ) -> SyncResult<()> {
        if !self.delivery.is_requested(&id) {
            // Cancelled timer that fired anyway.
            trace!(id = %id, "stale delivery check");
            return Ok(());
        }

        // Consult the tracker, not the timer payload: the peer may have
        // disconnected since the timer was armed.
        match self.delivery.expected_peer(&id) {
            Some(peer) => {
                debug!(peer = %peer, id = %id, "requested modifier not delivered in time");
                self.penalties.penalize_non_delivering_peer(&peer);
                match self.delivery.reexpect(Some(&peer), type_id, &id) {
                    Ok(()) => {
                        self.send_request(type_id, vec![id], SendTarget::ToPeer(peer))
                            .await?;
                    }
                    Err(_) => {
                        debug!(id = %id, "delivery attempts exhausted, forgetting modifier");
                    }
                }
            }
            None => {
                self.request_download(type_id, vec![id]).await?;
            }
        }
        Ok(())
    }

    /// Re-expect each id without a pinned peer and request the survivors from
    /// a random peer.
    async fn request_download(&mut self, type_id: u8, ids: Vec<ModifierId>) -> SyncResult<()> {
        let mut survivors = Vec::new();
        for id in ids {
            match self.delivery.reexpect(None, type_id, &id) {
                Ok(()) => survivors.push(id),
                Err(e) => debug!(id = %id, error = %e, "not re-requesting modifier"),
            }
        }
        if survivors.is_empty() {
            return Ok(());
        }
        self.send_request(type_id, survivors, SendTarget::Random)
            .await
    }

    async fn send_inv(
        &self,
        type_id: u8,
        mut ids: Vec<ModifierId>,
        target: SendTarget,
    ) -> SyncResult<()> {
        if ids.len() > self.config.max_inv_objects {
            warn!(
                count = ids.len(),
                max = self.config.max_inv_objects,
                "truncating inventory"
            );
            ids.truncate(self.config.max_inv_objects);
        }
        self.send_to_network(Message::Inv(InvData { type_id, ids }), target)
            .await
    }

    async fn send_request(
        &self,
        type_id: u8,
        mut ids: Vec<ModifierId>,
        target: SendTarget,
    ) -> SyncResult<()> {
        if ids.len() > self.config.max_inv_objects {
            warn!(
                count = ids.len(),
                max = self.config.max_inv_objects,
                "truncating modifier request"
            );
            ids.truncate(self.config.max_inv_objects);
        }
        self.send_to_network(Message::RequestModifier(ModifierRequest { type_id, ids }), target)
            .await
    }

    async fn send_to_network(&self, message: Message, target: SendTarget) -> SyncResult<()> {
        self.network_tx
            .send(NetworkCommand::SendMessage { message, target })
            .await
            .map_err(|_| SyncError::NetworkChannelClosed)
    }

    async fn send_to_view(&self, command: ViewCommand) -> SyncResult<()> {
        self.view_tx
            .send(command)
            .await
            .map_err(|_| SyncError::ViewChannelClosed)
    }
}
