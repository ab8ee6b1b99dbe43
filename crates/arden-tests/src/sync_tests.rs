//! End-to-end synchronizer scenarios.
//!
//! Each test drives the synchronizer through its event queue exactly the way
//! the network controller and view holder would, and asserts on the outbound
//! traffic, the tracked delivery state, and the recorded penalties.

use crate::generators::{
    block_child, block_inv, block_modifiers, block_request, chain, peer, raw_block_modifiers,
    raw_id, tx, tx_modifiers,
};
use crate::harness::SyncHarness;
use arden_network::{InvData, Message, ModifierRequest, SendTarget};
use arden_sync::{ModifierStatus, SyncConfig, SyncEvent, ViewCommand};
use arden_types::{ModifierType, SyncInfo};
use arden_view::{HistoryReader, MempoolReader};
use std::time::Duration;

fn retry_config() -> SyncConfig {
    SyncConfig {
        delivery_timeout: Duration::from_millis(100),
        max_delivery_checks: 2,
        ..SyncConfig::default()
    }
}

// ============================================================================
// Inventory handling
// ============================================================================

#[tokio::test]
async fn test_inv_from_peer_requests_only_unknown_ids() {
    let mut harness = SyncHarness::new().await;
    let blocks = chain(&harness.history, 2);
    let p = peer(1);
    harness.connect(&p).await;

    let c = raw_id(0xC1);
    let d = raw_id(0xD1);
    harness
        .peer_message(&p, block_inv(vec![blocks[0].id(), c, d]))
        .await;

    let sent = harness.sent_messages();
    assert_eq!(sent.len(), 1);
    match &sent[0] {
        (Message::RequestModifier(req), SendTarget::ToPeer(to)) => {
            assert_eq!(req.type_id, ModifierType::Block.to_byte());
            assert_eq!(req.ids, vec![c, d]);
            assert_eq!(to, &p);
        }
        other => panic!("unexpected outbound: {:?}", other),
    }

    let delivery = harness.synchronizer.delivery();
    for id in [c, d] {
        assert_eq!(delivery.status(&id, |_| false), ModifierStatus::Requested);
        assert_eq!(delivery.expected_peer(&id), Some(p.clone()));
    }
    // The known id was not re-requested.
    assert_eq!(
        delivery.status(&blocks[0].id(), |i| harness.history.contains(i)),
        ModifierStatus::Applied
    );
}

#[tokio::test]
async fn test_inv_with_nothing_new_sends_nothing() {
    let mut harness = SyncHarness::new().await;
    let blocks = chain(&harness.history, 2);
    let p = peer(1);
    harness.connect(&p).await;

    harness
        .peer_message(&p, block_inv(vec![blocks[0].id(), blocks[1].id()]))
        .await;

    assert!(harness.sent_messages().is_empty());
}

#[tokio::test]
async fn test_oversized_inv_request_is_truncated() {
    let mut harness = SyncHarness::with_config(SyncConfig {
        max_inv_objects: 2,
        ..SyncConfig::default()
    })
    .await;
    let p = peer(1);
    harness.connect(&p).await;

    harness
        .peer_message(&p, block_inv(vec![raw_id(1), raw_id(2), raw_id(3)]))
        .await;

    let sent = harness.sent_messages();
    match &sent[0] {
        (Message::RequestModifier(req), _) => assert_eq!(req.ids.len(), 2),
        other => panic!("unexpected outbound: {:?}", other),
    }
    // Only the requested ids are tracked.
    assert!(harness.synchronizer.delivery().is_requested(&raw_id(1)));
    assert!(harness.synchronizer.delivery().is_requested(&raw_id(2)));
    assert!(!harness.synchronizer.delivery().is_requested(&raw_id(3)));
}

// ============================================================================
// Delivery timeouts and retries
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_timeout_retries_then_drops() {
    let mut harness = SyncHarness::with_config(retry_config()).await;
    let p = peer(1);
    harness.connect(&p).await;

    let c = raw_id(0xC2);
    harness.peer_message(&p, block_inv(vec![c])).await;
    harness.drain_network();

    // First timeout: penalize and retry against the same peer.
    harness.pump_queued_event().await;
    assert_eq!(harness.penalties.non_delivering(), vec![p.clone()]);
    assert_eq!(harness.synchronizer.delivery().attempts(&c), Some(2));
    let sent = harness.sent_messages();
    assert!(
        matches!(&sent[..], [(Message::RequestModifier(req), SendTarget::ToPeer(to))]
            if req.ids == vec![c] && to == &p)
    );

    // Second timeout: attempts are exhausted, the id is forgotten.
    harness.pump_queued_event().await;
    assert_eq!(
        harness.synchronizer.delivery().status(&c, |_| false),
        ModifierStatus::Unknown
    );
    assert!(harness.sent_messages().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_received_modifier_cancels_delivery_check() {
    let mut harness = SyncHarness::with_config(retry_config()).await;
    let blocks = chain(&harness.history, 1);
    let p = peer(1);
    harness.connect(&p).await;

    let block = block_child(blocks[0].id(), 2, 0x11);
    harness.peer_message(&p, block_inv(vec![block.id()])).await;
    harness.peer_message(&p, block_modifiers(&[block])).await;

    tokio::time::advance(Duration::from_secs(1)).await;
    // The armed timer was cancelled; nothing fires.
    assert!(harness.event_rx.try_recv().is_err());
    assert!(harness.penalties.non_delivering().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_unpins_request_and_falls_back_to_random() {
    let mut harness = SyncHarness::with_config(retry_config()).await;
    let p = peer(1);
    harness.connect(&p).await;

    let c = raw_id(0xC3);
    harness.peer_message(&p, block_inv(vec![c])).await;
    harness.drain_network();

    harness
        .deliver(SyncEvent::DisconnectedPeer { peer: p.clone() })
        .await;
    assert_eq!(harness.synchronizer.delivery().expected_peer(&c), None);

    // The pending check finds no expected peer and re-requests untargeted.
    harness.pump_queued_event().await;
    assert!(harness.penalties.non_delivering().is_empty());
    let sent = harness.sent_messages();
    assert!(
        matches!(&sent[..], [(Message::RequestModifier(req), SendTarget::Random)]
            if req.ids == vec![c])
    );
}

#[tokio::test(start_paused = true)]
async fn test_download_request_goes_to_random_peer() {
    let mut harness = SyncHarness::with_config(retry_config()).await;

    let id = raw_id(0xAB);
    harness
        .deliver(SyncEvent::DownloadRequest {
            type_id: ModifierType::Block.to_byte(),
            id,
        })
        .await;

    let sent = harness.sent_messages();
    assert!(
        matches!(&sent[..], [(Message::RequestModifier(req), SendTarget::Random)]
            if req.ids == vec![id])
    );
    assert_eq!(harness.synchronizer.delivery().attempts(&id), Some(1));
    assert_eq!(harness.synchronizer.delivery().expected_peer(&id), None);

    // Retry stays untargeted, then the attempt budget runs out.
    harness.pump_queued_event().await;
    assert_eq!(harness.synchronizer.delivery().attempts(&id), Some(2));
    harness.drain_network();

    harness.pump_queued_event().await;
    assert_eq!(
        harness.synchronizer.delivery().status(&id, |_| false),
        ModifierStatus::Unknown
    );
    assert!(harness.sent_messages().is_empty());
}

#[tokio::test]
async fn test_download_request_for_applied_id_is_ignored() {
    let mut harness = SyncHarness::new().await;
    let blocks = chain(&harness.history, 1);

    harness
        .deliver(SyncEvent::DownloadRequest {
            type_id: ModifierType::Block.to_byte(),
            id: blocks[0].id(),
        })
        .await;

    assert!(harness.sent_messages().is_empty());
}

// ============================================================================
// Spam and malformed modifiers
// ============================================================================

#[tokio::test]
async fn test_unrequested_modifier_is_spam() {
    let mut harness = SyncHarness::new().await;
    let q = peer(2);
    harness.connect(&q).await;

    let stray = block_child(raw_id(0xEE), 7, 0x42);
    harness.peer_message(&q, block_modifiers(&[stray.clone()])).await;

    assert_eq!(harness.penalties.spamming(), vec![q]);
    // Nothing was forwarded to the view holder or cached.
    assert!(harness.drain_view().is_empty());
    assert!(!harness.synchronizer.cache().read().contains(&stray.id()));
    assert_eq!(
        harness
            .synchronizer
            .delivery()
            .status(&stray.id(), |_| false),
        ModifierStatus::Unknown
    );
}

#[tokio::test]
async fn test_modifiers_payload_is_processed_once() {
    let mut harness = SyncHarness::new().await;
    let blocks = chain(&harness.history, 1);
    let p = peer(1);
    harness.connect(&p).await;

    let block = block_child(blocks[0].id(), 2, 0x21);
    harness.peer_message(&p, block_inv(vec![block.id()])).await;
    harness.drain_network();

    let payload = block_modifiers(&[block.clone()]);
    harness.peer_message(&p, payload.clone()).await;
    assert!(harness.penalties.spamming().is_empty());
    assert!(harness.synchronizer.cache().read().contains(&block.id()));

    // The identical payload again is classified entirely as spam.
    harness.peer_message(&p, payload).await;
    assert_eq!(harness.penalties.spamming(), vec![p]);
    assert_eq!(harness.synchronizer.cache().read().len(), 1);
}

#[tokio::test]
async fn test_id_mismatch_penalizes_and_forgets() {
    let mut harness = SyncHarness::new().await;
    let r = peer(3);
    harness.connect(&r).await;

    let y = raw_id(0x77);
    harness.peer_message(&r, block_inv(vec![y])).await;
    harness.drain_network();

    // Bytes parse to a block whose computed id differs from the declared one.
    let other = block_child(raw_id(0x88), 5, 0x55);
    harness
        .peer_message(&r, raw_block_modifiers(vec![(y, other.to_bytes())]))
        .await;

    assert_eq!(harness.penalties.misbehaving(), vec![r]);
    assert_eq!(
        harness.synchronizer.delivery().status(&y, |_| false),
        ModifierStatus::Unknown
    );
    assert!(harness.synchronizer.cache().read().is_empty());
}

#[tokio::test]
async fn test_unparseable_modifier_penalizes_and_forgets() {
    let mut harness = SyncHarness::new().await;
    let r = peer(3);
    harness.connect(&r).await;

    let z = raw_id(0x78);
    harness.peer_message(&r, block_inv(vec![z])).await;
    harness.drain_network();

    harness
        .peer_message(&r, raw_block_modifiers(vec![(z, vec![1, 2, 3])]))
        .await;

    assert_eq!(harness.penalties.misbehaving(), vec![r]);
    assert_eq!(
        harness.synchronizer.delivery().status(&z, |_| false),
        ModifierStatus::Unknown
    );
}

#[tokio::test]
async fn test_permanently_invalid_block_is_marked_invalid() {
    let mut harness = SyncHarness::new().await;
    let blocks = chain(&harness.history, 1);
    let r = peer(3);
    harness.connect(&r).await;

    // Correct parent, impossible height: a permanent applicability failure.
    let bogus = block_child(blocks[0].id(), 40, 0x66);
    harness.peer_message(&r, block_inv(vec![bogus.id()])).await;
    harness.drain_network();
    harness.peer_message(&r, block_modifiers(&[bogus.clone()])).await;

    assert_eq!(harness.penalties.misbehaving(), vec![r]);
    assert_eq!(
        harness
            .synchronizer
            .delivery()
            .status(&bogus.id(), |_| false),
        ModifierStatus::Invalid
    );
    assert!(harness.synchronizer.cache().read().is_empty());
}

// ============================================================================
// Out-of-order application
// ============================================================================

#[tokio::test]
async fn test_out_of_order_blocks_wait_in_cache_until_applicable() {
    let mut harness = SyncHarness::new().await;
    let blocks = chain(&harness.history, 1);
    let p = peer(1);
    harness.connect(&p).await;

    let m1 = block_child(blocks[0].id(), 2, 0x31);
    let m2 = block_child(m1.id(), 3, 0x32);

    // M2 arrives first and waits for its parent.
    harness.peer_message(&p, block_inv(vec![m2.id()])).await;
    harness.peer_message(&p, block_modifiers(&[m2.clone()])).await;
    assert!(harness.synchronizer.cache().read().contains(&m2.id()));
    assert_eq!(
        harness.synchronizer.delivery().status(&m2.id(), |_| false),
        ModifierStatus::Held
    );
    assert!(harness
        .drain_view()
        .iter()
        .any(|c| matches!(c, ViewCommand::ChangedCache(_))));

    // M1 arrives; the view holder pulls both out in order.
    harness.peer_message(&p, block_inv(vec![m1.id()])).await;
    harness.peer_message(&p, block_modifiers(&[m1.clone()])).await;
    harness.apply_applicable().await;

    assert!(harness.synchronizer.cache().read().is_empty());
    assert!(harness.history.contains(&m1.id()));
    assert!(harness.history.contains(&m2.id()));
    assert_eq!(harness.history.height(), 3);
    assert_eq!(
        harness
            .synchronizer
            .delivery()
            .status(&m2.id(), |i| harness.history.contains(i)),
        ModifierStatus::Applied
    );
}

#[tokio::test]
async fn test_overfull_cache_evicts_and_demotes() {
    let mut harness = SyncHarness::with_config(SyncConfig {
        max_modifiers_cache_size: 1,
        ..SyncConfig::default()
    })
    .await;
    let p = peer(1);
    harness.connect(&p).await;

    // Two orphans with unknown parents both land in the cache.
    let first = block_child(raw_id(0xA1), 10, 1);
    let second = block_child(raw_id(0xA2), 11, 2);
    harness
        .peer_message(&p, block_inv(vec![first.id(), second.id()]))
        .await;
    harness
        .peer_message(&p, block_modifiers(&[first.clone(), second.clone()]))
        .await;

    let cache = harness.synchronizer.cache();
    assert_eq!(cache.read().len(), 1);
    // The older insertion was evicted and forgotten.
    assert!(!cache.read().contains(&first.id()));
    assert_eq!(
        harness
            .synchronizer
            .delivery()
            .status(&first.id(), |_| false),
        ModifierStatus::Unknown
    );
    assert_eq!(
        harness
            .synchronizer
            .delivery()
            .status(&second.id(), |_| false),
        ModifierStatus::Held
    );
}

// ============================================================================
// Chain summaries
// ============================================================================

#[tokio::test]
async fn test_sync_info_from_younger_peer_sends_continuation_inv() {
    let mut harness = SyncHarness::new().await;
    let blocks = chain(&harness.history, 3);
    let p = peer(1);
    harness.connect(&p).await;

    harness
        .peer_message(
            &p,
            Message::SyncInfo(SyncInfo::new(vec![blocks[0].id()])),
        )
        .await;

    assert_eq!(
        harness.synchronizer.sync_tracker().status_of(&p),
        Some(arden_view::ChainComparison::Younger)
    );
    let sent = harness.sent_messages();
    assert_eq!(sent.len(), 1);
    match &sent[0] {
        (Message::Inv(InvData { type_id, ids }), SendTarget::ToPeer(to)) => {
            assert_eq!(*type_id, ModifierType::Block.to_byte());
            assert_eq!(ids, &vec![blocks[1].id(), blocks[2].id()]);
            assert_eq!(to, &p);
        }
        other => panic!("unexpected outbound: {:?}", other),
    }
}

#[tokio::test]
async fn test_sync_info_equal_and_nonsense_send_nothing() {
    let mut harness = SyncHarness::new().await;
    chain(&harness.history, 2);
    let p = peer(1);
    harness.connect(&p).await;

    harness
        .peer_message(&p, Message::SyncInfo(harness.history.sync_info()))
        .await;
    assert_eq!(
        harness.synchronizer.sync_tracker().status_of(&p),
        Some(arden_view::ChainComparison::Equal)
    );

    harness
        .peer_message(&p, Message::SyncInfo(SyncInfo::new(vec![raw_id(0xFE)])))
        .await;
    assert_eq!(
        harness.synchronizer.sync_tracker().status_of(&p),
        Some(arden_view::ChainComparison::Nonsense)
    );

    assert!(harness.sent_messages().is_empty());
    assert!(harness.penalties.misbehaving().is_empty());
    assert!(harness.penalties.spamming().is_empty());
}

#[tokio::test]
async fn test_periodic_sync_broadcast_respects_refresh_gap() {
    let mut harness = SyncHarness::new().await;
    chain(&harness.history, 1);
    let p1 = peer(1);
    let p2 = peer(2);
    harness.connect(&p1).await;
    harness.connect(&p2).await;

    harness.deliver(SyncEvent::SendLocalSyncInfo).await;
    let sent = harness.sent_messages();
    assert_eq!(sent.len(), 1);
    match &sent[0] {
        (Message::SyncInfo(info), SendTarget::ToPeers(peers)) => {
            assert_eq!(peers, &vec![p1.clone(), p2.clone()]);
            assert_eq!(info, &harness.history.sync_info());
        }
        other => panic!("unexpected outbound: {:?}", other),
    }

    // A second tick inside the refresh gap sends nothing.
    harness.deliver(SyncEvent::SendLocalSyncInfo).await;
    assert!(harness.sent_messages().is_empty());
}

#[tokio::test]
async fn test_disconnected_peer_leaves_sync_tracker() {
    let mut harness = SyncHarness::new().await;
    let p = peer(1);
    harness.connect(&p).await;
    assert_eq!(harness.synchronizer.sync_tracker().peer_count(), 1);

    harness
        .deliver(SyncEvent::DisconnectedPeer { peer: p.clone() })
        .await;
    assert_eq!(harness.synchronizer.sync_tracker().peer_count(), 0);
    assert_eq!(harness.synchronizer.sync_tracker().status_of(&p), None);
}

// ============================================================================
// Serving requests
// ============================================================================

#[tokio::test]
async fn test_request_served_from_history_with_missing_ids_omitted() {
    let mut harness = SyncHarness::new().await;
    let blocks = chain(&harness.history, 2);
    let p = peer(1);
    harness.connect(&p).await;

    harness
        .peer_message(
            &p,
            block_request(vec![blocks[1].id(), raw_id(0xDD), blocks[0].id()]),
        )
        .await;

    let sent = harness.sent_messages();
    assert_eq!(sent.len(), 1);
    match &sent[0] {
        (Message::Modifier(data), SendTarget::ToPeer(to)) => {
            assert_eq!(to, &p);
            let ids: Vec<_> = data.modifiers.iter().map(|m| m.id).collect();
            assert_eq!(ids, vec![blocks[1].id(), blocks[0].id()]);
            assert_eq!(data.modifiers[0].data, blocks[1].to_bytes());
        }
        other => panic!("unexpected outbound: {:?}", other),
    }
}

#[tokio::test]
async fn test_request_served_from_mempool() {
    let mut harness = SyncHarness::new().await;
    let p = peer(1);
    harness.connect(&p).await;

    let tx1 = tx(0x01);
    let id1 = harness.mempool.put(tx1.clone());

    harness
        .peer_message(
            &p,
            Message::RequestModifier(ModifierRequest {
                type_id: ModifierType::Transaction.to_byte(),
                ids: vec![id1, raw_id(0xDC)],
            }),
        )
        .await;

    let sent = harness.sent_messages();
    match &sent[0] {
        (Message::Modifier(data), _) => {
            assert_eq!(data.type_id, ModifierType::Transaction.to_byte());
            assert_eq!(data.modifiers.len(), 1);
            assert_eq!(data.modifiers[0].data, tx1.to_bytes());
        }
        other => panic!("unexpected outbound: {:?}", other),
    }
}

#[tokio::test]
async fn test_response_is_truncated_to_packet_limit() {
    let mut harness = SyncHarness::with_config(SyncConfig {
        // Room for one block and its framing, not two.
        max_packet_size: 120,
        ..SyncConfig::default()
    })
    .await;
    let blocks = chain(&harness.history, 2);
    let p = peer(1);
    harness.connect(&p).await;

    harness
        .peer_message(&p, block_request(vec![blocks[0].id(), blocks[1].id()]))
        .await;

    let sent = harness.sent_messages();
    match &sent[0] {
        (Message::Modifier(data), _) => assert_eq!(data.modifiers.len(), 1),
        other => panic!("unexpected outbound: {:?}", other),
    }
}

// ============================================================================
// Transactions and local events
// ============================================================================

#[tokio::test]
async fn test_announced_transaction_is_fetched_and_forwarded() {
    let mut harness = SyncHarness::new().await;
    let p = peer(1);
    harness.connect(&p).await;

    let new_tx = tx(0x09);
    harness
        .peer_message(
            &p,
            Message::Inv(InvData {
                type_id: ModifierType::Transaction.to_byte(),
                ids: vec![new_tx.id()],
            }),
        )
        .await;
    let sent = harness.sent_messages();
    assert!(
        matches!(&sent[..], [(Message::RequestModifier(req), SendTarget::ToPeer(_))]
            if req.type_id == ModifierType::Transaction.to_byte())
    );

    harness.peer_message(&p, tx_modifiers(&[new_tx.clone()])).await;
    let forwarded = harness.drain_view();
    assert!(forwarded.iter().any(|c| matches!(
        c,
        ViewCommand::LocallyGeneratedTransaction(t) if t.id() == new_tx.id()
    )));

    // The view holder applies it and reports success; we gossip the id.
    harness.mempool.put(new_tx.clone());
    harness
        .deliver(SyncEvent::SuccessfulTransaction { tx: new_tx.clone() })
        .await;
    let sent = harness.sent_messages();
    assert!(
        matches!(&sent[..], [(Message::Inv(inv), SendTarget::Broadcast)]
            if inv.ids == vec![new_tx.id()])
    );
    assert_eq!(
        harness
            .synchronizer
            .delivery()
            .status(&new_tx.id(), |i| harness.mempool.contains(i)),
        ModifierStatus::Applied
    );
}

#[tokio::test]
async fn test_semantically_valid_block_is_gossiped() {
    let mut harness = SyncHarness::new().await;
    let blocks = chain(&harness.history, 1);

    harness
        .deliver(SyncEvent::SemanticallySuccessfulModifier {
            block: blocks[0].clone(),
        })
        .await;

    let sent = harness.sent_messages();
    assert!(
        matches!(&sent[..], [(Message::Inv(inv), SendTarget::Broadcast)]
            if inv.ids == vec![blocks[0].id()]
                && inv.type_id == ModifierType::Block.to_byte())
    );
}

#[tokio::test]
async fn test_failed_transaction_is_forgotten() {
    let mut harness = SyncHarness::new().await;
    let p = peer(1);
    harness.connect(&p).await;

    let bad_tx = tx(0x0A);
    harness
        .peer_message(
            &p,
            Message::Inv(InvData {
                type_id: ModifierType::Transaction.to_byte(),
                ids: vec![bad_tx.id()],
            }),
        )
        .await;
    harness.peer_message(&p, tx_modifiers(&[bad_tx.clone()])).await;

    harness
        .deliver(SyncEvent::FailedTransaction { tx: bad_tx.clone() })
        .await;
    assert_eq!(
        harness.synchronizer.delivery().status(&bad_tx.id(), |_| false),
        ModifierStatus::Unknown
    );
}
