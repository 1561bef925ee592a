// Path: crates/consensus/tests/reconciliation_e2e.rs

//! End-to-end reconciliation scenarios over a real redb-backed store.

use orc_api::storage::ShardStore;
use orc_consensus::{OrchestratorService, ReconciliationEngine};
use orc_storage::RedbShardStore;
use orc_types::config::OrchestratorConfig;
use orc_types::shard::{
    ExecutionHeader, Hash32, HeaderExtra, PandoraHeaderInfo, ShardInfo, SlotInfoWithStatus,
    Status, VanguardShardInfo,
};
use orc_types::slot::Slot;
use rand::seq::SliceRandom;
use rand::Rng;
use std::sync::Arc;
use tokio::sync::broadcast;

struct Harness {
    engine: Arc<ReconciliationEngine>,
    store: Arc<RedbShardStore>,
    _dir: tempfile::TempDir,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(RedbShardStore::open(dir.path().join("orchestrator.redb")).unwrap());
    let engine = Arc::new(ReconciliationEngine::new(
        OrchestratorConfig::default(),
        store.clone(),
    ));
    Harness { engine, store, _dir: dir }
}

fn tagged(tag: u8, i: u64) -> Hash32 {
    let mut bytes = [tag; 32];
    bytes[31] = i as u8;
    Hash32(bytes)
}

fn exec_hash(slot: Slot) -> Hash32 {
    tagged(0x11, slot)
}

fn block_root(slot: Slot) -> Hash32 {
    tagged(0xAA, slot)
}

/// A structurally matched (header, shard) pair with explicit parent links.
fn pair_with(
    slot: Slot,
    hash: Hash32,
    parent_hash: Hash32,
    root: Hash32,
    parent_root: Hash32,
) -> (PandoraHeaderInfo, VanguardShardInfo) {
    let extra = HeaderExtra {
        slot,
        blob_id: slot,
        tx_root: tagged(0xB0, slot),
        receipt_root: tagged(0xB1, slot),
        state_root: tagged(0xB2, slot),
        state_root_hash: tagged(0xB3, slot),
        gas_limit: 30_000_000,
        gas_used: 21_000 * slot,
    };
    let header = ExecutionHeader {
        number: slot,
        hash,
        parent_hash,
        time: 1_600_000_000 + slot * 6,
        extra: extra.clone(),
    };
    let shard_info = ShardInfo {
        blob_id: extra.blob_id,
        tx_root: extra.tx_root,
        receipt_root: extra.receipt_root,
        state_root: extra.state_root,
        gas_limit: extra.gas_limit,
        gas_used: extra.gas_used,
        hash,
        state_root_hash: extra.state_root_hash,
        time: header.time,
        block_number: header.number,
    };
    (
        PandoraHeaderInfo { slot, header },
        VanguardShardInfo {
            slot,
            block_root: root,
            parent_root,
            finalized_slot: 0,
            finalized_epoch: 0,
            shard_info,
        },
    )
}

/// The canonical pair for `slot` on the happy-path chain.
fn pair(slot: Slot) -> (PandoraHeaderInfo, VanguardShardInfo) {
    let parent_hash = if slot == 1 { Hash32::zero() } else { exec_hash(slot - 1) };
    let parent_root = if slot == 1 { Hash32::zero() } else { block_root(slot - 1) };
    pair_with(slot, exec_hash(slot), parent_hash, block_root(slot), parent_root)
}

fn drain(rx: &mut broadcast::Receiver<SlotInfoWithStatus>) -> Vec<SlotInfoWithStatus> {
    let mut out = Vec::new();
    while let Ok(confirmation) = rx.try_recv() {
        out.push(confirmation);
    }
    out
}

/// Feeds the canonical chain up to `slot`, vanguard first at each slot.
fn commit_chain(engine: &ReconciliationEngine, up_to: Slot) {
    for slot in 1..=up_to {
        let (pan, van) = pair(slot);
        engine.on_vanguard_shard(&van).unwrap();
        engine.on_pandora_header(&pan).unwrap();
    }
}

/// Asserts the parent-link invariant over the contiguous range `[1, head]`.
fn assert_chain_links(store: &RedbShardStore, head: u64) {
    assert_eq!(store.latest_step_id().unwrap(), head);
    for step in 1..=head {
        let record = store.verified(step).unwrap().unwrap();
        assert_eq!(store.step_id_by_slot(record.slot).unwrap(), Some(step));
        if step > 1 {
            let prev = store.verified(step - 1).unwrap().unwrap();
            assert_eq!(record.parent_root, prev.slot_block_root);
            assert_eq!(
                record.top_shard().unwrap().parent_hash,
                prev.top_shard().unwrap().hash
            );
        }
    }
    assert_eq!(store.verified(head + 1).unwrap(), None);
}

#[test]
fn test_happy_path_at_genesis() {
    let h = harness();
    let mut rx = h.engine.subscribe();

    let (pan, van) = pair(1);
    h.engine.on_vanguard_shard(&van).unwrap();
    assert!(drain(&mut rx).is_empty());

    h.engine.on_pandora_header(&pan).unwrap();

    let confirmations = drain(&mut rx);
    assert_eq!(confirmations.len(), 1);
    assert_eq!(confirmations[0].pandora_header_hash, exec_hash(1));
    assert_eq!(confirmations[0].vanguard_block_hash, block_root(1));
    assert_eq!(confirmations[0].status, Status::Verified);

    assert_eq!(h.store.latest_step_id().unwrap(), 1);
    let record = h.store.verified(1).unwrap().unwrap();
    assert_eq!(record.slot, 1);
    assert_eq!(record.slot_block_root, block_root(1));
}

#[test]
fn test_out_of_order_arrival() {
    let h = harness();
    commit_chain(&h.engine, 1);
    let mut rx = h.engine.subscribe();

    // Header before shard for slot 2.
    let (pan, van) = pair(2);
    h.engine.on_pandora_header(&pan).unwrap();
    assert!(drain(&mut rx).is_empty());
    assert_eq!(h.store.latest_step_id().unwrap(), 1);

    h.engine.on_vanguard_shard(&van).unwrap();

    let confirmations = drain(&mut rx);
    assert_eq!(confirmations.len(), 1);
    assert_eq!(confirmations[0].status, Status::Verified);
    assert_chain_links(&h.store, 2);
}

#[test]
fn test_mismatched_pair_is_invalid() {
    let h = harness();
    commit_chain(&h.engine, 2);
    let mut rx = h.engine.subscribe();

    let (pan, mut van) = pair(3);
    van.shard_info.gas_used = 999;
    h.engine.on_pandora_header(&pan).unwrap();
    h.engine.on_vanguard_shard(&van).unwrap();

    let confirmations = drain(&mut rx);
    assert_eq!(confirmations.len(), 1);
    assert_eq!(confirmations[0].pandora_header_hash, exec_hash(3));
    assert_eq!(confirmations[0].vanguard_block_hash, block_root(3));
    assert_eq!(confirmations[0].status, Status::Invalid);

    assert_eq!(h.store.latest_step_id().unwrap(), 2);
    assert_eq!(h.store.step_id_by_slot(3).unwrap(), None);
}

#[test]
fn test_duplicate_replay_republishes_without_append() {
    let h = harness();
    commit_chain(&h.engine, 2);
    let mut rx = h.engine.subscribe();

    let (pan, van) = pair(2);
    h.engine.on_pandora_header(&pan).unwrap();
    h.engine.on_vanguard_shard(&van).unwrap();

    let confirmations = drain(&mut rx);
    assert_eq!(confirmations.len(), 2);
    assert!(confirmations.iter().all(|c| c.status == Status::Verified));
    assert!(confirmations
        .iter()
        .all(|c| c.pandora_header_hash == exec_hash(2) && c.vanguard_block_hash == block_root(2)));

    assert_chain_links(&h.store, 2);
}

#[test]
fn test_deep_reorg_rewinds_to_common_ancestor() {
    let h = harness();
    commit_chain(&h.engine, 3);
    let mut rx = h.engine.subscribe();

    // A competing slot-2 block anchored to slot 1.
    let new_hash = tagged(0x22, 2);
    let new_root = tagged(0xBB, 2);
    let (pan, van) = pair_with(2, new_hash, exec_hash(1), new_root, block_root(1));

    h.engine.on_vanguard_shard(&van).unwrap();
    let tracked = h.engine.current_reorg().unwrap();
    assert_eq!(tracked.parent_step_id, 1);
    assert_eq!(tracked.block_root, new_root);
    assert!(!tracked.has_resolved);
    assert!(drain(&mut rx).is_empty());

    h.engine.on_pandora_header(&pan).unwrap();

    let confirmations = drain(&mut rx);
    assert_eq!(confirmations.len(), 1);
    assert_eq!(confirmations[0].pandora_header_hash, new_hash);
    assert_eq!(confirmations[0].vanguard_block_hash, new_root);
    assert_eq!(confirmations[0].status, Status::Verified);

    // Steps 2 and 3 of the old branch are gone; the new pair sits at step 2.
    assert_eq!(h.store.latest_step_id().unwrap(), 2);
    let record = h.store.verified(2).unwrap().unwrap();
    assert_eq!(record.slot, 2);
    assert_eq!(record.slot_block_root, new_root);
    assert_eq!(h.store.verified(3).unwrap(), None);
    assert_eq!(h.store.step_id_by_slot(3).unwrap(), None);
    assert_eq!(h.store.step_id_by_slot(2).unwrap(), Some(2));

    assert!(h.engine.current_reorg().unwrap().has_resolved);
}

#[test]
fn test_orphan_header_is_invalid_and_not_cached() {
    let h = harness();
    commit_chain(&h.engine, 1);
    let mut rx = h.engine.subscribe();

    let (pan, _) = pair_with(
        2,
        tagged(0x22, 2),
        Hash32([0xDE; 32]),
        block_root(2),
        block_root(1),
    );
    h.engine.on_pandora_header(&pan).unwrap();

    let confirmations = drain(&mut rx);
    assert_eq!(confirmations.len(), 1);
    assert_eq!(confirmations[0].pandora_header_hash, tagged(0x22, 2));
    assert_eq!(confirmations[0].vanguard_block_hash, Hash32::zero());
    assert_eq!(confirmations[0].status, Status::Invalid);
    assert_eq!(h.store.latest_step_id().unwrap(), 1);
}

#[test]
fn test_random_interleavings_of_ordered_streams_verify_every_slot() {
    const SLOTS: u64 = 6;
    let mut rng = rand::thread_rng();

    for _ in 0..20 {
        let h = harness();
        let mut rx = h.engine.subscribe();

        // Each stream stays in slot order; the merge order is random.
        let mut pan_queue: Vec<_> = (1..=SLOTS).map(|s| pair(s).0).collect();
        let mut van_queue: Vec<_> = (1..=SLOTS).map(|s| pair(s).1).collect();
        pan_queue.reverse();
        van_queue.reverse();

        while !pan_queue.is_empty() || !van_queue.is_empty() {
            let take_pan = if pan_queue.is_empty() {
                false
            } else if van_queue.is_empty() {
                true
            } else {
                rng.gen_bool(0.5)
            };
            if take_pan {
                h.engine.on_pandora_header(&pan_queue.pop().unwrap()).unwrap();
            } else {
                h.engine.on_vanguard_shard(&van_queue.pop().unwrap()).unwrap();
            }
        }

        let confirmations = drain(&mut rx);
        assert_eq!(confirmations.len(), SLOTS as usize);
        assert!(confirmations.iter().all(|c| c.status == Status::Verified));
        assert_chain_links(&h.store, SLOTS);
    }
}

#[test]
fn test_shuffled_replays_never_double_append() {
    const SLOTS: u64 = 4;
    let h = harness();
    commit_chain(&h.engine, SLOTS);
    let mut rx = h.engine.subscribe();

    // Replay the whole history in arbitrary order, twice.
    let mut events: Vec<u64> = (1..=SLOTS).chain(1..=SLOTS).collect();
    events.shuffle(&mut rand::thread_rng());
    for slot in events {
        let (pan, van) = pair(slot);
        h.engine.on_pandora_header(&pan).unwrap();
        h.engine.on_vanguard_shard(&van).unwrap();
    }

    let confirmations = drain(&mut rx);
    assert!(confirmations.iter().all(|c| c.status == Status::Verified));
    assert_chain_links(&h.store, SLOTS);
}

#[test]
fn test_finality_marks_are_monotone() {
    let h = harness();

    let feed = |slot: Slot, fin_slot: Slot, fin_epoch: u64| {
        let (pan, mut van) = pair(slot);
        van.finalized_slot = fin_slot;
        van.finalized_epoch = fin_epoch;
        h.engine.on_vanguard_shard(&van).unwrap();
        h.engine.on_pandora_header(&pan).unwrap();
    };

    feed(1, 10, 2);
    assert_eq!(h.store.finalized_slot().unwrap(), 10);
    assert_eq!(h.store.finalized_epoch().unwrap(), 2);

    // A consensus client replaying older finality must not move the marks
    // backwards.
    feed(2, 5, 1);
    assert_eq!(h.store.finalized_slot().unwrap(), 10);
    assert_eq!(h.store.finalized_epoch().unwrap(), 2);

    feed(3, 12, 3);
    assert_eq!(h.store.finalized_slot().unwrap(), 12);
    assert_eq!(h.store.finalized_epoch().unwrap(), 3);
}

#[test]
fn test_concurrent_producers_build_a_consistent_chain() {
    const SLOTS: u64 = 12;
    let h = harness();
    let mut rx = h.engine.subscribe();

    let engine_pan = h.engine.clone();
    let engine_van = h.engine.clone();
    let pan_thread = std::thread::spawn(move || {
        for slot in 1..=SLOTS {
            engine_pan.on_pandora_header(&pair(slot).0).unwrap();
        }
    });
    let van_thread = std::thread::spawn(move || {
        for slot in 1..=SLOTS {
            engine_van.on_vanguard_shard(&pair(slot).1).unwrap();
        }
    });
    pan_thread.join().unwrap();
    van_thread.join().unwrap();

    // A header racing a commit of its parent slot can be dropped as an
    // orphan; the subscription clients re-deliver in that case. Model one
    // re-delivery round.
    for slot in 1..=SLOTS {
        let (pan, van) = pair(slot);
        h.engine.on_vanguard_shard(&van).unwrap();
        h.engine.on_pandora_header(&pan).unwrap();
    }

    assert_chain_links(&h.store, SLOTS);

    let confirmations = drain(&mut rx);
    for slot in 1..=SLOTS {
        let verified = confirmations
            .iter()
            .filter(|c| c.pandora_header_hash == exec_hash(slot) && c.status == Status::Verified)
            .count();
        assert!(verified >= 1, "slot {} got no verified confirmation", slot);
    }
}

#[tokio::test]
async fn test_service_lifecycle_delivers_confirmations() {
    let h = harness();
    let service = OrchestratorService::new(h.engine.clone(), &OrchestratorConfig::default());
    let mut rx = h.engine.subscribe();

    let (pan_tx, pan_rx) = tokio::sync::mpsc::channel(64);
    let (van_tx, van_rx) = tokio::sync::mpsc::channel(64);
    service.start(pan_rx, van_rx).await;
    assert!(service.is_running());

    let (pan, van) = pair(1);
    van_tx.send(van).await.unwrap();
    pan_tx.send(pan).await.unwrap();

    let confirmation = tokio::time::timeout(std::time::Duration::from_secs(5), rx.recv())
        .await
        .expect("confirmation before timeout")
        .unwrap();
    assert_eq!(confirmation.status, Status::Verified);
    assert_eq!(h.store.latest_step_id().unwrap(), 1);

    service.stop().await;
    assert!(!service.is_running());
}
