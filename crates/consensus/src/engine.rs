// Path: crates/consensus/src/engine.rs

//! The reconciliation engine.
//!
//! Two entry points, one per subscribed chain, drive the slot-keyed caches,
//! pair records by slot, verify structural agreement between the mirrored
//! fields, commit verified pairs to the shard store, and publish
//! confirmations. Both entry points are safe to invoke from independent
//! producer tasks: the caches carry per-slot in-progress flags and every
//! store mutation happens under a single writer lock, which also guards the
//! in-flight reorg status.

use crate::cache::{PanCacheInsertParams, PanHeaderCache, VanCacheInsertParams, VanShardCache};
use crate::feed::ConfirmationFeed;
use crate::reorg::{check_reorg, ReorgCheck};
use orc_api::storage::{ShardStore, StorageError};
use orc_types::config::OrchestratorConfig;
use orc_types::error::{CacheError, ErrorCode};
use orc_types::shard::{
    ExecutionHeader, ExecutionShard, Hash32, MultiShardInfo, PandoraHeaderInfo, ReorgStatus,
    ShardInfo, SlotInfoWithStatus, Status, VanguardShardInfo,
};
use orc_types::slot::{Slot, SlotClock, StepId};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Errors surfaced by the engine's entry points.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The store's head pointer references a missing record. Fatal: the
    /// supervisor must restart the engine so startup healing can run.
    #[error("shard store is corrupted: no record at step {0}")]
    Corrupted(StepId),
    /// A store operation failed.
    #[error(transparent)]
    Store(#[from] StorageError),
    /// A cache operation failed in a way the engine does not absorb
    /// (currently only the in-progress collision).
    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl ErrorCode for EngineError {
    fn code(&self) -> &'static str {
        match self {
            Self::Corrupted(_) => "ENGINE_STORE_CORRUPTED",
            Self::Store(e) => e.code(),
            Self::Cache(e) => e.code(),
        }
    }
}

/// State mutated only alongside store mutations, under the writer lock.
#[derive(Default)]
struct CommitState {
    cur_reorg: Option<ReorgStatus>,
}

/// Pairs Pandora headers with Vanguard shard info and maintains the verified
/// chain.
pub struct ReconciliationEngine {
    clock: SlotClock,
    config: OrchestratorConfig,
    store: Arc<dyn ShardStore>,
    pan_cache: PanHeaderCache,
    van_cache: VanShardCache,
    feed: ConfirmationFeed,
    commit: Mutex<CommitState>,
}

impl ReconciliationEngine {
    /// Builds an engine over the given store.
    pub fn new(config: OrchestratorConfig, store: Arc<dyn ShardStore>) -> Self {
        Self {
            clock: SlotClock::new(config.genesis_time, config.seconds_per_slot),
            van_cache: VanShardCache::new(config.reorg_window_slots),
            pan_cache: PanHeaderCache::new(),
            feed: ConfirmationFeed::new(config.feed_capacity),
            store,
            commit: Mutex::new(CommitState::default()),
            config,
        }
    }

    /// The confirmation feed.
    pub fn feed(&self) -> &ConfirmationFeed {
        &self.feed
    }

    /// Shorthand for `feed().subscribe()`.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<SlotInfoWithStatus> {
        self.feed.subscribe()
    }

    /// A copy of the current reorg status, if a divergence is being tracked.
    pub fn current_reorg(&self) -> Option<ReorgStatus> {
        self.commit.lock().unwrap().cur_reorg.clone()
    }

    /// Processes an incoming pending header from the Pandora chain.
    pub fn on_pandora_header(&self, info: &PandoraHeaderInfo) -> Result<(), EngineError> {
        let slot = info.slot;
        let header = &info.header;

        // Short circuit: already verified at this slot, re-publish instantly.
        if let Some(record) = self.sharding_info_at(slot)? {
            if record.top_shard().map(|s| s.hash) == Some(header.hash) {
                debug!(target: "engine", slot, hash = %header.hash,
                    "Pandora header is already in the verified store");
                self.publish(header.hash, record.slot_block_root, Status::Verified);
                return Ok(());
            }
        }

        let (mut latest_step, mut latest) = self.load_head()?;

        // If the tracked reorg names this header, reconcile against the
        // common ancestor instead of the head.
        {
            let commit = self.commit.lock().unwrap();
            if let Some(reorg) = commit.cur_reorg.as_ref() {
                if reorg.execution_hash == header.hash {
                    info!(target: "engine", slot, parent_step = reorg.parent_step_id,
                        "Got pandora header for the reorg slot");
                    latest_step = reorg.parent_step_id;
                    latest = Some(reorg.parent_shard_info.clone());
                }
            }
        }

        match self.pan_cache.put(
            slot,
            PanCacheInsertParams {
                header: header.clone(),
                last_verified: latest.clone(),
            },
        ) {
            Ok(()) => {}
            Err(CacheError::UnknownParent) => {
                info!(target: "engine", slot, block_number = header.number,
                    hash = %header.hash, parent_hash = %header.parent_hash,
                    "Parent not found in store or cache, discarding the pandora header");
                self.publish(header.hash, Hash32::zero(), Status::Invalid);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        self.pan_cache.mark_in_progress(slot)?;
        let result = match self.van_cache.get(slot) {
            Some(entry) => {
                self.insert_into_chain(&entry.shard_info, header, latest.as_ref(), latest_step)
            }
            None => Ok(()),
        };
        self.pan_cache.mark_not_in_progress(slot);
        result
    }

    /// Processes an incoming shard-info event from the Vanguard chain.
    pub fn on_vanguard_shard(&self, info: &VanguardShardInfo) -> Result<(), EngineError> {
        let slot = info.slot;

        // Short circuit: already verified at this slot, re-publish instantly.
        if let Some(record) = self.sharding_info_at(slot)? {
            if record.slot_block_root == info.block_root {
                debug!(target: "engine", slot, block_root = %info.block_root,
                    "Vanguard shard is already in the verified store");
                if let Some(top) = record.top_shard() {
                    self.publish(top.hash, record.slot_block_root, Status::Verified);
                }
                return Ok(());
            }
        }

        let (mut head_step, mut head) = self.load_head()?;

        match check_reorg(
            self.store.as_ref(),
            info,
            head.as_ref(),
            head_step,
            self.config.reorg_window_slots,
        )? {
            ReorgCheck::OnHead => {}
            ReorgCheck::UnknownAncestor => {
                warn!(target: "engine", slot, block_root = %info.block_root,
                    parent_root = %info.parent_root,
                    "No common ancestor for divergent vanguard shard, discarding");
                return Ok(());
            }
            ReorgCheck::Divergent {
                parent_step_id,
                parent,
            } => {
                let mut commit = self.commit.lock().unwrap();
                let tracks_this_branch = match commit.cur_reorg.as_ref() {
                    None => true,
                    Some(cur) => cur.block_root == info.block_root,
                };
                if tracks_this_branch {
                    info!(target: "engine", slot, block_root = %info.block_root,
                        parent_step = parent_step_id,
                        "Reorg detected, tracking divergent branch");
                    commit.cur_reorg = Some(ReorgStatus {
                        slot,
                        block_root: info.block_root,
                        parent_step_id,
                        parent_shard_info: parent.clone(),
                        execution_hash: info.shard_info.hash,
                        has_resolved: false,
                    });
                }
                head_step = parent_step_id;
                head = Some(parent);
            }
        }

        let current_slot = self.clock.current_slot();
        let disable_delete = slot < current_slot;
        debug!(target: "engine", current_slot, block_slot = slot, disable_delete,
            "Caching incoming slot into vanguard cache");

        match self.van_cache.put(
            slot,
            VanCacheInsertParams {
                shard_info: info.clone(),
                disable_delete,
                last_verified: head.clone(),
            },
        ) {
            Ok(()) => {}
            Err(CacheError::UnknownParent) => {
                info!(target: "engine", slot, block_root = %info.block_root,
                    "Unknown parent in store and cache, discarding this vanguard block");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        self.van_cache.mark_in_progress(slot)?;
        let result = match self.pan_cache.get(slot) {
            Some(entry) => self.insert_into_chain(info, &entry.header, head.as_ref(), head_step),
            None => Ok(()),
        };
        self.van_cache.mark_not_in_progress(slot);
        result
    }

    /// Verifies a slot's pair, commits it on success, and publishes the
    /// decision either way.
    fn insert_into_chain(
        &self,
        van_shard: &VanguardShardInfo,
        header: &ExecutionHeader,
        latest: Option<&MultiShardInfo>,
        latest_step: StepId,
    ) -> Result<(), EngineError> {
        let mut status = Status::Invalid;

        if compare_sharding_info(header, &van_shard.shard_info, van_shard.slot)
            && verify_shard_info(latest, header, van_shard, latest_step)
        {
            {
                let mut commit = self.commit.lock().unwrap();

                // The other producer may have committed this exact pair while
                // we were verifying; re-publish without mutating.
                if self.committed_pair_at(van_shard.slot, header.hash, van_shard.block_root)? {
                    debug!(target: "engine", slot = van_shard.slot,
                        "Slot was committed concurrently, re-publishing");
                    drop(commit);
                    self.pan_cache.force_del_slot(van_shard.slot);
                    self.van_cache.force_del_slot(van_shard.slot);
                    self.publish(header.hash, van_shard.block_root, Status::Verified);
                    return Ok(());
                }

                let pending_reorg = commit.cur_reorg.as_ref().and_then(|r| {
                    let matches = r.slot == van_shard.slot
                        && r.block_root == van_shard.block_root
                        && !r.has_resolved;
                    matches.then_some(r.parent_step_id)
                });
                if let Some(parent_step_id) = pending_reorg {
                    // Unresolved rewind stays unresolved on failure so a
                    // later attempt can retry.
                    info!(target: "engine", slot = van_shard.slot, parent_step = parent_step_id,
                        "Reverting verified store due to reorg");
                    let latest_now = self.store.latest_step_id()?;
                    if let Err(e) = self.store.remove_range(parent_step_id + 1, latest_now) {
                        error!(target: "engine", error = %e, "Failed to process reorg");
                        return Ok(());
                    }
                    self.store.save_latest_step_id(parent_step_id)?;
                    if let Some(reorg) = commit.cur_reorg.as_mut() {
                        reorg.has_resolved = true;
                    }
                }

                let record = prepare_multi_shard(
                    van_shard,
                    header,
                    self.config.total_execution_shards,
                    self.config.shards_per_van_block,
                );
                let next_step = self.store.latest_step_id()? + 1;
                self.store.save_verified(next_step, &record)?;
                self.store.save_latest_step_id(next_step)?;
                self.store.save_slot_step_index(record.slot, next_step)?;
                info!(target: "engine", step_id = next_step, slot = record.slot,
                    block_root = %record.slot_block_root,
                    "Inserted sharding info into verified store");

                self.write_finalize_info(van_shard.finalized_slot, van_shard.finalized_epoch);
            }

            self.pan_cache.force_del_slot(van_shard.slot);
            self.van_cache.force_del_slot(van_shard.slot);
            status = Status::Verified;
        }

        self.publish(header.hash, van_shard.block_root, status);
        Ok(())
    }

    /// Stores new finalize marks; the store ignores non-increasing values.
    fn write_finalize_info(&self, finalized_slot: Slot, finalized_epoch: u64) {
        if let Err(e) = self.store.save_finalized_slot(finalized_slot) {
            warn!(target: "engine", error = %e, "Failed to store new finalized slot");
        }
        if let Err(e) = self.store.save_finalized_epoch(finalized_epoch) {
            warn!(target: "engine", error = %e, "Failed to store new finalized epoch");
        }
    }

    /// Whether the record indexed at `slot` already binds exactly this pair.
    fn committed_pair_at(
        &self,
        slot: Slot,
        execution_hash: Hash32,
        block_root: Hash32,
    ) -> Result<bool, EngineError> {
        let existing = match self.sharding_info_at(slot)? {
            None => return Ok(false),
            Some(record) => record,
        };
        Ok(existing.slot_block_root == block_root
            && existing.top_shard().map(|s| s.hash) == Some(execution_hash))
    }

    /// The verified record indexed at `slot`, if any.
    fn sharding_info_at(&self, slot: Slot) -> Result<Option<MultiShardInfo>, EngineError> {
        let step = match self.store.step_id_by_slot(slot)? {
            None => return Ok(None),
            Some(step) => step,
        };
        Ok(self.store.verified(step)?)
    }

    /// Loads the verified tip. A head pointer referencing a missing record is
    /// store corruption and fatal.
    fn load_head(&self) -> Result<(StepId, Option<MultiShardInfo>), EngineError> {
        let step = self.store.latest_step_id()?;
        if step == 0 {
            return Ok((0, None));
        }
        match self.store.verified(step)? {
            Some(record) => Ok((step, Some(record))),
            None => Err(EngineError::Corrupted(step)),
        }
    }

    fn publish(&self, block_hash: Hash32, slot_hash: Hash32, status: Status) {
        self.feed.send(SlotInfoWithStatus {
            pandora_header_hash: block_hash,
            vanguard_block_hash: slot_hash,
            status,
        });
    }

    /// Runs one TTL sweep over both caches. Invoked by the background
    /// sweeper task.
    pub fn sweep_caches(&self) {
        let current_slot = self.clock.current_slot();
        let ttl = Duration::from_secs(self.config.cache_ttl_slots * self.config.seconds_per_slot);
        let window = self.config.reorg_window_slots;
        let removed =
            self.pan_cache.sweep(current_slot, ttl, window) + self.van_cache.sweep(current_slot, ttl, window);
        if removed > 0 {
            debug!(target: "engine", removed, current_slot, "Swept expired cache entries");
        }
    }

    #[cfg(test)]
    pub(crate) fn caches(&self) -> (&PanHeaderCache, &VanShardCache) {
        (&self.pan_cache, &self.van_cache)
    }
}

/// Bitwise agreement of every mirrored field between a header and the shard
/// info a Vanguard block carries for it, including the consensus slot encoded
/// in the header's extra payload.
pub fn compare_sharding_info(header: &ExecutionHeader, shard_info: &ShardInfo, slot: Slot) -> bool {
    let extra = &header.extra;
    let agrees = extra.slot == slot
        && extra.blob_id == shard_info.blob_id
        && extra.tx_root == shard_info.tx_root
        && extra.receipt_root == shard_info.receipt_root
        && extra.state_root == shard_info.state_root
        && extra.state_root_hash == shard_info.state_root_hash
        && extra.gas_limit == shard_info.gas_limit
        && extra.gas_used == shard_info.gas_used
        && header.hash == shard_info.hash
        && header.time == shard_info.time
        && header.number == shard_info.block_number;
    if !agrees {
        debug!(target: "engine", slot, header_hash = %header.hash,
            shard_hash = %shard_info.hash, "Sharding info mismatch");
    }
    agrees
}

/// Chain-consecutiveness of a candidate pair against the verified tip: either
/// nothing has been verified yet, or both parent links must point at the tip.
pub fn verify_shard_info(
    latest: Option<&MultiShardInfo>,
    header: &ExecutionHeader,
    van_shard: &VanguardShardInfo,
    latest_step: StepId,
) -> bool {
    if latest_step == 0 {
        return true;
    }
    match latest {
        None => false,
        Some(latest) => {
            let hash_links = latest
                .top_shard()
                .map(|s| s.hash == header.parent_hash)
                .unwrap_or(false);
            hash_links && latest.slot_block_root == van_shard.parent_root
        }
    }
}

/// Builds the verified record for a matched pair. One execution shard per
/// Vanguard block in this revision.
pub fn prepare_multi_shard(
    van_shard: &VanguardShardInfo,
    header: &ExecutionHeader,
    total_execution_shards: u32,
    shards_per_van_block: u32,
) -> MultiShardInfo {
    let capacity = shards_per_van_block.min(total_execution_shards).max(1);
    let mut shards = Vec::with_capacity(capacity as usize);
    shards.push(ExecutionShard::from_header(header));
    MultiShardInfo {
        slot: van_shard.slot,
        slot_block_root: van_shard.block_root,
        parent_root: van_shard.parent_root,
        shards,
        finalized_slot: van_shard.finalized_slot,
        finalized_epoch: van_shard.finalized_epoch,
    }
}
