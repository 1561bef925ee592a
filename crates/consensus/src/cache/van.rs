// Path: crates/consensus/src/cache/van.rs

//! The Vanguard shard cache.

use orc_types::error::CacheError;
use orc_types::shard::{MultiShardInfo, VanguardShardInfo};
use orc_types::slot::Slot;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A cached shard-info event plus the verified-tip snapshot it was validated
/// against.
#[derive(Clone, Debug)]
pub struct VanCacheEntry {
    /// The shard-info event.
    pub shard_info: VanguardShardInfo,
    /// Snapshot of the latest verified record at insertion time.
    pub last_verified: Option<MultiShardInfo>,
    /// When set, the TTL sweep must skip this entry. Set for shards whose
    /// slot already lies in the past at insertion time, so a late-arriving
    /// reorg can still resolve against them.
    pub disable_delete: bool,
    /// Whether reconciliation for this slot is in flight.
    pub in_progress: bool,
    /// Insertion time, for the TTL sweep.
    pub created_at: Instant,
}

/// Parameters for [`VanShardCache::put`].
pub struct VanCacheInsertParams {
    /// The shard-info event.
    pub shard_info: VanguardShardInfo,
    /// Whether the TTL sweep must skip the entry.
    pub disable_delete: bool,
    /// Snapshot of the latest verified record.
    pub last_verified: Option<MultiShardInfo>,
}

/// Slot-indexed cache of unverified Vanguard shard info.
pub struct VanShardCache {
    entries: Mutex<HashMap<Slot, VanCacheEntry>>,
    reorg_window: u64,
}

impl VanShardCache {
    /// Creates an empty cache. `reorg_window` bounds how far below an
    /// incoming slot a cached sibling may sit and still vouch for its parent.
    pub fn new(reorg_window: u64) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            reorg_window,
        }
    }

    /// Inserts or overwrites the entry for `slot`.
    ///
    /// The shard's `parent_root` must equal the last verified record's
    /// `slot_block_root`, or the `block_root` of a cached sibling at a lower
    /// slot within the reorg window; the first shard after genesis is exempt.
    /// Fails with [`CacheError::UnknownParent`] otherwise.
    pub fn put(&self, slot: Slot, params: VanCacheInsertParams) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().unwrap();

        if let Some(last_verified) = &params.last_verified {
            let head_match = last_verified.slot_block_root == params.shard_info.parent_root;
            let sibling_match = entries.iter().any(|(s, e)| {
                *s < slot
                    && slot - *s <= self.reorg_window
                    && e.shard_info.block_root == params.shard_info.parent_root
            });
            if !head_match && !sibling_match {
                return Err(CacheError::UnknownParent);
            }
        }

        let in_progress = entries.get(&slot).map(|e| e.in_progress).unwrap_or(false);
        entries.insert(
            slot,
            VanCacheEntry {
                shard_info: params.shard_info,
                last_verified: params.last_verified,
                disable_delete: params.disable_delete,
                in_progress,
                created_at: Instant::now(),
            },
        );
        Ok(())
    }

    /// Returns a copy of the entry at `slot`, if present.
    pub fn get(&self, slot: Slot) -> Option<VanCacheEntry> {
        self.entries.lock().unwrap().get(&slot).cloned()
    }

    /// Flags the slot as being reconciled; see
    /// [`PanHeaderCache::mark_in_progress`](super::PanHeaderCache::mark_in_progress).
    pub fn mark_in_progress(&self, slot: Slot) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get_mut(&slot) {
            if entry.in_progress {
                return Err(CacheError::AlreadyInProgress(slot));
            }
            entry.in_progress = true;
        }
        Ok(())
    }

    /// Clears the in-progress flag for `slot`.
    pub fn mark_not_in_progress(&self, slot: Slot) {
        if let Some(entry) = self.entries.lock().unwrap().get_mut(&slot) {
            entry.in_progress = false;
        }
    }

    /// Unconditional eviction, used after a successful commit.
    pub fn force_del_slot(&self, slot: Slot) {
        self.entries.lock().unwrap().remove(&slot);
    }

    /// Removes entries older than `ttl` whose slot is strictly below
    /// `current_slot − reorg_window`, skipping entries with `disable_delete`.
    /// Returns the number of evictions.
    pub fn sweep(&self, current_slot: Slot, ttl: Duration, reorg_window: u64) -> usize {
        let horizon = current_slot.saturating_sub(reorg_window);
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|slot, entry| {
            entry.disable_delete || !(entry.created_at.elapsed() > ttl && *slot < horizon)
        });
        before - entries.len()
    }

    /// Number of cached slots.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
