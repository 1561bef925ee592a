// Path: crates/consensus/src/cache/pan.rs

//! The Pandora header cache.

use orc_types::error::CacheError;
use orc_types::shard::{ExecutionHeader, MultiShardInfo};
use orc_types::slot::Slot;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A cached pending header plus the verified-tip snapshot it was validated
/// against. The snapshot is an owned deep copy, never a reference back into
/// the engine.
#[derive(Clone, Debug)]
pub struct PanCacheEntry {
    /// The pending execution header.
    pub header: ExecutionHeader,
    /// Snapshot of the latest verified record at insertion time.
    pub last_verified: Option<MultiShardInfo>,
    /// Whether reconciliation for this slot is in flight.
    pub in_progress: bool,
    /// Insertion time, for the TTL sweep.
    pub created_at: Instant,
}

/// Parameters for [`PanHeaderCache::put`].
pub struct PanCacheInsertParams {
    /// The pending execution header.
    pub header: ExecutionHeader,
    /// Snapshot of the latest verified record.
    pub last_verified: Option<MultiShardInfo>,
}

/// Slot-indexed cache of unverified Pandora headers.
#[derive(Default)]
pub struct PanHeaderCache {
    entries: Mutex<HashMap<Slot, PanCacheEntry>>,
}

impl PanHeaderCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites the entry for `slot`.
    ///
    /// Fails with [`CacheError::UnknownParent`] when the header's parent is
    /// neither a cached header nor the top shard of the last verified record,
    /// unless nothing has been verified yet (the first header after genesis
    /// has no parent to check).
    pub fn put(&self, slot: Slot, params: PanCacheInsertParams) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().unwrap();

        let parent_cached = entries
            .values()
            .any(|e| e.header.hash == params.header.parent_hash);
        if !parent_cached {
            if let Some(last_verified) = &params.last_verified {
                let tip_hash = last_verified.top_shard().map(|s| s.hash);
                if tip_hash != Some(params.header.parent_hash) {
                    return Err(CacheError::UnknownParent);
                }
            }
        }

        let in_progress = entries.get(&slot).map(|e| e.in_progress).unwrap_or(false);
        entries.insert(
            slot,
            PanCacheEntry {
                header: params.header,
                last_verified: params.last_verified,
                in_progress,
                created_at: Instant::now(),
            },
        );
        Ok(())
    }

    /// Returns a copy of the entry at `slot`, if present.
    pub fn get(&self, slot: Slot) -> Option<PanCacheEntry> {
        self.entries.lock().unwrap().get(&slot).cloned()
    }

    /// Flags the slot as being reconciled. Fails with
    /// [`CacheError::AlreadyInProgress`] if another call already holds the
    /// flag. A missing entry (evicted after commit) is not an error.
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

    /// Clears the in-progress flag for `slot`. Must run on every exit path of
    /// a reconciliation attempt.
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
    /// `current_slot − reorg_window`. Returns the number of evictions.
    pub fn sweep(&self, current_slot: Slot, ttl: Duration, reorg_window: u64) -> usize {
        let horizon = current_slot.saturating_sub(reorg_window);
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|slot, entry| !(entry.created_at.elapsed() > ttl && *slot < horizon));
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
