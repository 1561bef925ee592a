// Path: crates/consensus/src/cache/mod.rs

//! Slot-keyed caches for unverified headers and shard info.
//!
//! Both caches validate parent linkage at insertion time so an orphan can
//! never reach the pair-matching step, and both expose an `in_progress` flag
//! that serialises reconciliation per slot.

mod pan;
mod van;

pub use pan::{PanCacheEntry, PanCacheInsertParams, PanHeaderCache};
pub use van::{VanCacheEntry, VanCacheInsertParams, VanShardCache};
