// Path: crates/consensus/src/reorg.rs

//! Divergence detection against the verified tip.
//!
//! An incoming Vanguard shard whose `parent_root` disagrees with the head of
//! the shard store either anchors to an earlier verified record (a reorg: the
//! store must be rewound to that ancestor before the divergent pair can be
//! committed) or to nothing we know (the shard is discarded).

use orc_api::storage::{ShardStore, StorageError};
use orc_types::shard::{MultiShardInfo, VanguardShardInfo};
use orc_types::slot::StepId;

/// Outcome of checking an incoming Vanguard shard against the verified tip.
#[derive(Debug)]
pub enum ReorgCheck {
    /// The shard extends the current head (or nothing has been verified yet).
    OnHead,
    /// The shard diverges from the head but anchors to an earlier verified
    /// record; reconciliation must treat that record as the tip.
    Divergent {
        /// Step id of the common ancestor.
        parent_step_id: StepId,
        /// The common ancestor record.
        parent: MultiShardInfo,
    },
    /// The shard diverges from the head and no ancestor was found within the
    /// search window; the shard must be discarded.
    UnknownAncestor,
}

/// Walks the verified store downward from `head_step_id − 1` looking for the
/// record the divergent shard anchors to. The walk visits at most `window`
/// records and stops at step 1.
pub fn check_reorg(
    store: &dyn ShardStore,
    incoming: &VanguardShardInfo,
    head: Option<&MultiShardInfo>,
    head_step_id: StepId,
    window: u64,
) -> Result<ReorgCheck, StorageError> {
    let head = match head {
        Some(head) if head_step_id > 0 => head,
        _ => return Ok(ReorgCheck::OnHead),
    };

    if incoming.parent_root == head.slot_block_root {
        return Ok(ReorgCheck::OnHead);
    }

    let floor = head_step_id.saturating_sub(window).max(1);
    let mut step = head_step_id - 1;
    while step >= floor {
        if let Some(record) = store.verified(step)? {
            if record.slot_block_root == incoming.parent_root {
                return Ok(ReorgCheck::Divergent {
                    parent_step_id: step,
                    parent: record,
                });
            }
        }
        if step == floor {
            break;
        }
        step -= 1;
    }

    Ok(ReorgCheck::UnknownAncestor)
}
