// Path: crates/types/src/shard.rs

//! Core sharding data structures.
//!
//! These types describe the two inbound streams — pending execution headers
//! from the Pandora chain and shard info from the Vanguard chain — and the
//! verified record the orchestrator derives from a matching pair.

use crate::slot::{Slot, StepId};
use parity_scale_codec::{Decode, Encode};
use serde::{Deserialize, Serialize};

/// A 32-byte hash. Used for execution header hashes and consensus block roots
/// alike; the two chains share the same digest width.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Encode, Decode, Serialize, Deserialize)]
pub struct Hash32(pub [u8; 32]);

impl Hash32 {
    /// The all-zero hash, used as the "no parent" / "no counterpart" marker.
    pub const fn zero() -> Self {
        Self([0u8; 32])
    }

    /// Returns true if every byte is zero.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }
}

impl std::fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Hash32({})", hex::encode(self.0))
    }
}

impl std::fmt::Display for Hash32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl From<[u8; 32]> for Hash32 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

/// The execution shard metadata a Pandora header carries in its extra payload,
/// alongside the consensus slot the header was produced for.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct HeaderExtra {
    /// The consensus slot this header targets.
    pub slot: Slot,
    /// Identifier of the shard blob the header commits to.
    pub blob_id: u64,
    /// Transaction trie root.
    pub tx_root: Hash32,
    /// Receipt trie root.
    pub receipt_root: Hash32,
    /// State trie root after executing the block.
    pub state_root: Hash32,
    /// Hash over the state root used by the consensus layer mirror.
    pub state_root_hash: Hash32,
    /// Gas limit of the block.
    pub gas_limit: u64,
    /// Gas used by the block.
    pub gas_used: u64,
}

/// A pending block header produced by the Pandora (execution) chain.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct ExecutionHeader {
    /// Block number.
    pub number: u64,
    /// Header hash.
    pub hash: Hash32,
    /// Hash of the parent header.
    pub parent_hash: Hash32,
    /// Block timestamp (unix seconds).
    pub time: u64,
    /// Consensus slot and shard metadata encoded in the header's extra field.
    pub extra: HeaderExtra,
}

/// A pending header event as delivered by the Pandora subscription.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct PandoraHeaderInfo {
    /// The consensus slot the header targets.
    pub slot: Slot,
    /// The pending header itself.
    pub header: ExecutionHeader,
}

/// The execution-layer payload commitment embedded in a Vanguard block.
/// Every field mirrors a field of the corresponding execution header.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct ShardInfo {
    /// Identifier of the shard blob.
    pub blob_id: u64,
    /// Transaction trie root.
    pub tx_root: Hash32,
    /// Receipt trie root.
    pub receipt_root: Hash32,
    /// State trie root.
    pub state_root: Hash32,
    /// Gas limit of the mirrored block.
    pub gas_limit: u64,
    /// Gas used by the mirrored block.
    pub gas_used: u64,
    /// Hash of the mirrored execution header.
    pub hash: Hash32,
    /// Hash over the state root.
    pub state_root_hash: Hash32,
    /// Timestamp of the mirrored block (unix seconds).
    pub time: u64,
    /// Number of the mirrored block.
    pub block_number: u64,
}

/// A shard-info event as delivered by the Vanguard subscription.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct VanguardShardInfo {
    /// The consensus slot of the Vanguard block.
    pub slot: Slot,
    /// Root of the Vanguard block.
    pub block_root: Hash32,
    /// Root of the Vanguard block's parent.
    pub parent_root: Hash32,
    /// Latest finalized slot reported by the consensus client.
    pub finalized_slot: Slot,
    /// Latest finalized epoch reported by the consensus client.
    pub finalized_epoch: u64,
    /// The execution shard named by this Vanguard block.
    pub shard_info: ShardInfo,
}

/// A verified mirror of an execution header, stored inside a
/// [`MultiShardInfo`] record.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct ExecutionShard {
    /// Number of the execution block.
    pub block_number: u64,
    /// Hash of the execution header.
    pub hash: Hash32,
    /// Hash of the parent execution header.
    pub parent_hash: Hash32,
    /// Identifier of the shard blob.
    pub blob_id: u64,
    /// Transaction trie root.
    pub tx_root: Hash32,
    /// Receipt trie root.
    pub receipt_root: Hash32,
    /// State trie root.
    pub state_root: Hash32,
    /// Hash over the state root.
    pub state_root_hash: Hash32,
    /// Gas limit.
    pub gas_limit: u64,
    /// Gas used.
    pub gas_used: u64,
    /// Timestamp (unix seconds).
    pub time: u64,
}

impl ExecutionShard {
    /// Builds the verified mirror of a pending execution header.
    pub fn from_header(header: &ExecutionHeader) -> Self {
        Self {
            block_number: header.number,
            hash: header.hash,
            parent_hash: header.parent_hash,
            blob_id: header.extra.blob_id,
            tx_root: header.extra.tx_root,
            receipt_root: header.extra.receipt_root,
            state_root: header.extra.state_root,
            state_root_hash: header.extra.state_root_hash,
            gas_limit: header.extra.gas_limit,
            gas_used: header.extra.gas_used,
            time: header.time,
        }
    }
}

/// A verified record binding one Vanguard block to its execution shards.
/// Appended to the shard store under a monotonically increasing step id.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct MultiShardInfo {
    /// The consensus slot of the verified pair.
    pub slot: Slot,
    /// Root of the Vanguard block at this slot.
    pub slot_block_root: Hash32,
    /// Root of the Vanguard block's parent.
    pub parent_root: Hash32,
    /// The verified execution shards (exactly one per Vanguard block in this
    /// revision).
    pub shards: Vec<ExecutionShard>,
    /// Finalized slot at the time of verification.
    pub finalized_slot: Slot,
    /// Finalized epoch at the time of verification.
    pub finalized_epoch: u64,
}

impl MultiShardInfo {
    /// Returns the first (top) execution shard, if present.
    pub fn top_shard(&self) -> Option<&ExecutionShard> {
        self.shards.first()
    }
}

/// Outcome of a pairing decision for one slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub enum Status {
    /// No decision yet; the slot is waiting for its counterpart.
    Pending,
    /// The pair matched structurally and was appended to the verified store.
    Verified,
    /// The pair mismatched or the header was an orphan.
    Invalid,
    /// The slot was skipped (no Vanguard block named an execution shard).
    Skipped,
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Status::Pending => "Pending",
            Status::Verified => "Verified",
            Status::Invalid => "Invalid",
            Status::Skipped => "Skipped",
        };
        f.write_str(s)
    }
}

/// A confirmation published on the feed for each pairing decision.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct SlotInfoWithStatus {
    /// Hash of the Pandora header the decision is about.
    pub pandora_header_hash: Hash32,
    /// Root of the Vanguard block the decision is about (zero when the header
    /// had no accepted counterpart).
    pub vanguard_block_hash: Hash32,
    /// The decision.
    pub status: Status,
}

/// In-memory record of a detected chain reorganisation.
///
/// Created when an incoming Vanguard shard diverges from the verified tip but
/// anchors to an earlier verified record; resolved once the store has been
/// rewound and the divergent pair committed.
#[derive(Clone, Debug)]
pub struct ReorgStatus {
    /// Slot of the divergent Vanguard block.
    pub slot: Slot,
    /// Root of the divergent Vanguard block.
    pub block_root: Hash32,
    /// Step id of the common ancestor the store will be rewound to.
    pub parent_step_id: StepId,
    /// The common ancestor record.
    pub parent_shard_info: MultiShardInfo,
    /// Execution hash announced inside the divergent shard; used to recognise
    /// the matching Pandora header when it arrives.
    pub execution_hash: Hash32,
    /// Whether the store rewind has been carried out.
    pub has_resolved: bool,
}
