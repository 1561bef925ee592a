// Path: crates/api/src/storage/mod.rs

//! API for a durable, append-only store of verified shard records.

use orc_types::shard::MultiShardInfo;
use orc_types::slot::{Slot, StepId};
use thiserror::Error;

/// Encodes a u64 into a big-endian byte array, suitable for ordered key scans.
#[inline]
pub fn be64(x: u64) -> [u8; 8] {
    x.to_be_bytes()
}

/// Represents errors that can occur within the durable storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A generic error originating from the underlying key-value store
    /// backend (e.g., redb).
    #[error("backend error: {0}")]
    Backend(String),
    /// An error occurred while serializing data for storage.
    #[error("encode error: {0}")]
    Encode(String),
    /// An error occurred while deserializing data from storage.
    #[error("decode error: {0}")]
    Decode(String),
    /// The requested key or item was not found in the store.
    #[error("not found")]
    NotFound,
    /// An append was attempted at or below the current head.
    #[error("stale step id: requested {requested}, head is {latest}")]
    StaleStepId {
        /// The step id the caller tried to append at.
        requested: StepId,
        /// The store's current head step id.
        latest: StepId,
    },
    /// An append would break chain consecutiveness against the previous
    /// record.
    #[error("parent link mismatch appending step {step_id}")]
    ParentLinkMismatch {
        /// The step id the caller tried to append at.
        step_id: StepId,
    },
}

impl orc_types::error::ErrorCode for StorageError {
    fn code(&self) -> &'static str {
        match self {
            Self::Backend(_) => "STORE_BACKEND_ERROR",
            Self::Encode(_) => "STORE_ENCODE_ERROR",
            Self::Decode(_) => "STORE_DECODE_ERROR",
            Self::NotFound => "STORE_NOT_FOUND",
            Self::StaleStepId { .. } => "STORE_STALE_STEP_ID",
            Self::ParentLinkMismatch { .. } => "STORE_PARENT_LINK_MISMATCH",
        }
    }
}

/// The primary trait defining the API for the durable verified-shard store.
///
/// This interface abstracts the underlying storage backend (like `redb`) and
/// provides crash-safe access to four keyed spaces: the append-only record
/// log keyed by step id, the slot → step-id secondary index, and the scalar
/// head pointers (`latest_step_id`, `finalized_slot`, `finalized_epoch`).
///
/// Methods are synchronous: every write is a single short transaction, and
/// the engine serialises mutations under its own writer lock.
pub trait ShardStore: Send + Sync {
    /// Appends a verified record at `step_id`.
    ///
    /// Fails with [`StorageError::StaleStepId`] if `step_id` is not beyond
    /// the current head, and with [`StorageError::ParentLinkMismatch`] if the
    /// record does not extend the record at `step_id − 1` (both the Vanguard
    /// parent root and the execution parent hash must link).
    fn save_verified(&self, step_id: StepId, record: &MultiShardInfo) -> Result<(), StorageError>;

    /// Returns the verified record at `step_id`, if any.
    fn verified(&self, step_id: StepId) -> Result<Option<MultiShardInfo>, StorageError>;

    /// Advances the head pointer to `step_id`.
    fn save_latest_step_id(&self, step_id: StepId) -> Result<(), StorageError>;

    /// The current head step id; `0` when nothing has been verified yet.
    fn latest_step_id(&self) -> Result<StepId, StorageError>;

    /// Records `slot → step_id` in the secondary index, overwriting any
    /// previous mapping for the slot.
    fn save_slot_step_index(&self, slot: Slot, step_id: StepId) -> Result<(), StorageError>;

    /// Looks up the step id most recently recorded for `slot`.
    fn step_id_by_slot(&self, slot: Slot) -> Result<Option<StepId>, StorageError>;

    /// Removes the records in `[from_step_id, to_step_id_inclusive]` together
    /// with their slot-index entries. The removal is durably complete when
    /// this returns.
    fn remove_range(
        &self,
        from_step_id: StepId,
        to_step_id_inclusive: StepId,
    ) -> Result<(), StorageError>;

    /// Stores the finalized slot; non-increasing inputs are ignored silently.
    fn save_finalized_slot(&self, slot: Slot) -> Result<(), StorageError>;

    /// The latest stored finalized slot.
    fn finalized_slot(&self) -> Result<Slot, StorageError>;

    /// Stores the finalized epoch; non-increasing inputs are ignored silently.
    fn save_finalized_epoch(&self, epoch: u64) -> Result<(), StorageError>;

    /// The latest stored finalized epoch.
    fn finalized_epoch(&self) -> Result<u64, StorageError>;
}
