// Path: crates/storage/src/redb_shard_store.rs

//! The redb-backed verified shard store.
//!
//! Four keyed spaces in a single database: the append-only record log keyed
//! by `be64(step_id)`, the `be64(slot)` → `be64(step_id)` secondary index,
//! and a scalar table holding the head pointer and the finalization marks.
//! Startup heals any crash that landed between members of the
//! (append, advance-head, update-index) group by truncating records beyond
//! the stored head.

use orc_api::storage::{be64, ShardStore, StorageError};
use orc_types::codec;
use orc_types::shard::MultiShardInfo;
use orc_types::slot::{Slot, StepId};
use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;
use tracing::info;

const VERIFIED: TableDefinition<&[u8; 8], &[u8]> = TableDefinition::new("verified-shard-info");
const SLOT_INDEX: TableDefinition<&[u8; 8], &[u8; 8]> = TableDefinition::new("slot-to-step-id");
const SCALARS: TableDefinition<&str, &[u8; 8]> = TableDefinition::new("scalars");

const LATEST_STEP_ID_KEY: &str = "latest-step-id";
const FINALIZED_SLOT_KEY: &str = "finalized-slot";
const FINALIZED_EPOCH_KEY: &str = "finalized-epoch";

fn backend<E: std::fmt::Display>(e: E) -> StorageError {
    StorageError::Backend(e.to_string())
}

/// A [`ShardStore`] on a single `redb` database file.
pub struct RedbShardStore {
    db: Database,
}

impl RedbShardStore {
    /// Opens (or creates) the store at `path` and heals any partially
    /// committed append group.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let db = Database::create(path.as_ref()).map_err(backend)?;

        // Ensure tables exist so later reads never hit a missing table.
        {
            let w = db.begin_write().map_err(backend)?;
            {
                w.open_table(VERIFIED).map_err(backend)?;
                w.open_table(SLOT_INDEX).map_err(backend)?;
                w.open_table(SCALARS).map_err(backend)?;
            }
            w.commit().map_err(backend)?;
        }

        let store = Self { db };
        store.heal()?;
        Ok(store)
    }

    /// Truncates every record whose step id exceeds the stored head,
    /// removing its slot-index entry in the same transaction. Appends write
    /// the record before the head pointer, so at most the records past the
    /// head are stray.
    fn heal(&self) -> Result<(), StorageError> {
        let head = self.latest_step_id()?;
        let w = self.db.begin_write().map_err(backend)?;
        let mut truncated = 0u64;
        {
            let mut records = w.open_table(VERIFIED).map_err(backend)?;
            let mut index = w.open_table(SLOT_INDEX).map_err(backend)?;
            let mut step = head + 1;
            loop {
                let slot = match records.get(&be64(step)).map_err(backend)? {
                    None => break,
                    Some(guard) => {
                        let record: MultiShardInfo = codec::from_bytes_canonical(guard.value())
                            .map_err(StorageError::Decode)?;
                        record.slot
                    }
                };
                records.remove(&be64(step)).map_err(backend)?;
                let maps_here = index
                    .get(&be64(slot))
                    .map_err(backend)?
                    .map(|g| u64::from_be_bytes(*g.value()) == step)
                    .unwrap_or(false);
                if maps_here {
                    index.remove(&be64(slot)).map_err(backend)?;
                }
                truncated += 1;
                step += 1;
            }
        }
        w.commit().map_err(backend)?;

        if truncated > 0 {
            info!(
                target: "storage",
                head,
                truncated,
                "Healed shard store: truncated records past the head pointer"
            );
        }
        Ok(())
    }

    fn read_scalar(&self, key: &str) -> Result<u64, StorageError> {
        let r = self.db.begin_read().map_err(backend)?;
        let t = r.open_table(SCALARS).map_err(backend)?;
        let value = t
            .get(key)
            .map_err(backend)?
            .map(|g| u64::from_be_bytes(*g.value()))
            .unwrap_or(0);
        Ok(value)
    }

    fn write_scalar(&self, key: &str, value: u64) -> Result<(), StorageError> {
        let w = self.db.begin_write().map_err(backend)?;
        {
            let mut t = w.open_table(SCALARS).map_err(backend)?;
            t.insert(key, &be64(value)).map_err(backend)?;
        }
        w.commit().map_err(backend)
    }

    /// Monotone scalar update; non-increasing inputs are ignored.
    fn write_scalar_monotone(&self, key: &str, value: u64) -> Result<(), StorageError> {
        if value <= self.read_scalar(key)? {
            return Ok(());
        }
        self.write_scalar(key, value)
    }
}

impl ShardStore for RedbShardStore {
    fn save_verified(&self, step_id: StepId, record: &MultiShardInfo) -> Result<(), StorageError> {
        let bytes = codec::to_bytes_canonical(record);
        let w = self.db.begin_write().map_err(backend)?;
        {
            let scalars = w.open_table(SCALARS).map_err(backend)?;
            let latest = scalars
                .get(LATEST_STEP_ID_KEY)
                .map_err(backend)?
                .map(|g| u64::from_be_bytes(*g.value()))
                .unwrap_or(0);
            if step_id <= latest {
                return Err(StorageError::StaleStepId {
                    requested: step_id,
                    latest,
                });
            }

            let mut records = w.open_table(VERIFIED).map_err(backend)?;
            if step_id >= 2 {
                let prev: MultiShardInfo = match records.get(&be64(step_id - 1)).map_err(backend)? {
                    None => return Err(StorageError::ParentLinkMismatch { step_id }),
                    Some(guard) => {
                        codec::from_bytes_canonical(guard.value()).map_err(StorageError::Decode)?
                    }
                };
                let roots_link = record.parent_root == prev.slot_block_root;
                let hashes_link = match (record.top_shard(), prev.top_shard()) {
                    (Some(new), Some(old)) => new.parent_hash == old.hash,
                    _ => false,
                };
                if !roots_link || !hashes_link {
                    return Err(StorageError::ParentLinkMismatch { step_id });
                }
            }
            records
                .insert(&be64(step_id), bytes.as_slice())
                .map_err(backend)?;
        }
        w.commit().map_err(backend)
    }

    fn verified(&self, step_id: StepId) -> Result<Option<MultiShardInfo>, StorageError> {
        let r = self.db.begin_read().map_err(backend)?;
        let t = r.open_table(VERIFIED).map_err(backend)?;
        let result = match t.get(&be64(step_id)).map_err(backend)? {
            None => Ok(None),
            Some(guard) => {
                let record =
                    codec::from_bytes_canonical(guard.value()).map_err(StorageError::Decode)?;
                Ok(Some(record))
            }
        };
        result
    }

    fn save_latest_step_id(&self, step_id: StepId) -> Result<(), StorageError> {
        self.write_scalar(LATEST_STEP_ID_KEY, step_id)
    }

    fn latest_step_id(&self) -> Result<StepId, StorageError> {
        self.read_scalar(LATEST_STEP_ID_KEY)
    }

    fn save_slot_step_index(&self, slot: Slot, step_id: StepId) -> Result<(), StorageError> {
        let w = self.db.begin_write().map_err(backend)?;
        {
            let mut t = w.open_table(SLOT_INDEX).map_err(backend)?;
            t.insert(&be64(slot), &be64(step_id)).map_err(backend)?;
        }
        w.commit().map_err(backend)
    }

    fn step_id_by_slot(&self, slot: Slot) -> Result<Option<StepId>, StorageError> {
        let r = self.db.begin_read().map_err(backend)?;
        let t = r.open_table(SLOT_INDEX).map_err(backend)?;
        let value = t
            .get(&be64(slot))
            .map_err(backend)?
            .map(|g| u64::from_be_bytes(*g.value()));
        Ok(value)
    }

    fn remove_range(
        &self,
        from_step_id: StepId,
        to_step_id_inclusive: StepId,
    ) -> Result<(), StorageError> {
        if from_step_id > to_step_id_inclusive {
            return Ok(());
        }
        let w = self.db.begin_write().map_err(backend)?;
        {
            let mut records = w.open_table(VERIFIED).map_err(backend)?;
            let mut index = w.open_table(SLOT_INDEX).map_err(backend)?;
            for step in from_step_id..=to_step_id_inclusive {
                let slot = match records.get(&be64(step)).map_err(backend)? {
                    None => continue,
                    Some(guard) => {
                        let record: MultiShardInfo = codec::from_bytes_canonical(guard.value())
                            .map_err(StorageError::Decode)?;
                        record.slot
                    }
                };
                records.remove(&be64(step)).map_err(backend)?;
                let maps_here = index
                    .get(&be64(slot))
                    .map_err(backend)?
                    .map(|g| u64::from_be_bytes(*g.value()) == step)
                    .unwrap_or(false);
                if maps_here {
                    index.remove(&be64(slot)).map_err(backend)?;
                }
            }
        }
        w.commit().map_err(backend)?;
        info!(
            target: "storage",
            from = from_step_id,
            to = to_step_id_inclusive,
            "Removed verified record range"
        );
        Ok(())
    }

    fn save_finalized_slot(&self, slot: Slot) -> Result<(), StorageError> {
        self.write_scalar_monotone(FINALIZED_SLOT_KEY, slot)
    }

    fn finalized_slot(&self) -> Result<Slot, StorageError> {
        self.read_scalar(FINALIZED_SLOT_KEY)
    }

    fn save_finalized_epoch(&self, epoch: u64) -> Result<(), StorageError> {
        self.write_scalar_monotone(FINALIZED_EPOCH_KEY, epoch)
    }

    fn finalized_epoch(&self) -> Result<u64, StorageError> {
        self.read_scalar(FINALIZED_EPOCH_KEY)
    }
}
