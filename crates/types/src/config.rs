// Path: crates/types/src/config.rs

//! Shared configuration structures for the orchestrator process.

use serde::{Deserialize, Serialize};

/// Configuration for the reconciliation engine and its background tasks.
///
/// Every field carries a default so a minimal (or empty) TOML file yields a
/// runnable configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Unix timestamp of the chain's genesis; anchor for slot arithmetic.
    #[serde(default)]
    pub genesis_time: u64,

    /// Wall-clock seconds per consensus slot.
    #[serde(default = "default_seconds_per_slot")]
    pub seconds_per_slot: u64,

    /// Number of execution shards in the system.
    #[serde(default = "default_total_execution_shards")]
    pub total_execution_shards: u32,

    /// Number of execution shards named by each Vanguard block.
    #[serde(default = "default_shards_per_van_block")]
    pub shards_per_van_block: u32,

    /// Retention window for unverified cache entries, in slots.
    #[serde(default = "default_cache_ttl_slots")]
    pub cache_ttl_slots: u64,

    /// Maximum reorg depth considered when searching for a common ancestor,
    /// in slots.
    #[serde(default = "default_reorg_window_slots")]
    pub reorg_window_slots: u64,

    /// Period of the background cache sweep, in seconds.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Capacity of the confirmation feed's broadcast channel.
    #[serde(default = "default_feed_capacity")]
    pub feed_capacity: usize,
}

fn default_seconds_per_slot() -> u64 {
    6
}
fn default_total_execution_shards() -> u32 {
    1
}
fn default_shards_per_van_block() -> u32 {
    1
}
fn default_cache_ttl_slots() -> u64 {
    128
}
fn default_reorg_window_slots() -> u64 {
    64
}
fn default_sweep_interval_secs() -> u64 {
    30
}
fn default_feed_capacity() -> usize {
    1000
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            genesis_time: 0,
            seconds_per_slot: default_seconds_per_slot(),
            total_execution_shards: default_total_execution_shards(),
            shards_per_van_block: default_shards_per_van_block(),
            cache_ttl_slots: default_cache_ttl_slots(),
            reorg_window_slots: default_reorg_window_slots(),
            sweep_interval_secs: default_sweep_interval_secs(),
            feed_capacity: default_feed_capacity(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_toml() {
        let cfg: OrchestratorConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.seconds_per_slot, 6);
        assert_eq!(cfg.total_execution_shards, 1);
        assert_eq!(cfg.shards_per_van_block, 1);
        assert_eq!(cfg.cache_ttl_slots, 128);
        assert_eq!(cfg.reorg_window_slots, 64);
        assert_eq!(cfg.sweep_interval_secs, 30);
        assert_eq!(cfg.feed_capacity, 1000);
    }

    #[test]
    fn test_partial_override() {
        let cfg: OrchestratorConfig =
            toml::from_str("genesis_time = 1606824023\nseconds_per_slot = 12\n").unwrap();
        assert_eq!(cfg.genesis_time, 1_606_824_023);
        assert_eq!(cfg.seconds_per_slot, 12);
        assert_eq!(cfg.cache_ttl_slots, 128);
    }
}
