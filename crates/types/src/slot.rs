// Path: crates/types/src/slot.rs

//! Slot arithmetic and the real-time slot clock.

use std::time::{SystemTime, UNIX_EPOCH};

/// A consensus-time tick: `(now − genesis_time) / seconds_per_slot`.
pub type Slot = u64;

/// Append-monotonic index over verified records. `0` is a sentinel meaning
/// "no verified record yet".
pub type StepId = u64;

/// Derives the current slot from wall-clock time and the chain's genesis
/// parameters.
#[derive(Clone, Copy, Debug)]
pub struct SlotClock {
    genesis_time: u64,
    seconds_per_slot: u64,
}

impl SlotClock {
    /// Creates a clock anchored at `genesis_time` (unix seconds). A zero
    /// `seconds_per_slot` is treated as one to keep the division defined.
    pub fn new(genesis_time: u64, seconds_per_slot: u64) -> Self {
        Self {
            genesis_time,
            seconds_per_slot: seconds_per_slot.max(1),
        }
    }

    /// The slot containing the given unix timestamp. Saturates to slot 0 for
    /// timestamps before genesis.
    pub fn slot_at(&self, now_unix: u64) -> Slot {
        now_unix.saturating_sub(self.genesis_time) / self.seconds_per_slot
    }

    /// The slot containing the current wall-clock time.
    pub fn current_slot(&self) -> Slot {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        self.slot_at(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slot_arithmetic() {
        let clock = SlotClock::new(1_000, 6);
        assert_eq!(clock.slot_at(1_000), 0);
        assert_eq!(clock.slot_at(1_005), 0);
        assert_eq!(clock.slot_at(1_006), 1);
        assert_eq!(clock.slot_at(1_000 + 6 * 128), 128);
    }

    #[test]
    fn test_before_genesis_saturates() {
        let clock = SlotClock::new(5_000, 6);
        assert_eq!(clock.slot_at(10), 0);
    }

    #[test]
    fn test_zero_seconds_per_slot() {
        let clock = SlotClock::new(0, 0);
        assert_eq!(clock.slot_at(42), 42);
    }
}
