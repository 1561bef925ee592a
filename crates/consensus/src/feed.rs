// Path: crates/consensus/src/feed.rs

//! The confirmation feed.
//!
//! A multi-producer/multi-consumer broadcast carrying one
//! [`SlotInfoWithStatus`] per pairing decision. Delivery is best-effort: a
//! send with no subscribers is not an error, and a lagging subscriber drops
//! events rather than exerting backpressure on the engine.

use orc_types::shard::SlotInfoWithStatus;
use tokio::sync::broadcast;
use tracing::trace;

/// Multicast bus for confirmation tuples.
pub struct ConfirmationFeed {
    sender: broadcast::Sender<SlotInfoWithStatus>,
}

impl ConfirmationFeed {
    /// Creates a feed whose per-subscriber buffer holds `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Registers a new subscriber. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<SlotInfoWithStatus> {
        self.sender.subscribe()
    }

    /// Publishes a confirmation to all current subscribers.
    pub fn send(&self, info: SlotInfoWithStatus) {
        match self.sender.send(info) {
            Ok(delivered) => {
                trace!(target: "feed", delivered, status = %info.status, "Published confirmation")
            }
            Err(_) => {
                // No subscribers; the confirmation is simply dropped.
            }
        }
    }

    /// Number of currently attached subscribers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
