// Path: crates/consensus/src/lib.rs
#![forbid(unsafe_code)]

//! The reconciliation engine.
//!
//! Consumes pending header events from the Pandora (execution) chain and
//! shard-info events from the Vanguard (consensus) chain, pairs them by slot,
//! verifies structural agreement, appends verified records to the shard
//! store, and publishes confirmations on a broadcast feed. Divergent Vanguard
//! branches that anchor to an earlier verified record trigger a rewind of the
//! store before the divergent pair is committed.

pub mod cache;
pub mod engine;
pub mod feed;
pub mod reorg;
pub mod service;

pub use engine::{EngineError, ReconciliationEngine};
pub use feed::ConfirmationFeed;
pub use service::OrchestratorService;
