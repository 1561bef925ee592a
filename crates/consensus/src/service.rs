// Path: crates/consensus/src/service.rs

//! Long-lived service wrapper around the reconciliation engine.
//!
//! Owns the background tasks: one dispatcher per subscribed chain and the
//! periodic cache sweeper. All tasks observe a shared shutdown signal;
//! `stop()` flips it and awaits every handle, so in-flight reconciliation
//! calls always run to completion.

use crate::engine::{EngineError, ReconciliationEngine};
use orc_types::config::OrchestratorConfig;
use orc_types::shard::{PandoraHeaderInfo, VanguardShardInfo};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Drives the engine from the two producer channels and runs the TTL sweep.
pub struct OrchestratorService {
    engine: Arc<ReconciliationEngine>,
    sweep_interval: Duration,
    shutdown_sender: watch::Sender<bool>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
    is_running: AtomicBool,
}

impl OrchestratorService {
    /// Creates a stopped service around `engine`.
    pub fn new(engine: Arc<ReconciliationEngine>, config: &OrchestratorConfig) -> Self {
        let (shutdown_sender, _) = watch::channel(false);
        Self {
            engine,
            sweep_interval: Duration::from_secs(config.sweep_interval_secs.max(1)),
            shutdown_sender,
            task_handles: Mutex::new(Vec::new()),
            is_running: AtomicBool::new(false),
        }
    }

    /// The wrapped engine.
    pub fn engine(&self) -> &Arc<ReconciliationEngine> {
        &self.engine
    }

    /// Spawns the dispatcher and sweeper tasks. Events pushed into the two
    /// channels by the subscription clients flow into the engine from here on.
    pub async fn start(
        &self,
        pan_rx: mpsc::Receiver<PandoraHeaderInfo>,
        van_rx: mpsc::Receiver<VanguardShardInfo>,
    ) {
        if self.is_running.swap(true, Ordering::SeqCst) {
            warn!(target: "service", "Orchestrator service is already running");
            return;
        }

        let mut handles = self.task_handles.lock().await;
        handles.push(tokio::spawn(run_pandora_dispatcher(
            self.engine.clone(),
            pan_rx,
            self.shutdown_sender.subscribe(),
        )));
        handles.push(tokio::spawn(run_vanguard_dispatcher(
            self.engine.clone(),
            van_rx,
            self.shutdown_sender.subscribe(),
        )));
        handles.push(tokio::spawn(run_cache_sweeper(
            self.engine.clone(),
            self.sweep_interval,
            self.shutdown_sender.subscribe(),
        )));
        info!(target: "service", "Orchestrator service started");
    }

    /// Signals shutdown and awaits every background task.
    pub async fn stop(&self) {
        if !self.is_running.swap(false, Ordering::SeqCst) {
            return;
        }
        let _ = self.shutdown_sender.send(true);
        let mut handles = self.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        info!(target: "service", "Orchestrator service stopped");
    }

    /// Whether `start` has been called without a matching `stop`.
    pub fn is_running(&self) -> bool {
        self.is_running.load(Ordering::SeqCst)
    }
}

/// Forwards pending headers into the engine until shutdown or channel close.
async fn run_pandora_dispatcher(
    engine: Arc<ReconciliationEngine>,
    mut rx: mpsc::Receiver<PandoraHeaderInfo>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            maybe_info = rx.recv() => match maybe_info {
                Some(info) => {
                    if let Err(e) = engine.on_pandora_header(&info) {
                        if dispatcher_fatal(&e, "pandora") {
                            break;
                        }
                    }
                }
                None => {
                    debug!(target: "service", "Pandora subscription channel closed");
                    break;
                }
            },
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() { break; }
            }
        }
    }
}

/// Forwards shard info into the engine until shutdown or channel close.
async fn run_vanguard_dispatcher(
    engine: Arc<ReconciliationEngine>,
    mut rx: mpsc::Receiver<VanguardShardInfo>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            maybe_info = rx.recv() => match maybe_info {
                Some(info) => {
                    if let Err(e) = engine.on_vanguard_shard(&info) {
                        if dispatcher_fatal(&e, "vanguard") {
                            break;
                        }
                    }
                }
                None => {
                    debug!(target: "service", "Vanguard subscription channel closed");
                    break;
                }
            },
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() { break; }
            }
        }
    }
}

/// Logs a dispatch error and decides whether the loop must stop. Store
/// corruption is fatal; everything else is per-event and the loop continues.
fn dispatcher_fatal(e: &EngineError, chain: &str) -> bool {
    match e {
        EngineError::Corrupted(step) => {
            error!(target: "service", chain, step,
                "Shard store corrupted, stopping dispatcher for supervisor restart");
            true
        }
        other => {
            warn!(target: "service", chain, error = %other, "Failed to process event");
            false
        }
    }
}

/// Periodically evicts expired cache entries.
async fn run_cache_sweeper(
    engine: Arc<ReconciliationEngine>,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                engine.sweep_caches();
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() { break; }
            }
        }
    }
}
