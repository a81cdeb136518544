//! Replication Worker
//!
//! Periodically drains a replication queue into one secondary store.
//! Each cycle applies every record present at the start of the cycle in
//! FIFO order, then persists the secondary once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use super::queue::ReplicationQueue;
use super::record::ApplyOutcome;
use crate::error::Result;
use crate::store::SharedStore;

/// Outcome of a single drain cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// Records removed from the queue
    pub drained: usize,
    /// Records merged into the secondary
    pub applied: usize,
    /// Updates/deletes whose target was absent on the secondary
    pub dropped: usize,
    /// Whether the secondary snapshot was written
    pub persisted: bool,
}

/// Lifetime counters for a worker
#[derive(Debug, Default)]
struct WorkerStats {
    cycles: AtomicU64,
    applied: AtomicU64,
    dropped: AtomicU64,
    persist_failures: AtomicU64,
    last_applied_seq: AtomicU64,
}

/// Point-in-time copy of a worker's counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerStatsSnapshot {
    pub cycles: u64,
    pub applied: u64,
    pub dropped: u64,
    pub persist_failures: u64,
    pub last_applied_seq: u64,
}

pub struct ReplicationWorker {
    queue: Arc<ReplicationQueue>,
    secondary: SharedStore,
    drain_interval: Duration,
    stats: WorkerStats,
    shutdown: watch::Sender<bool>,
}

impl ReplicationWorker {
    pub fn new(queue: Arc<ReplicationQueue>, secondary: SharedStore, drain_interval: Duration) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            queue,
            secondary,
            drain_interval,
            stats: WorkerStats::default(),
            shutdown,
        }
    }

    pub fn queue(&self) -> &Arc<ReplicationQueue> {
        &self.queue
    }

    pub fn secondary(&self) -> &SharedStore {
        &self.secondary
    }

    pub fn stats(&self) -> WorkerStatsSnapshot {
        WorkerStatsSnapshot {
            cycles: self.stats.cycles.load(Ordering::Relaxed),
            applied: self.stats.applied.load(Ordering::Relaxed),
            dropped: self.stats.dropped.load(Ordering::Relaxed),
            persist_failures: self.stats.persist_failures.load(Ordering::Relaxed),
            last_applied_seq: self.stats.last_applied_seq.load(Ordering::Relaxed),
        }
    }

    /// Run one drain cycle.
    ///
    /// Records leave the queue before they are applied; if the final
    /// persist fails they are not re-queued.
    pub async fn drain_once(&self) -> Result<DrainReport> {
        let records = self.queue.take_all().await;
        if records.is_empty() {
            return Ok(DrainReport::default());
        }

        let mut report = DrainReport {
            drained: records.len(),
            ..Default::default()
        };

        let mut secondary = self.secondary.write().await;
        let mut last_applied = None;
        for record in &records {
            match record.apply_to(&mut secondary) {
                ApplyOutcome::Applied => {
                    report.applied += 1;
                    last_applied = Some(record.seq());
                    tracing::debug!("Applied {} to {}", record, secondary.name());
                }
                ApplyOutcome::Dropped => {
                    report.dropped += 1;
                    tracing::debug!("Dropped {}: target not on {}", record, secondary.name());
                }
            }
        }

        if let Some(seq) = last_applied {
            self.stats.last_applied_seq.store(seq, Ordering::Relaxed);
        }
        self.stats.cycles.fetch_add(1, Ordering::Relaxed);
        self.stats.applied.fetch_add(report.applied as u64, Ordering::Relaxed);
        self.stats.dropped.fetch_add(report.dropped as u64, Ordering::Relaxed);

        if let Err(e) = secondary.persist() {
            self.stats.persist_failures.fetch_add(1, Ordering::Relaxed);
            return Err(e);
        }
        report.persisted = true;

        tracing::info!(
            "Replication cycle for {}: {} drained, {} applied, {} dropped",
            secondary.name(),
            report.drained,
            report.applied,
            report.dropped
        );

        Ok(report)
    }

    /// Drain on every tick until [`stop`](Self::stop) is called, then run
    /// one last cycle so nothing acknowledged is left in memory.
    pub async fn run(&self) {
        let mut shutdown = self.shutdown.subscribe();
        let mut ticker = interval(self.drain_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            "Replication worker for {} started (every {:?})",
            self.queue.target(),
            self.drain_interval
        );

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.drain_once().await {
                        tracing::error!("Replication cycle for {} failed: {}", self.queue.target(), e);
                    }
                }
                _ = shutdown.changed() => break,
            }
        }

        if let Err(e) = self.drain_once().await {
            tracing::error!("Final replication cycle for {} failed: {}", self.queue.target(), e);
        }
        tracing::info!("Replication worker for {} stopped", self.queue.target());
    }

    /// Ask [`run`](Self::run) to finish
    pub fn stop(&self) {
        self.shutdown.send_replace(true);
    }
}
