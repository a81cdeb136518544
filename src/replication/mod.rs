//! Replication Module
//!
//! Propagates primary mutations to secondary stores, either by mirroring
//! them before the caller is answered or by queueing them for a
//! background worker.

mod mirror;
mod queue;
pub mod record;
mod replicator;
mod worker;

pub use mirror::SyncMirrorer;
pub use queue::ReplicationQueue;
pub use record::{ApplyOutcome, ChangeOp, ChangeRecord, Sequence};
pub use replicator::AsyncReplicator;
pub use worker::{DrainReport, ReplicationWorker, WorkerStatsSnapshot};

use serde::Serialize;

use crate::config::ReplicationMode;
use crate::store::StoreCounts;

/// Replication state of one secondary
#[derive(Debug, Clone, Serialize)]
pub struct ReplicaStatus {
    pub name: String,
    pub counts: StoreCounts,
    /// Records accepted but not yet applied
    pub pending: usize,
    /// Worker counters (async mode only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker: Option<WorkerStatsSnapshot>,
}

/// How a change reaches the secondaries
#[async_trait::async_trait]
pub trait ReplicationStrategy: Send + Sync {
    fn mode(&self) -> ReplicationMode;

    /// Hand over a change. Resolves once the strategy's guarantee holds:
    /// every secondary persisted (sync) or the change queued (async).
    async fn propagate(&self, record: ChangeRecord) -> crate::Result<()>;

    /// Current state of every secondary
    async fn replicas(&self) -> Vec<ReplicaStatus>;
}
