//! Asynchronous Replication
//!
//! Acknowledges a change as soon as it is queued. Every secondary has its
//! own queue and worker; the replicator fans each change out to all of
//! them in primary order.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use super::queue::ReplicationQueue;
use super::record::ChangeRecord;
use super::worker::ReplicationWorker;
use super::{ReplicaStatus, ReplicationStrategy};
use crate::config::ReplicationMode;
use crate::error::Result;
use crate::store::SharedStore;

pub struct AsyncReplicator {
    workers: Vec<Arc<ReplicationWorker>>,
}

impl AsyncReplicator {
    /// One queue and worker per secondary, all draining every `drain_interval`
    pub async fn new(secondaries: Vec<SharedStore>, drain_interval: Duration) -> Self {
        let mut workers = Vec::with_capacity(secondaries.len());
        for secondary in secondaries {
            let name = secondary.read().await.name().to_string();
            let queue = Arc::new(ReplicationQueue::new(name));
            workers.push(Arc::new(ReplicationWorker::new(queue, secondary, drain_interval)));
        }
        Self { workers }
    }

    pub fn workers(&self) -> &[Arc<ReplicationWorker>] {
        &self.workers
    }

    /// Start every worker's drain loop
    pub fn spawn_workers(&self) -> Vec<JoinHandle<()>> {
        self.workers
            .iter()
            .map(|worker| {
                let worker = Arc::clone(worker);
                tokio::spawn(async move { worker.run().await })
            })
            .collect()
    }

    /// Signal every worker to run its final cycle and exit
    pub fn stop_workers(&self) {
        for worker in &self.workers {
            worker.stop();
        }
    }

    /// Drain every queue once, without waiting for the schedule
    pub async fn drain_all(&self) -> Vec<Result<super::DrainReport>> {
        let mut reports = Vec::with_capacity(self.workers.len());
        for worker in &self.workers {
            reports.push(worker.drain_once().await);
        }
        reports
    }
}

#[async_trait::async_trait]
impl ReplicationStrategy for AsyncReplicator {
    fn mode(&self) -> ReplicationMode {
        ReplicationMode::Async
    }

    async fn propagate(&self, record: ChangeRecord) -> Result<()> {
        tracing::debug!("Queueing {} for {} secondaries", record, self.workers.len());

        if let Some((last, rest)) = self.workers.split_last() {
            for worker in rest {
                worker.queue().push(record.clone()).await;
            }
            last.queue().push(record).await;
        }
        Ok(())
    }

    async fn replicas(&self) -> Vec<ReplicaStatus> {
        let mut replicas = Vec::with_capacity(self.workers.len());
        for worker in &self.workers {
            let counts = worker.secondary().read().await.counts();
            replicas.push(ReplicaStatus {
                name: worker.queue().target().to_string(),
                counts,
                pending: worker.queue().len().await,
                worker: Some(worker.stats()),
            });
        }
        replicas
    }
}
