//! Synchronous Mirroring
//!
//! Applies each change to every secondary and persists them all before
//! the write is acknowledged. A secondary that cannot take the change, or
//! cannot be persisted, fails the write. The primary is not rolled back:
//! it keeps the mutation and stays the source of truth.

use super::record::{ApplyOutcome, ChangeRecord};
use super::{ReplicaStatus, ReplicationStrategy};
use crate::config::ReplicationMode;
use crate::error::{Error, Result};
use crate::store::SharedStore;

pub struct SyncMirrorer {
    secondaries: Vec<SharedStore>,
}

impl SyncMirrorer {
    pub fn new(secondaries: Vec<SharedStore>) -> Self {
        Self { secondaries }
    }

    pub fn secondaries(&self) -> &[SharedStore] {
        &self.secondaries
    }
}

#[async_trait::async_trait]
impl ReplicationStrategy for SyncMirrorer {
    fn mode(&self) -> ReplicationMode {
        ReplicationMode::Sync
    }

    async fn propagate(&self, record: ChangeRecord) -> Result<()> {
        let mut failures: Vec<(String, String)> = Vec::new();

        // Apply everywhere first
        for secondary in &self.secondaries {
            let mut store = secondary.write().await;
            if record.apply_to(&mut store) == ApplyOutcome::Dropped {
                failures.push((
                    store.name().to_string(),
                    format!("{} target {} is missing", record.op().kind(), record.op().entity_id()),
                ));
            }
        }

        // Then write every snapshot
        for secondary in &self.secondaries {
            let store = secondary.read().await;
            if let Err(e) = store.persist() {
                failures.push((store.name().to_string(), e.to_string()));
            }
        }

        if failures.is_empty() {
            tracing::debug!("Mirrored {} to {} secondaries", record, self.secondaries.len());
            return Ok(());
        }

        for (store, reason) in &failures {
            tracing::error!("Mirroring {} to {} failed: {} (primary keeps the change)", record, store, reason);
        }

        let stores: Vec<&str> = failures.iter().map(|(s, _)| s.as_str()).collect();
        let reasons: Vec<&str> = failures.iter().map(|(_, r)| r.as_str()).collect();
        Err(Error::Replication {
            store: stores.join(", "),
            reason: reasons.join("; "),
        })
    }

    async fn replicas(&self) -> Vec<ReplicaStatus> {
        let mut replicas = Vec::with_capacity(self.secondaries.len());
        for secondary in &self.secondaries {
            let store = secondary.read().await;
            replicas.push(ReplicaStatus {
                name: store.name().to_string(),
                counts: store.counts(),
                pending: 0,
                worker: None,
            });
        }
        replicas
    }
}
