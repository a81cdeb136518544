//! Replication Queue
//!
//! Unbounded FIFO of change records waiting for one secondary. A single
//! mutex covers both ends; enqueue never waits on a drain in progress
//! beyond the swap of the buffer.

use std::collections::VecDeque;

use tokio::sync::Mutex;

use super::record::ChangeRecord;

pub struct ReplicationQueue {
    /// Name of the secondary this queue feeds
    target: String,
    records: Mutex<VecDeque<ChangeRecord>>,
}

impl ReplicationQueue {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            records: Mutex::new(VecDeque::new()),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    /// Append a record at the tail
    pub async fn push(&self, record: ChangeRecord) {
        let mut records = self.records.lock().await;
        records.push_back(record);
        tracing::trace!("Queued change for {} ({} pending)", self.target, records.len());
    }

    /// Remove and return everything queued right now, oldest first.
    /// Records pushed afterwards stay for the next call.
    pub async fn take_all(&self) -> Vec<ChangeRecord> {
        let mut records = self.records.lock().await;
        std::mem::take(&mut *records).into()
    }

    /// Copy of the pending records, oldest first
    pub async fn pending(&self) -> Vec<ChangeRecord> {
        self.records.lock().await.iter().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}
