//! Snapshot Persistence
//!
//! Full-state snapshots of a store's tables. Every write replaces the
//! previous snapshot entirely; there is no incremental log.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use super::model::TableSet;
use crate::error::{Error, Result};

/// Backing medium for one store's snapshot
pub trait SnapshotBackend: Send + Sync {
    /// Read the last snapshot, `None` if nothing was ever written
    fn read_snapshot(&self) -> Result<Option<TableSet>>;

    /// Replace the snapshot with `tables`
    fn write_snapshot(&self, tables: &TableSet) -> Result<()>;

    /// Human-readable location for logs
    fn location(&self) -> String;
}

/// Pretty-printed JSON file snapshot
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl SnapshotBackend for JsonFileBackend {
    fn read_snapshot(&self) -> Result<Option<TableSet>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if content.trim().is_empty() {
            return Ok(None);
        }

        Ok(Some(serde_json::from_str(&content)?))
    }

    fn write_snapshot(&self, tables: &TableSet) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = serde_json::to_string_pretty(tables)?;

        // Write aside and rename so a crash never leaves half a snapshot
        let tmp = self.temp_path();
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

/// In-process snapshot, used for ephemeral stores and tests
#[derive(Default)]
pub struct MemoryBackend {
    slot: Mutex<Option<TableSet>>,
    fail_writes: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent writes fail (simulates a full or read-only disk)
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Last successfully written snapshot
    pub fn last_written(&self) -> Option<TableSet> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl SnapshotBackend for MemoryBackend {
    fn read_snapshot(&self) -> Result<Option<TableSet>> {
        Ok(self.last_written())
    }

    fn write_snapshot(&self, tables: &TableSet) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "snapshot writes disabled",
            )));
        }
        *self.slot.lock().unwrap_or_else(|e| e.into_inner()) = Some(tables.clone());
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}

impl<T: SnapshotBackend + ?Sized> SnapshotBackend for std::sync::Arc<T> {
    fn read_snapshot(&self) -> Result<Option<TableSet>> {
        (**self).read_snapshot()
    }

    fn write_snapshot(&self, tables: &TableSet) -> Result<()> {
        (**self).write_snapshot(tables)
    }

    fn location(&self) -> String {
        (**self).location()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::model::{CartLine, Product};
    use tempfile::tempdir;

    fn sample_tables() -> TableSet {
        let mut tables = TableSet::default();
        tables.products.push(Product {
            id: 1,
            name: "Pen".into(),
            description: String::new(),
            price: 1.5,
            category: "Office".into(),
            in_stock: true,
        });
        tables.carts.insert("u1".into(), vec![CartLine { product_id: 1, quantity: 3 }]);
        tables.watermarks.product = 1;
        tables
    }

    #[test]
    fn test_missing_file_reads_as_none() {
        let dir = tempdir().unwrap();
        let backend = JsonFileBackend::new(dir.path().join("primary_db.json"));
        assert!(backend.read_snapshot().unwrap().is_none());
    }

    #[test]
    fn test_file_write_replaces_previous_snapshot() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("secondary_db.json");
        let backend = JsonFileBackend::new(path.clone());

        backend.write_snapshot(&sample_tables()).unwrap();
        backend.write_snapshot(&TableSet::default()).unwrap();

        let restored = backend.read_snapshot().unwrap().unwrap();
        assert_eq!(restored, TableSet::default());
        assert!(path.exists());
        assert!(!backend.temp_path().exists());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempdir().unwrap();
        let backend = JsonFileBackend::new(dir.path().join("primary_db.json"));
        let tables = sample_tables();

        backend.write_snapshot(&tables).unwrap();
        assert_eq!(backend.read_snapshot().unwrap(), Some(tables));
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("primary_db.json");
        std::fs::write(&path, "{ not json").unwrap();

        let backend = JsonFileBackend::new(path);
        assert!(backend.read_snapshot().is_err());
    }

    #[test]
    fn test_memory_backend_failure_injection() {
        let backend = MemoryBackend::new();
        backend.write_snapshot(&sample_tables()).unwrap();

        backend.set_fail_writes(true);
        assert!(backend.write_snapshot(&TableSet::default()).is_err());
        assert_eq!(backend.last_written(), Some(sample_tables()));
    }
}
