use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::quote::{Quote, Snapshot};

pub mod csv_export;
pub mod json_file;

pub use csv_export::export_csv;
pub use json_file::JsonFileStore;

/// Wire form of a snapshot as written to a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedSnapshot {
    pub entries: Vec<Quote>,
    pub captured_at: DateTime<Utc>,
}

impl PersistedSnapshot {
    /// Rebuild the in-memory snapshot, re-establishing the sort order.
    pub fn into_snapshot(self) -> Snapshot {
        Snapshot::new(self.entries, self.captured_at)
    }
}

impl From<&Snapshot> for PersistedSnapshot {
    fn from(snapshot: &Snapshot) -> Self {
        Self {
            entries: snapshot.entries().to_vec(),
            captured_at: snapshot.captured_at(),
        }
    }
}

/// Named-blob persistence consumed by the quote cache.
pub trait SnapshotStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<PersistedSnapshot>>;

    /// Overwrite whatever is stored under `key`.
    fn save(&self, key: &str, snapshot: &PersistedSnapshot) -> Result<()>;
}

/// Process-local store holding serialized blobs, mainly for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryStore {
    blobs: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Place a raw blob under `key`, bypassing serialization.
    pub fn insert_raw(&self, key: &str, blob: impl Into<String>) -> Result<()> {
        self.lock()?.insert(key.to_string(), blob.into());
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.blobs
            .lock()
            .map_err(|_| AppError::message("Failed to lock in-memory snapshot store"))
    }
}

impl SnapshotStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<PersistedSnapshot>> {
        let guard = self.lock()?;
        match guard.get(key) {
            Some(blob) => Ok(Some(serde_json::from_str(blob)?)),
            None => Ok(None),
        }
    }

    fn save(&self, key: &str, snapshot: &PersistedSnapshot) -> Result<()> {
        let blob = serde_json::to_string(snapshot)?;
        self.lock()?.insert(key.to_string(), blob);
        Ok(())
    }
}
