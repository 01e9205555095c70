use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use crate::error::{AppError, Context, Result};
use crate::utils::sanitize_store_key;

use super::{PersistedSnapshot, SnapshotStore};

/// Keeps one pretty-printed JSON file per store key inside a directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, key: &str) -> Result<PathBuf> {
        let slug = sanitize_store_key(key)
            .ok_or_else(|| AppError::message(format!("Store key `{key}` has no usable characters")))?;
        Ok(self.dir.join(format!("{slug}.json")))
    }
}

impl SnapshotStore for JsonFileStore {
    fn load(&self, key: &str) -> Result<Option<PersistedSnapshot>> {
        let path = self.path_for(key)?;
        let data = match fs::read_to_string(&path) {
            Ok(data) => data,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(AppError::message(format!(
                    "Failed to read snapshot file {}: {}",
                    path.display(),
                    err
                )));
            }
        };

        let snapshot = serde_json::from_str(&data)
            .with_context(|| format!("Failed to parse snapshot file {}", path.display()))?;
        Ok(Some(snapshot))
    }

    fn save(&self, key: &str, snapshot: &PersistedSnapshot) -> Result<()> {
        let path = self.path_for(key)?;
        fs::create_dir_all(&self.dir).with_context(|| {
            format!("Failed to create snapshot directory {}", self.dir.display())
        })?;

        let json =
            serde_json::to_string_pretty(snapshot).context("Failed to serialize snapshot")?;

        // Write beside the target then rename so readers never see a half-written file.
        let staging = path.with_extension("json.tmp");
        let mut file = fs::File::create(&staging)
            .with_context(|| format!("Failed to create snapshot file {}", staging.display()))?;
        file.write_all(json.as_bytes())
            .with_context(|| format!("Failed to write snapshot file {}", staging.display()))?;
        file.sync_all()?;
        drop(file);

        fs::rename(&staging, &path)
            .with_context(|| format!("Failed to replace snapshot file {}", path.display()))?;
        Ok(())
    }
}
