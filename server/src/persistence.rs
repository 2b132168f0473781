use crate::game::TableState;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs as async_fs;
use tracing::warn;

/// Bumped when the snapshot schema changes incompatibly. Files with a
/// different version are skipped on restore, never overwritten in place.
const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("snapshot io: {0}")]
    Io(#[from] io::Error),
    #[error("snapshot encoding: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Serialize, Deserialize)]
struct SnapshotFile {
    version: u32,
    #[serde(flatten)]
    state: TableState,
}

/// Borrowing twin of `SnapshotFile` so saves do not clone the whole state.
#[derive(Serialize)]
struct SnapshotFileRef<'a> {
    version: u32,
    #[serde(flatten)]
    state: &'a TableState,
}

/// One JSON file per table under the data directory, written atomically
/// (temp file with a random suffix, then rename) after every committed
/// intent.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    data_dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(data_dir: impl Into<PathBuf>) -> io::Result<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)?;
        Ok(SnapshotStore { data_dir })
    }

    fn path(&self, table_name: &str) -> PathBuf {
        self.data_dir.join(format!("{table_name}.json"))
    }

    pub async fn save(&self, state: &TableState) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(&SnapshotFileRef {
            version: SNAPSHOT_VERSION,
            state,
        })?;
        let tmp = self.data_dir.join(format!(
            ".{}.{:08x}.tmp",
            state.name,
            rand::thread_rng().next_u32()
        ));
        async_fs::write(&tmp, &bytes).await?;
        if let Err(e) = async_fs::rename(&tmp, self.path(&state.name)).await {
            let _ = async_fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Load a table snapshot. Missing, unreadable, or wrong-version files
    /// yield `None`; only the unreadable cases warrant a warning.
    pub async fn load(&self, table_name: &str) -> Result<Option<TableState>, StoreError> {
        let path = self.path(table_name);
        let bytes = match async_fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let parsed: SnapshotFile = match serde_json::from_slice(&bytes) {
            Ok(p) => p,
            Err(e) => {
                warn!(table = table_name, error = %e, "skipping unreadable snapshot");
                return Ok(None);
            }
        };
        if parsed.version != SNAPSHOT_VERSION {
            warn!(
                table = table_name,
                version = parsed.version,
                "skipping snapshot with unknown version"
            );
            return Ok(None);
        }
        Ok(Some(parsed.state))
    }

    pub async fn delete(&self, table_name: &str) -> Result<(), StoreError> {
        match async_fs::remove_file(self.path(table_name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Table names with a snapshot on disk (temp leftovers excluded).
    pub async fn scan(&self) -> Result<Vec<String>, StoreError> {
        let mut names = Vec::new();
        let mut entries = async_fs::read_dir(&self.data_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if !stem.starts_with('.') {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}
