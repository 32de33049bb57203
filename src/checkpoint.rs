//! Per-job checkpoint files so long-running ingests can resume.
//!
//! One JSON file per job id under the checkpoint directory. Writes go to a
//! temp file in the same directory and are renamed into place, so a crash
//! mid-write never corrupts the previous checkpoint.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Progress snapshot persisted after every batch flush.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Checkpoint {
    /// Chunks fully embedded and upserted so far
    pub chunks_processed: u64,
    /// md5 over the emitted chunk texts `0..chunks_processed`; lets a
    /// resumed run detect that the extractor produced a different prefix
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix_digest: Option<String>,
}

/// Handle on one job's checkpoint file.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(checkpoint_dir: &std::path::Path, job_id: &str) -> Self {
        Self {
            path: checkpoint_dir.join(format!("{job_id}.json")),
        }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Load the checkpoint, if any. An absent file means no progress; a
    /// file that exists but cannot be parsed is a fatal recovery error.
    pub fn load(&self) -> Result<Option<Checkpoint>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)?;
        let checkpoint = serde_json::from_str(&content).map_err(|e| {
            Error::Checkpoint(format!("corrupt checkpoint {}: {}", self.path.display(), e))
        })?;
        Ok(Some(checkpoint))
    }

    /// Atomically replace the checkpoint via temp-file + rename.
    pub fn write(&self, checkpoint: &Checkpoint) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp_path = self.path.with_extension("tmp");
        let content = serde_json::to_string(checkpoint)
            .map_err(|e| Error::Checkpoint(format!("failed to encode checkpoint: {e}")))?;
        std::fs::write(&tmp_path, content)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    /// Idempotent removal.
    pub fn delete(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_absent_file_loads_as_none() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path(), "job-1");
        assert_eq!(store.load().unwrap(), None);
        assert!(!store.exists());
    }

    #[test]
    fn test_write_load_roundtrip() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path(), "job-1");

        let checkpoint = Checkpoint {
            chunks_processed: 42,
            prefix_digest: Some("abc123".to_string()),
        };
        store.write(&checkpoint).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded, checkpoint);
    }

    #[test]
    fn test_write_replaces_previous() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path(), "job-1");

        for n in [2u64, 4, 6] {
            store
                .write(&Checkpoint {
                    chunks_processed: n,
                    prefix_digest: None,
                })
                .unwrap();
        }
        assert_eq!(store.load().unwrap().unwrap().chunks_processed, 6);
    }

    #[test]
    fn test_unknown_keys_tolerated_on_read() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path(), "job-1");
        std::fs::write(
            store.path(),
            r#"{"chunks_processed": 7, "legacy_field": true}"#,
        )
        .unwrap();
        assert_eq!(store.load().unwrap().unwrap().chunks_processed, 7);
    }

    #[test]
    fn test_corrupt_file_is_fatal() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path(), "job-1");
        std::fs::write(store.path(), "not json at all").unwrap();
        assert!(matches!(store.load(), Err(Error::Checkpoint(_))));
    }

    #[test]
    fn test_delete_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path(), "job-1");
        store
            .write(&Checkpoint {
                chunks_processed: 1,
                prefix_digest: None,
            })
            .unwrap();

        store.delete().unwrap();
        assert!(!store.exists());
        store.delete().unwrap();
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let dir = tempdir().unwrap();
        let store = CheckpointStore::new(dir.path(), "job-1");
        store
            .write(&Checkpoint {
                chunks_processed: 3,
                prefix_digest: None,
            })
            .unwrap();

        let entries: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(entries, vec!["job-1.json".to_string()]);
    }
}
