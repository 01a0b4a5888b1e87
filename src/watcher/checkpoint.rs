//! Per-entity analysis checkpoints.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::error::CheckpointError;

/// File name of the checkpoint file inside the data directory.
pub const CHECKPOINT_FILE: &str = "checkpoints.json";

/// Persistent map of entity id to the newest analyzed timestamp.
///
/// Checkpoints only move forward. Writing an equal timestamp is an
/// idempotent no-op; writing an older one is a [`CheckpointError::StaleWrite`].
#[derive(Debug)]
pub struct CheckpointStore {
    path: PathBuf,
    state: Mutex<BTreeMap<u64, DateTime<Utc>>>,
}

impl CheckpointStore {
    /// Open (or create) the checkpoint file in `data_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::Io`] when the file cannot be read and
    /// [`CheckpointError::Serialize`] when it is malformed.
    pub async fn open(data_dir: &Path) -> Result<Self, CheckpointError> {
        tokio::fs::create_dir_all(data_dir).await?;
        let path = data_dir.join(CHECKPOINT_FILE);

        let state = match tokio::fs::read_to_string(&path).await {
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };

        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    /// The checkpoint for an entity, if one was ever recorded.
    pub async fn get(&self, entity_id: u64) -> Option<DateTime<Utc>> {
        self.state.lock().await.get(&entity_id).copied()
    }

    /// Advance an entity's checkpoint and persist the file.
    ///
    /// # Errors
    ///
    /// Returns [`CheckpointError::StaleWrite`] when `timestamp` is older
    /// than the recorded checkpoint, and I/O errors from persisting.
    pub async fn advance(
        &self,
        entity_id: u64,
        timestamp: DateTime<Utc>,
    ) -> Result<(), CheckpointError> {
        let mut state = self.state.lock().await;
        match state.get(&entity_id) {
            Some(current) if timestamp < *current => {
                return Err(CheckpointError::StaleWrite {
                    entity_id,
                    current: *current,
                    attempted: timestamp,
                });
            }
            Some(current) if timestamp == *current => return Ok(()),
            _ => {}
        }
        state.insert(entity_id, timestamp);
        self.persist(&state).await?;
        tracing::debug!(entity_id, checkpoint = %timestamp.to_rfc3339(), "Checkpoint advanced");
        Ok(())
    }

    /// Write the checkpoint file atomically (temp file + sync + rename).
    async fn persist(
        &self,
        state: &BTreeMap<u64, DateTime<Utc>>,
    ) -> Result<(), CheckpointError> {
        let json = serde_json::to_string_pretty(state)?;

        let temp_path = self.path.with_extension("json.tmp");
        let mut file = tokio::fs::File::create(&temp_path).await?;
        file.write_all(json.as_bytes()).await?;
        file.sync_data().await?;
        drop(file);

        tokio::fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }
}
