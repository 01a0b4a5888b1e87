//! Watcher error types.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::store::StoreError;

/// Errors from checkpoint operations.
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// A write tried to move a checkpoint backwards.
    #[error(
        "Stale checkpoint write for entity {entity_id}: {attempted} is older than {current}"
    )]
    StaleWrite {
        entity_id: u64,
        current: DateTime<Utc>,
        attempted: DateTime<Utc>,
    },

    /// Failed to read or write the checkpoint file.
    #[error("Checkpoint I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to serialize or parse the checkpoint file.
    #[error("Checkpoint serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors from update watcher operations.
#[derive(Error, Debug)]
pub enum WatcherError {
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
