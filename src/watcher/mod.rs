//! Live update detection.
//!
//! Watches the document stream for new history per entity and triggers
//! reanalysis when something arrived. Checkpoints record the newest
//! timestamp already analyzed, persist across restarts, and only ever
//! move forward.

mod checkpoint;
mod error;
mod update_watcher;

pub use checkpoint::{CheckpointStore, CHECKPOINT_FILE};
pub use error::{CheckpointError, WatcherError};
pub use update_watcher::{UpdateCheck, UpdateWatcher};
