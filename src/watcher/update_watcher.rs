//! Polling update watcher.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::agent::{AnalysisResult, Orchestrator};

use super::checkpoint::CheckpointStore;
use super::error::WatcherError;

/// Outcome of one update check.
#[derive(Debug)]
pub struct UpdateCheck {
    /// Whether history newer than the checkpoint was found.
    pub has_updates: bool,
    /// Reanalysis of the newest document, when there were updates.
    pub result: Option<AnalysisResult>,
}

impl UpdateCheck {
    fn quiet() -> Self {
        Self {
            has_updates: false,
            result: None,
        }
    }
}

/// Detects new history per entity and triggers reanalysis.
///
/// Reanalysis never ingests anything, so checking repeatedly with no new
/// documents is stable: every check after a quiet one reports no updates.
pub struct UpdateWatcher {
    orchestrator: Arc<Orchestrator>,
    checkpoints: Arc<CheckpointStore>,
}

impl UpdateWatcher {
    #[must_use]
    pub fn new(orchestrator: Arc<Orchestrator>, checkpoints: Arc<CheckpointStore>) -> Self {
        Self {
            orchestrator,
            checkpoints,
        }
    }

    /// Check one entity for history newer than its checkpoint.
    ///
    /// On updates, the newest document is reanalyzed and the checkpoint is
    /// advanced only after the reanalysis completed, so a crash in between
    /// re-detects the same update on the next check.
    ///
    /// # Errors
    ///
    /// Returns [`WatcherError`] when the store refresh or the checkpoint
    /// write fails.
    pub async fn check_updates(&self, entity_id: u64) -> Result<UpdateCheck, WatcherError> {
        let store = self.orchestrator.store();
        store.refresh().await?;

        let Some(latest) = store.latest_timestamp(entity_id).await else {
            return Ok(UpdateCheck::quiet());
        };
        if self
            .checkpoints
            .get(entity_id)
            .await
            .is_some_and(|checkpoint| latest <= checkpoint)
        {
            return Ok(UpdateCheck::quiet());
        }

        let Some(document) = store.latest_document(entity_id).await else {
            return Ok(UpdateCheck::quiet());
        };

        tracing::info!(
            entity_id,
            document_id = %document.document_id,
            timestamp = %latest.to_rfc3339(),
            "New history detected, reanalyzing"
        );
        let result = self.orchestrator.reanalyze_document(&document).await;
        self.checkpoints.advance(entity_id, latest).await?;

        Ok(UpdateCheck {
            has_updates: true,
            result: Some(result),
        })
    }

    /// Spawn the poll loop for one entity. Exits when `cancel` fires.
    pub fn spawn_watch_loop(
        self: &Arc<Self>,
        entity_id: u64,
        interval: Duration,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let watcher = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        tracing::debug!(entity_id, "Update watcher stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        match watcher.check_updates(entity_id).await {
                            Ok(check) if check.has_updates => {
                                tracing::info!(entity_id, "Reanalysis triggered by watcher");
                            }
                            Ok(_) => {}
                            Err(e) => {
                                tracing::warn!(entity_id, error = %e, "Update check failed");
                            }
                        }
                    }
                }
            }
        })
    }
}
