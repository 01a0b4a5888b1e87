//! Append-only document store with a polled reader index.
//!
//! Writes append one JSON line per document under a write lock, so each
//! document is atomic and arrival order is total. Readers are served from an
//! in-memory index that catches up via [`JsonlTailer`]; a background poll
//! loop refreshes it, so `history` may lag the newest write by at most one
//! visibility interval. That lag is part of the contract, not a defect.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::error::StoreError;
use super::record::{content_hash, normalize_metrics, Document};
use super::tailer::JsonlTailer;

/// File name of the document stream inside the data directory.
pub const DOCUMENT_STREAM_FILE: &str = "documents.jsonl";

/// Reader-side index over the document stream.
#[derive(Debug)]
struct DocumentIndex {
    tailer: JsonlTailer<Document>,
    by_entity: BTreeMap<u64, Vec<Document>>,
    total: usize,
}

impl DocumentIndex {
    fn absorb(&mut self, docs: Vec<Document>) {
        for doc in docs {
            self.total += 1;
            let entry = self.by_entity.entry(doc.entity_id).or_default();
            entry.push(doc);
            // Explicit timestamps may arrive out of order; seq breaks ties.
            entry.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.seq.cmp(&b.seq)));
        }
    }
}

/// Append-only, per-entity document store.
#[derive(Debug)]
pub struct DocumentStore {
    path: PathBuf,
    writer: Mutex<tokio::fs::File>,
    index: RwLock<DocumentIndex>,
    next_seq: AtomicU64,
}

impl DocumentStore {
    /// Open (or create) the document stream in `data_dir` and load the
    /// existing records into the reader index.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the stream file cannot be created or
    /// read.
    pub async fn open(data_dir: &Path) -> Result<Arc<Self>, StoreError> {
        tokio::fs::create_dir_all(data_dir).await?;
        let path = data_dir.join(DOCUMENT_STREAM_FILE);
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        let store = Arc::new(Self {
            path: path.clone(),
            writer: Mutex::new(file),
            index: RwLock::new(DocumentIndex {
                tailer: JsonlTailer::new(path),
                by_entity: BTreeMap::new(),
                total: 0,
            }),
            next_seq: AtomicU64::new(0),
        });
        store.refresh().await?;
        Ok(store)
    }

    /// Path of the underlying stream file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ingest one document.
    ///
    /// Metrics are validated and normalized at this boundary; a document
    /// with any non-numeric metric is rejected whole. When `timestamp` is
    /// omitted the current time is assigned. The write is atomic per
    /// document, and visibility to `history` lags by at most one poll of
    /// the reader index.
    ///
    /// Duplicate content (same hash for the same entity) is accepted as a
    /// new document; deduplication is deliberately not automatic.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Validation`] for malformed metrics and
    /// [`StoreError::Io`] when the append fails.
    pub async fn ingest(
        &self,
        entity_id: u64,
        document_type: &str,
        raw_text: &str,
        metrics: &BTreeMap<String, serde_json::Value>,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<Uuid, StoreError> {
        let metrics = normalize_metrics(metrics)?;
        let hash = content_hash(entity_id, document_type, raw_text, &metrics);

        if self.has_content_hash(entity_id, &hash).await {
            tracing::debug!(entity_id, hash = %hash, "Duplicate content resubmitted, storing as new document");
        }

        let mut doc = Document {
            document_id: Uuid::new_v4(),
            entity_id,
            document_type: document_type.to_string(),
            timestamp: timestamp.unwrap_or_else(Utc::now),
            seq: 0,
            raw_text: raw_text.to_string(),
            metrics,
            content_hash: hash,
        };

        // Sequence assignment and the append happen under the same lock so
        // that seq order equals on-disk arrival order.
        let mut writer = self.writer.lock().await;
        doc.seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let mut line = serde_json::to_string(&doc)?;
        line.push('\n');
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        drop(writer);

        tracing::info!(
            entity_id,
            document_id = %doc.document_id,
            document_type = %doc.document_type,
            metrics = doc.metrics.len(),
            "Document ingested"
        );
        Ok(doc.document_id)
    }

    /// Catch the reader index up with the stream file.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the stream cannot be read.
    pub async fn refresh(&self) -> Result<(), StoreError> {
        let mut index = self.index.write().await;
        let new = index.tailer.read_new().await?;
        if !new.is_empty() {
            if let Some(max_seq) = new.iter().map(|d| d.seq).max() {
                self.next_seq.fetch_max(max_seq + 1, Ordering::SeqCst);
            }
            tracing::debug!(count = new.len(), "Reader index absorbed new documents");
            index.absorb(new);
        }
        Ok(())
    }

    /// Ordered history for an entity, ascending by (timestamp, seq).
    ///
    /// Served from the reader index; unknown entities yield an empty
    /// history rather than an error.
    pub async fn history(&self, entity_id: u64, since: Option<DateTime<Utc>>) -> Vec<Document> {
        let index = self.index.read().await;
        index
            .by_entity
            .get(&entity_id)
            .map(|docs| {
                docs.iter()
                    .filter(|d| since.is_none_or(|s| d.timestamp >= s))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Look up a single document by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::DocumentNotFound`] when no visible document
    /// has this id.
    pub async fn get(&self, document_id: Uuid) -> Result<Document, StoreError> {
        let index = self.index.read().await;
        index
            .by_entity
            .values()
            .flatten()
            .find(|d| d.document_id == document_id)
            .cloned()
            .ok_or(StoreError::DocumentNotFound(document_id))
    }

    /// Timestamp of the newest visible document for an entity.
    pub async fn latest_timestamp(&self, entity_id: u64) -> Option<DateTime<Utc>> {
        let index = self.index.read().await;
        index
            .by_entity
            .get(&entity_id)
            .and_then(|docs| docs.last())
            .map(|d| d.timestamp)
    }

    /// The newest visible document for an entity.
    pub async fn latest_document(&self, entity_id: u64) -> Option<Document> {
        let index = self.index.read().await;
        index
            .by_entity
            .get(&entity_id)
            .and_then(|docs| docs.last())
            .cloned()
    }

    /// Number of visible documents across all entities.
    pub async fn document_count(&self) -> usize {
        self.index.read().await.total
    }

    async fn has_content_hash(&self, entity_id: u64, hash: &str) -> bool {
        let index = self.index.read().await;
        index
            .by_entity
            .get(&entity_id)
            .is_some_and(|docs| docs.iter().any(|d| d.content_hash == hash))
    }

    /// Spawn the background poll loop that keeps the reader index fresh.
    ///
    /// `interval` is the visibility interval: a reader observes any write
    /// within at most this long. The loop exits when `cancel` fires.
    pub fn spawn_poll_loop(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    () = cancel.cancelled() => {
                        tracing::debug!("Document store poll loop stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = store.refresh().await {
                            tracing::warn!(error = %e, "Document index refresh failed");
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn metrics(pairs: &[(&str, f64)]) -> BTreeMap<String, serde_json::Value> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), serde_json::json!(v)))
            .collect()
    }

    #[tokio::test]
    async fn test_ingest_and_history() {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::open(dir.path()).await.unwrap();

        store
            .ingest(1, "lab_report", "glucose 165", &metrics(&[("glucose", 165.0)]), None)
            .await
            .unwrap();
        store.refresh().await.unwrap();

        let history = store.history(1, None).await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].entity_id, 1);
        assert!((history[0].metrics["glucose"].value - 165.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_visibility_lag_until_refresh() {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::open(dir.path()).await.unwrap();

        store
            .ingest(1, "lab_report", "text", &metrics(&[("glucose", 100.0)]), None)
            .await
            .unwrap();

        // Not yet refreshed: the write is durable but not visible.
        assert!(store.history(1, None).await.is_empty());
        store.refresh().await.unwrap();
        assert_eq!(store.history(1, None).await.len(), 1);
    }

    #[tokio::test]
    async fn test_history_ordered_with_explicit_timestamps() {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::open(dir.path()).await.unwrap();
        let base = Utc::now();

        // Ingested out of chronological order.
        store
            .ingest(1, "lab_report", "b", &metrics(&[]), Some(base + chrono::Duration::days(30)))
            .await
            .unwrap();
        store
            .ingest(1, "lab_report", "a", &metrics(&[]), Some(base))
            .await
            .unwrap();
        store.refresh().await.unwrap();

        let history = store.history(1, None).await;
        assert_eq!(history.len(), 2);
        assert!(history[0].timestamp <= history[1].timestamp);
        assert_eq!(history[0].raw_text, "a");
    }

    #[tokio::test]
    async fn test_same_timestamp_tie_broken_by_arrival() {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::open(dir.path()).await.unwrap();
        let ts = Utc::now();

        store
            .ingest(1, "lab_report", "first", &metrics(&[]), Some(ts))
            .await
            .unwrap();
        store
            .ingest(1, "lab_report", "second", &metrics(&[]), Some(ts))
            .await
            .unwrap();
        store.refresh().await.unwrap();

        let history = store.history(1, None).await;
        assert_eq!(history[0].raw_text, "first");
        assert_eq!(history[1].raw_text, "second");
        assert!(history[0].seq < history[1].seq);
    }

    #[tokio::test]
    async fn test_concurrent_ingest_keeps_order_invariant() {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::open(dir.path()).await.unwrap();

        let mut handles = Vec::new();
        for i in 0..20u64 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                store
                    .ingest(i % 3, "lab_report", &format!("doc {i}"), &BTreeMap::new(), None)
                    .await
                    .unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        store.refresh().await.unwrap();

        for entity in 0..3u64 {
            let history = store.history(entity, None).await;
            for pair in history.windows(2) {
                assert!(pair[0].timestamp <= pair[1].timestamp);
            }
        }
        assert_eq!(store.document_count().await, 20);
    }

    #[tokio::test]
    async fn test_ingest_rejects_non_numeric_metric() {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::open(dir.path()).await.unwrap();

        let mut raw = BTreeMap::new();
        raw.insert("glucose".to_string(), serde_json::json!("high"));
        let err = store
            .ingest(1, "lab_report", "text", &raw, None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation { .. }));

        store.refresh().await.unwrap();
        assert!(store.history(1, None).await.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_content_accepted_as_new_document() {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::open(dir.path()).await.unwrap();
        let m = metrics(&[("glucose", 165.0)]);

        let a = store.ingest(1, "lab_report", "same", &m, None).await.unwrap();
        store.refresh().await.unwrap();
        let b = store.ingest(1, "lab_report", "same", &m, None).await.unwrap();
        store.refresh().await.unwrap();

        assert_ne!(a, b);
        let history = store.history(1, None).await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].content_hash, history[1].content_hash);
    }

    #[tokio::test]
    async fn test_reopen_resumes_sequence() {
        let dir = TempDir::new().unwrap();
        {
            let store = DocumentStore::open(dir.path()).await.unwrap();
            store
                .ingest(1, "lab_report", "a", &BTreeMap::new(), None)
                .await
                .unwrap();
            store
                .ingest(1, "lab_report", "b", &BTreeMap::new(), None)
                .await
                .unwrap();
        }

        let store = DocumentStore::open(dir.path()).await.unwrap();
        assert_eq!(store.document_count().await, 2);
        store
            .ingest(1, "lab_report", "c", &BTreeMap::new(), None)
            .await
            .unwrap();
        store.refresh().await.unwrap();

        let history = store.history(1, None).await;
        assert_eq!(history.len(), 3);
        assert_eq!(history[2].seq, 2);
    }

    #[tokio::test]
    async fn test_get_unknown_document_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::open(dir.path()).await.unwrap();
        let err = store.get(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, StoreError::DocumentNotFound(_)));
    }

    #[tokio::test]
    async fn test_poll_loop_makes_writes_visible() {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::open(dir.path()).await.unwrap();
        let cancel = CancellationToken::new();
        let handle = store.spawn_poll_loop(Duration::from_millis(20), cancel.clone());

        store
            .ingest(1, "lab_report", "text", &BTreeMap::new(), None)
            .await
            .unwrap();

        // Visible within a couple of poll intervals.
        let mut seen = false;
        for _ in 0..20 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            if !store.history(1, None).await.is_empty() {
                seen = true;
                break;
            }
        }
        cancel.cancel();
        handle.await.unwrap();
        assert!(seen);
    }
}
