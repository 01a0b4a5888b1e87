//! Append-only knowledge corpus with keyword-overlap queries.
//!
//! Reference material (guidelines, protocols, research summaries) is
//! entity-independent and shares the stream layout of the document store:
//! one JSON record per line, immutable once written.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use super::error::StoreError;
use super::record::KnowledgeItem;
use super::tailer::JsonlTailer;

/// File name of the knowledge stream inside the data directory.
pub const KNOWLEDGE_STREAM_FILE: &str = "knowledge.jsonl";

#[derive(Debug)]
struct KnowledgeIndex {
    tailer: JsonlTailer<KnowledgeItem>,
    items: Vec<KnowledgeItem>,
}

/// Append-only store of reference knowledge.
#[derive(Debug)]
pub struct KnowledgeCorpus {
    path: PathBuf,
    writer: Mutex<tokio::fs::File>,
    index: RwLock<KnowledgeIndex>,
}

impl KnowledgeCorpus {
    /// Open (or create) the knowledge stream in `data_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the stream file cannot be created or
    /// read.
    pub async fn open(data_dir: &Path) -> Result<Arc<Self>, StoreError> {
        tokio::fs::create_dir_all(data_dir).await?;
        let path = data_dir.join(KNOWLEDGE_STREAM_FILE);
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        let corpus = Arc::new(Self {
            path: path.clone(),
            writer: Mutex::new(file),
            index: RwLock::new(KnowledgeIndex {
                tailer: JsonlTailer::new(path),
                items: Vec::new(),
            }),
        });
        corpus.refresh().await?;
        Ok(corpus)
    }

    /// Path of the underlying stream file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ingest one knowledge item.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] when the append fails.
    pub async fn ingest(
        &self,
        title: &str,
        content: &str,
        source: &str,
    ) -> Result<Uuid, StoreError> {
        let item = KnowledgeItem {
            knowledge_id: Uuid::new_v4(),
            title: title.to_string(),
            content: content.to_string(),
            source: source.to_string(),
            ingested_at: Utc::now(),
        };

        let mut writer = self.writer.lock().await;
        let mut line = serde_json::to_string(&item)?;
        line.push('\n');
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        drop(writer);

        tracing::info!(knowledge_id = %item.knowledge_id, title = %item.title, source = %item.source, "Knowledge item ingested");
        Ok(item.knowledge_id)
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
            tracing::debug!(count = new.len(), "Knowledge index absorbed new items");
            index.items.extend(new);
        }
        Ok(())
    }

    /// Look up a single knowledge item by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::KnowledgeNotFound`] when no visible item has
    /// this id.
    pub async fn get(&self, knowledge_id: Uuid) -> Result<KnowledgeItem, StoreError> {
        let index = self.index.read().await;
        index
            .items
            .iter()
            .find(|i| i.knowledge_id == knowledge_id)
            .cloned()
            .ok_or(StoreError::KnowledgeNotFound(knowledge_id))
    }

    /// Query by keyword overlap.
    ///
    /// Each query term scores 2 when found in the title and 1 when found in
    /// the content, so ranking is monotonic in overlap count. Ties are
    /// broken by recency, most recent first.
    pub async fn query(&self, text: &str, limit: usize) -> Vec<KnowledgeItem> {
        let query_lower = text.to_lowercase();
        let terms: Vec<&str> = query_lower.split_whitespace().collect();
        if terms.is_empty() || limit == 0 {
            return Vec::new();
        }

        let index = self.index.read().await;
        let mut scored: Vec<(usize, &KnowledgeItem)> = index
            .items
            .iter()
            .filter_map(|item| {
                let title = item.title.to_lowercase();
                let content = item.content.to_lowercase();
                let score: usize = terms
                    .iter()
                    .map(|term| {
                        let mut s = 0;
                        if title.contains(term) {
                            s += 2;
                        }
                        if content.contains(term) {
                            s += 1;
                        }
                        s
                    })
                    .sum();
                (score > 0).then_some((score, item))
            })
            .collect();

        scored.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.ingested_at.cmp(&a.1.ingested_at)));
        scored.into_iter().take(limit).map(|(_, i)| i.clone()).collect()
    }

    /// Number of visible knowledge items.
    pub async fn item_count(&self) -> usize {
        self.index.read().await.items.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn corpus_with(items: &[(&str, &str, &str)]) -> (TempDir, Arc<KnowledgeCorpus>) {
        let dir = TempDir::new().unwrap();
        let corpus = KnowledgeCorpus::open(dir.path()).await.unwrap();
        for (title, content, source) in items {
            corpus.ingest(title, content, source).await.unwrap();
        }
        corpus.refresh().await.unwrap();
        (dir, corpus)
    }

    #[tokio::test]
    async fn test_query_ranks_by_overlap() {
        let (_dir, corpus) = corpus_with(&[
            ("Hypertension guideline", "blood pressure management", "AHA"),
            ("Glucose monitoring", "fasting glucose targets for diabetes", "ADA"),
            ("Glucose and diet", "glucose glucose glucose", "blog"),
        ])
        .await;

        let results = corpus.query("glucose diabetes", 5).await;
        assert_eq!(results.len(), 2);
        // Title hit + content hits for both terms beats content-only overlap.
        assert_eq!(results[0].title, "Glucose monitoring");
    }

    #[tokio::test]
    async fn test_query_tie_broken_by_recency() {
        let (_dir, corpus) = corpus_with(&[
            ("Statin therapy", "ldl reduction", "older"),
            ("Statin dosing", "ldl reduction", "newer"),
        ])
        .await;

        let results = corpus.query("ldl", 5).await;
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].source, "newer");
    }

    #[tokio::test]
    async fn test_query_respects_limit() {
        let (_dir, corpus) = corpus_with(&[
            ("A glucose", "glucose", "s"),
            ("B glucose", "glucose", "s"),
            ("C glucose", "glucose", "s"),
        ])
        .await;

        assert_eq!(corpus.query("glucose", 2).await.len(), 2);
        assert!(corpus.query("glucose", 0).await.is_empty());
    }

    #[tokio::test]
    async fn test_query_no_match() {
        let (_dir, corpus) = corpus_with(&[("Hypertension", "blood pressure", "AHA")]).await;
        assert!(corpus.query("oncology", 5).await.is_empty());
    }

    #[tokio::test]
    async fn test_get_unknown_id() {
        let (_dir, corpus) = corpus_with(&[]).await;
        let err = corpus.get(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, StoreError::KnowledgeNotFound(_)));
    }

    #[tokio::test]
    async fn test_items_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let corpus = KnowledgeCorpus::open(dir.path()).await.unwrap();
            corpus.ingest("T", "C", "S").await.unwrap();
        }
        let corpus = KnowledgeCorpus::open(dir.path()).await.unwrap();
        assert_eq!(corpus.item_count().await, 1);
    }
}
