//! Live memory substrate: append-only document and knowledge streams.
//!
//! Two separate streams share one layout (JSONL, one immutable record per
//! line): per-entity medical documents and entity-independent reference
//! knowledge. Readers observe writes through a polled index, giving a
//! bounded visibility lag instead of synchronous read-after-write.

pub mod documents;
pub mod error;
pub mod knowledge;
pub mod record;
pub mod tailer;

pub use documents::{DocumentStore, DOCUMENT_STREAM_FILE};
pub use error::StoreError;
pub use knowledge::{KnowledgeCorpus, KNOWLEDGE_STREAM_FILE};
pub use record::{Document, KnowledgeItem, MetricValue};
