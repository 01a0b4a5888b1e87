//! Store error types.

use uuid::Uuid;

/// Errors from document and knowledge store operations.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// A metric value failed numeric validation at the ingestion boundary.
    #[error("Invalid metric '{metric}': {reason}")]
    Validation { metric: String, reason: String },

    /// Explicit lookup of an unknown document id.
    #[error("Document {0} not found")]
    DocumentNotFound(Uuid),

    /// Explicit lookup of an unknown knowledge id.
    #[error("Knowledge item {0} not found")]
    KnowledgeNotFound(Uuid),

    /// Underlying file I/O failed.
    #[error("Store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Record could not be encoded or decoded.
    #[error("Record serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}
