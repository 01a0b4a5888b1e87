//! Audit mirror with async `SQLite` operations.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use rusqlite::{params, Connection};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::agent::AnalysisResult;

use super::error::AuditError;
use super::schema::SCHEMA;

/// Returns the default path for the audit database.
///
/// This is `~/.local/share/chronomed/audit.db` on Unix systems.
#[must_use]
pub fn default_audit_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("chronomed")
        .join("audit.db")
}

/// Queryable mirror of analysis results.
///
/// Uses `SQLite` for persistent storage with async operations via
/// `spawn_blocking`. Writers treat it as best-effort; the stream files
/// stay authoritative.
#[derive(Debug, Clone)]
pub struct AuditLog {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl AuditLog {
    /// Open an audit database at the specified path.
    ///
    /// Creates parent directories if they don't exist and initializes the schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the schema cannot be applied.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.exists() {
                tokio::fs::create_dir_all(parent).await.map_err(|source| {
                    AuditError::CreateDir {
                        path: parent.to_path_buf(),
                        source,
                    }
                })?;
            }
        }

        let path_clone = path.clone();
        let conn = tokio::task::spawn_blocking(move || -> Result<Connection, AuditError> {
            let conn =
                Connection::open(&path_clone).map_err(|source| AuditError::DatabaseOpen {
                    path: path_clone,
                    source,
                })?;
            conn.execute_batch(SCHEMA)?;
            Ok(conn)
        })
        .await
        .map_err(|_| AuditError::TaskCancelled)??;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path),
        })
    }

    /// Open an in-memory audit database for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be created or the schema cannot be applied.
    pub async fn open_in_memory() -> Result<Self, AuditError> {
        let conn = tokio::task::spawn_blocking(|| -> Result<Connection, AuditError> {
            let conn = Connection::open_in_memory()?;
            conn.execute_batch(SCHEMA)?;
            Ok(conn)
        })
        .await
        .map_err(|_| AuditError::TaskCancelled)??;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        })
    }

    /// Returns the path to the database, if opened from a file.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Record one analysis result.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the insert fails.
    pub async fn log_analysis(&self, result: &AnalysisResult) -> Result<(), AuditError> {
        let id = Uuid::new_v4().to_string();
        let entity_id = i64::try_from(result.entity_id).unwrap_or(i64::MAX);
        let document_id = result.document_id.to_string();
        let analyzed_at = result.analyzed_at.to_rfc3339();
        let state = serde_json::to_string(&result.state)?
            .trim_matches('"')
            .to_string();
        let confidence = result.confidence;
        let payload = serde_json::to_string(result)?;

        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || -> Result<(), AuditError> {
            let conn = conn.blocking_lock();
            conn.execute(
                "INSERT INTO analyses (id, entity_id, document_id, analyzed_at, state, confidence, result)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![id, entity_id, document_id, analyzed_at, state, confidence, payload],
            )?;
            Ok(())
        })
        .await
        .map_err(|_| AuditError::TaskCancelled)?
    }

    /// Recent results for an entity, newest first.
    ///
    /// Rows whose payload no longer deserializes are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn recent_for_entity(
        &self,
        entity_id: u64,
        limit: usize,
    ) -> Result<Vec<AnalysisResult>, AuditError> {
        let entity = i64::try_from(entity_id).unwrap_or(i64::MAX);
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || -> Result<Vec<AnalysisResult>, AuditError> {
            let conn = conn.blocking_lock();
            let mut stmt = conn.prepare(
                "SELECT result FROM analyses WHERE entity_id = ?1
                 ORDER BY analyzed_at DESC LIMIT ?2",
            )?;
            let payloads = stmt
                .query_map(params![entity, limit], |row| row.get::<_, String>(0))?
                .collect::<Result<Vec<_>, _>>()?;

            Ok(payloads
                .iter()
                .filter_map(|p| serde_json::from_str(p).ok())
                .collect())
        })
        .await
        .map_err(|_| AuditError::TaskCancelled)?
    }

    /// Count mirrored analyses across all entities.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn count_analyses(&self) -> Result<u64, AuditError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || -> Result<u64, AuditError> {
            let conn = conn.blocking_lock();
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM analyses", [], |row| row.get(0))?;
            Ok(count.unsigned_abs())
        })
        .await
        .map_err(|_| AuditError::TaskCancelled)?
    }
}
