//! Queryable audit mirror of analysis results.
//!
//! The stream files are the source of truth; the mirror is a convenience
//! for ad-hoc queries and is written asynchronously after each run. A lost
//! mirror write is logged, never reconciled.

mod error;
mod logger;
mod schema;

pub use error::AuditError;
pub use logger::{default_audit_path, AuditLog};
pub use schema::{SCHEMA, SCHEMA_VERSION};
