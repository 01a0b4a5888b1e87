//! Chronomed - temporal reasoning over longitudinal medical records.
//!
//! Append-only document streams per entity, windowed temporal context
//! with per-metric trends, local change analysis (deltas, risk band
//! progressions, linear projections) and an orchestrated pipeline that
//! consults optional external collaborators and degrades gracefully
//! without them.

pub mod agent;
pub mod analyzer;
pub mod audit;
pub mod config;
pub mod store;
pub mod temporal;
pub mod watcher;
