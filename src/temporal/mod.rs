//! Temporal context reconstruction.
//!
//! Rebuilds an entity's windowed history from the document store and
//! derives per-metric trends from it. Everything here is recomputed per
//! query; nothing is persisted.

pub mod context;

pub use context::{
    MetricTrend, TemporalContext, TemporalContextRetriever, TrendDirection,
    STABILITY_BAND_PERCENT,
};
