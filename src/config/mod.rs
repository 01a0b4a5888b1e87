//! Configuration loading and types.

mod loader;
mod types;

pub use loader::{ConfigError, ConfigLoader};
pub use types::{
    AnalyzerConfig, AuditConfig, ChronomedConfig, ReasoningConfig, SignalsConfig, StoreConfig,
    TemporalConfig, WatcherConfig,
};
