//! Configuration types.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::agent::orchestrator::DEFAULT_LOOKBACK_DAYS;
use crate::analyzer::{DeltaThresholds, DEFAULT_HORIZON_DAYS};
use crate::audit::default_audit_path;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ChronomedConfig {
    pub store: StoreConfig,
    pub temporal: TemporalConfig,
    pub analyzer: AnalyzerConfig,
    pub reasoning: ReasoningConfig,
    pub signals: SignalsConfig,
    pub watcher: WatcherConfig,
    pub audit: AuditConfig,
}

/// Configuration for the stream stores.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding the stream files.
    pub data_dir: PathBuf,
    /// Reader index poll interval, milliseconds. Bounds how long a write
    /// can stay invisible.
    pub visibility_interval_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("chronomed"),
            visibility_interval_ms: 1000,
        }
    }
}

/// Configuration for temporal context retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TemporalConfig {
    /// Lookback window in days.
    pub lookback_days: u32,
}

impl Default for TemporalConfig {
    fn default() -> Self {
        Self {
            lookback_days: DEFAULT_LOOKBACK_DAYS,
        }
    }
}

/// Configuration for the change analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Delta event thresholds.
    pub thresholds: DeltaThresholds,
    /// Projection horizon in days.
    pub horizon_days: u32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            thresholds: DeltaThresholds::default(),
            horizon_days: DEFAULT_HORIZON_DAYS,
        }
    }
}

/// Configuration for the reasoning collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasoningConfig {
    /// Whether to consult the collaborator at all.
    pub enabled: bool,
    /// Base URL of the OpenAI-compatible endpoint.
    pub base_url: String,
    /// Model to request.
    pub model: String,
    /// Maximum tokens in response.
    pub max_tokens: u32,
    /// Environment variable name for the API key.
    pub api_key_env: String,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: "https://api.groq.com/openai/v1".to_string(),
            model: "llama-3.3-70b-versatile".to_string(),
            max_tokens: 1024,
            api_key_env: "GROQ_API_KEY".to_string(),
        }
    }
}

/// Configuration for the ML signal collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalsConfig {
    /// Whether to call the signal service. Off by default; the pipeline
    /// is complete without it.
    pub enabled: bool,
    /// Base URL of the signal service.
    pub base_url: String,
}

impl Default for SignalsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "http://localhost:8500".to_string(),
        }
    }
}

/// Configuration for the update watcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Poll interval in milliseconds.
    pub interval_ms: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self { interval_ms: 2000 }
    }
}

/// Configuration for the audit mirror.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Whether to mirror results at all.
    pub enabled: bool,
    /// Database path.
    pub db_path: PathBuf,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            db_path: default_audit_path(),
        }
    }
}
