//! Optional ML signal collaborator.
//!
//! Extracts structured signals (clinical entities, medications, anomaly
//! flags) from a document's raw text. Signal failures never fail a
//! pipeline run; the result simply carries no signals.

use std::collections::BTreeMap;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::MetricValue;

use super::{build_http_client, calculate_backoff, should_retry};

/// Errors from signal collaborator operations.
#[derive(Error, Debug)]
pub enum SignalError {
    #[error("Signal request failed: {0}")]
    RequestFailed(String),
    #[error("Failed to parse signal response: {0}")]
    ParseError(String),
    #[error("Signal request timed out")]
    Timeout,
}

/// One extracted signal with its confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub label: String,
    pub confidence: f64,
}

/// Structured signals extracted from one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MlSignals {
    /// Recognized clinical entities (conditions, observations).
    #[serde(default)]
    pub entities: Vec<Signal>,
    /// Recognized medication mentions.
    #[serde(default)]
    pub medications: Vec<Signal>,
    /// Values the collaborator flags as anomalous.
    #[serde(default)]
    pub anomalies: Vec<Signal>,
}

impl MlSignals {
    /// Whether any signal was extracted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty() && self.medications.is_empty() && self.anomalies.is_empty()
    }
}

/// Trait for ML signal collaborators.
#[async_trait]
pub trait SignalProvider: Send + Sync {
    /// Extract signals from document text and metrics.
    async fn extract(
        &self,
        text: &str,
        metrics: &BTreeMap<String, MetricValue>,
    ) -> Result<MlSignals, SignalError>;
}

/// HTTP signal provider posting to an `/extract` endpoint.
#[derive(Debug, Clone)]
pub struct HttpSignalProvider {
    client: Client,
    base_url: String,
}

impl HttpSignalProvider {
    /// Create a new provider.
    #[must_use]
    pub fn new(base_url: String) -> Self {
        Self {
            client: build_http_client(),
            base_url,
        }
    }
}

#[async_trait]
impl SignalProvider for HttpSignalProvider {
    async fn extract(
        &self,
        text: &str,
        metrics: &BTreeMap<String, MetricValue>,
    ) -> Result<MlSignals, SignalError> {
        let url = format!("{}/extract", self.base_url.trim_end_matches('/'));
        let body = serde_json::json!({ "text": text, "metrics": metrics });

        let mut attempt = 0;
        loop {
            let response = self
                .client
                .post(&url)
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        SignalError::Timeout
                    } else {
                        SignalError::RequestFailed(e.to_string())
                    }
                })?;

            let status = response.status();
            if status.is_success() {
                return response
                    .json::<MlSignals>()
                    .await
                    .map_err(|e| SignalError::ParseError(e.to_string()));
            }

            let status_code = status.as_u16();
            if should_retry(status_code, attempt) {
                let backoff = calculate_backoff(attempt);
                tracing::warn!(status = status_code, attempt, "Signal request failed, retrying");
                tokio::time::sleep(backoff).await;
                attempt += 1;
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            return Err(SignalError::RequestFailed(format!("HTTP {status}: {body}")));
        }
    }
}
