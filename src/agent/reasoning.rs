//! External reasoning collaborator.
//!
//! The collaborator is an OpenAI-compatible chat completion endpoint. It
//! receives the locally computed findings, never raw history, and returns
//! free-text reasoning that is attached to the analysis result verbatim.

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;

use crate::analyzer::{DeltaEvent, Projection, RiskProgression};
use crate::store::{Document, KnowledgeItem};

use super::{build_http_client, calculate_backoff, should_retry};

/// System prompt for the reasoning collaborator.
pub const REASONING_SYSTEM_PROMPT: &str = "\
You are a clinical reasoning assistant reviewing longitudinal patient data.
You receive pre-computed findings: metric trends, significant changes, risk
band progressions and naive projections, plus relevant reference material.
Interpret the findings in plain language. Highlight what changed, whether
the trajectory is concerning, and what deserves follow-up. Do not invent
values that are not in the findings. Keep the response under 300 words.";

/// Errors from reasoning collaborator operations.
#[derive(Error, Debug)]
pub enum ReasoningError {
    #[error("API key not configured (env: {0})")]
    MissingApiKey(String),
    #[error("API request failed: {0}")]
    RequestFailed(String),
    #[error("Failed to parse response: {0}")]
    ParseError(String),
    #[error("Reasoning request timed out")]
    Timeout,
}

/// Findings handed to the reasoning collaborator.
#[derive(Debug, Clone)]
pub struct ReasoningRequest {
    pub entity_id: u64,
    pub document: Document,
    pub trend_summary: String,
    pub delta_events: Vec<DeltaEvent>,
    pub risk_progressions: Vec<RiskProgression>,
    pub projections: Vec<Projection>,
    pub knowledge: Vec<KnowledgeItem>,
    pub first_analysis: bool,
}

impl ReasoningRequest {
    /// Render the findings as the user message for the collaborator.
    #[must_use]
    pub fn user_prompt(&self) -> String {
        let mut prompt = format!(
            "Entity {} received a new {} document.\n\nCurrent metrics:\n",
            self.entity_id, self.document.document_type
        );
        for (name, metric) in &self.document.metrics {
            match &metric.unit {
                Some(unit) => prompt.push_str(&format!("- {name}: {} {unit}\n", metric.value)),
                None => prompt.push_str(&format!("- {name}: {}\n", metric.value)),
            }
        }

        prompt.push_str(&format!("\nTrend summary: {}\n", self.trend_summary));

        if self.first_analysis {
            prompt.push_str("\nThis is the first analysis for this entity.\n");
        }

        if !self.delta_events.is_empty() {
            prompt.push_str("\nSignificant changes since the previous observation:\n");
            for event in &self.delta_events {
                prompt.push_str(&format!(
                    "- {}: {:+.1} ({:+.1}%)\n",
                    event.metric, event.magnitude, event.change_percent
                ));
            }
        }

        if !self.risk_progressions.is_empty() {
            prompt.push_str("\nRisk band movement:\n");
            for progression in &self.risk_progressions {
                if let Some((first, last)) = progression.endpoints() {
                    prompt.push_str(&format!(
                        "- {}: {first:?} -> {last:?} ({} transition(s))\n",
                        progression.metric,
                        progression.transitions.len()
                    ));
                }
            }
        }

        if !self.projections.is_empty() {
            prompt.push_str("\nLinear projections (heuristic, not a forecast):\n");
            for projection in &self.projections {
                prompt.push_str(&format!(
                    "- {}: {:.1} in {} days ({:?} confidence)\n",
                    projection.metric,
                    projection.predicted_value,
                    projection.horizon_days,
                    projection.confidence
                ));
            }
        }

        if !self.knowledge.is_empty() {
            prompt.push_str("\nRelevant reference material:\n");
            for item in &self.knowledge {
                prompt.push_str(&format!("- {} ({}): {}\n", item.title, item.source, item.content));
            }
        }

        prompt
    }
}

/// Trait for reasoning collaborators.
#[async_trait]
pub trait ReasoningProvider: Send + Sync {
    /// Produce free-text reasoning over the findings.
    async fn reason(&self, request: &ReasoningRequest) -> Result<String, ReasoningError>;
}

/// OpenAI-compatible chat completion provider.
#[derive(Debug, Clone)]
pub struct HttpReasoningProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
}

impl HttpReasoningProvider {
    /// Create a new provider.
    #[must_use]
    pub fn new(base_url: String, api_key: String, model: String, max_tokens: u32) -> Self {
        Self {
            client: build_http_client(),
            base_url,
            api_key,
            model,
            max_tokens,
        }
    }

    /// Create a provider reading the API key from the environment.
    ///
    /// # Errors
    ///
    /// Returns [`ReasoningError::MissingApiKey`] when the variable is
    /// unset or empty.
    pub fn from_env(
        base_url: String,
        api_key_env: &str,
        model: String,
        max_tokens: u32,
    ) -> Result<Self, ReasoningError> {
        let api_key = std::env::var(api_key_env)
            .ok()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ReasoningError::MissingApiKey(api_key_env.to_string()))?;
        Ok(Self::new(base_url, api_key, model, max_tokens))
    }

    /// Get the configured model.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ReasoningProvider for HttpReasoningProvider {
    async fn reason(&self, request: &ReasoningRequest) -> Result<String, ReasoningError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));

        let body = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_tokens,
            "messages": [
                { "role": "system", "content": REASONING_SYSTEM_PROMPT },
                { "role": "user", "content": request.user_prompt() }
            ]
        });

        let mut attempt = 0;
        loop {
            let response = self
                .client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&body)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        ReasoningError::Timeout
                    } else {
                        ReasoningError::RequestFailed(e.to_string())
                    }
                })?;

            let status = response.status();
            if status.is_success() {
                let json: serde_json::Value = response
                    .json()
                    .await
                    .map_err(|e| ReasoningError::ParseError(e.to_string()))?;

                return json["choices"][0]["message"]["content"]
                    .as_str()
                    .map(String::from)
                    .ok_or_else(|| {
                        ReasoningError::ParseError("No content in completion response".to_string())
                    });
            }

            let status_code = status.as_u16();
            if should_retry(status_code, attempt) {
                let backoff = calculate_backoff(attempt);
                tracing::warn!(status = status_code, attempt, "Reasoning request failed, retrying");
                tokio::time::sleep(backoff).await;
                attempt += 1;
                continue;
            }

            let text = response.text().await.unwrap_or_default();
            return Err(ReasoningError::RequestFailed(format!("HTTP {status}: {text}")));
        }
    }
}
