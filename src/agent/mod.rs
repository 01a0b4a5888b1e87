//! Analysis orchestration and external collaborators.
//!
//! The orchestrator drives the pipeline: ingest, retrieve temporal
//! context, analyze change, query knowledge, consult the external
//! reasoning collaborator, compose the result. Collaborators are optional;
//! when reasoning is unavailable the run completes degraded with the
//! locally computed fields intact.

pub mod orchestrator;
pub mod reasoning;
pub mod result;
pub mod signals;
pub mod state;

use std::time::Duration;

use reqwest::Client;

pub use orchestrator::Orchestrator;
pub use reasoning::{HttpReasoningProvider, ReasoningError, ReasoningProvider, ReasoningRequest};
pub use result::{AnalysisResult, TemporalSummary};
pub use signals::{HttpSignalProvider, MlSignals, SignalError, SignalProvider};
pub use state::{PipelineState, PipelineStateMachine};

/// Connection timeout for collaborator HTTP requests.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Overall request timeout for collaborator HTTP requests.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum number of retries for transient failures.
const MAX_RETRIES: u32 = 3;

/// Build an HTTP client with proper timeout configuration.
fn build_http_client() -> Client {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .build()
        .expect("Failed to build HTTP client")
}

/// Determine if a request should be retried based on status code and attempt count.
fn should_retry(status_code: u16, attempt: u32) -> bool {
    if attempt >= MAX_RETRIES {
        return false;
    }
    // Retry on 5xx server errors
    (500..600).contains(&status_code)
}

/// Calculate exponential backoff duration for retry attempts.
fn calculate_backoff(attempt: u32) -> Duration {
    // Exponential backoff: 1s, 2s, 4s
    Duration::from_secs(1 << attempt)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_retry_logic() {
        assert!(should_retry(500, 0));
        assert!(should_retry(502, 1));
        assert!(should_retry(503, 2));

        assert!(!should_retry(400, 0));
        assert!(!should_retry(404, 0));
        assert!(!should_retry(429, 0));
        assert!(!should_retry(200, 0));

        assert!(!should_retry(500, MAX_RETRIES));
        assert!(!should_retry(503, MAX_RETRIES + 1));
    }

    #[test]
    fn test_calculate_backoff() {
        assert_eq!(calculate_backoff(0).as_secs(), 1);
        assert_eq!(calculate_backoff(1).as_secs(), 2);
        assert_eq!(calculate_backoff(2).as_secs(), 4);
    }

    #[test]
    fn test_http_client_builds() {
        let client = build_http_client();
        assert!(format!("{client:?}").contains("Client"));
    }
}
