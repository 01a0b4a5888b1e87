//! Pipeline orchestrator.
//!
//! Runs the full analysis pipeline for one document. Collaborator
//! failures degrade the run instead of failing it; only ingestion errors
//! surface to the caller.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::analyzer::ChangeAnalyzer;
use crate::audit::AuditLog;
use crate::store::{Document, DocumentStore, KnowledgeCorpus, KnowledgeItem, StoreError};
use crate::temporal::TemporalContextRetriever;

use super::reasoning::{ReasoningProvider, ReasoningRequest};
use super::result::{blended_confidence, compose_recommendations, AnalysisResult, TemporalSummary};
use super::signals::{MlSignals, SignalProvider};
use super::state::{PipelineState, PipelineStateMachine};

/// Default lookback window in days.
pub const DEFAULT_LOOKBACK_DAYS: u32 = 365;

/// Knowledge items attached to one reasoning request.
const KNOWLEDGE_LIMIT: usize = 5;

/// Drives the analysis pipeline over the stores and collaborators.
pub struct Orchestrator {
    store: Arc<DocumentStore>,
    knowledge: Arc<KnowledgeCorpus>,
    retriever: TemporalContextRetriever,
    analyzer: ChangeAnalyzer,
    reasoning: Option<Arc<dyn ReasoningProvider>>,
    signals: Option<Arc<dyn SignalProvider>>,
    audit: Option<AuditLog>,
    lookback_days: u32,
}

impl Orchestrator {
    /// Create an orchestrator with local analysis only.
    #[must_use]
    pub fn new(store: Arc<DocumentStore>, knowledge: Arc<KnowledgeCorpus>) -> Self {
        Self {
            retriever: TemporalContextRetriever::new(Arc::clone(&store)),
            store,
            knowledge,
            analyzer: ChangeAnalyzer::default(),
            reasoning: None,
            signals: None,
            audit: None,
            lookback_days: DEFAULT_LOOKBACK_DAYS,
        }
    }

    /// Attach a reasoning collaborator.
    #[must_use]
    pub fn with_reasoning(mut self, provider: Arc<dyn ReasoningProvider>) -> Self {
        self.reasoning = Some(provider);
        self
    }

    /// Attach an ML signal collaborator.
    #[must_use]
    pub fn with_signals(mut self, provider: Arc<dyn SignalProvider>) -> Self {
        self.signals = Some(provider);
        self
    }

    /// Attach the audit mirror. Writes to it are fire-and-forget.
    #[must_use]
    pub fn with_audit(mut self, audit: AuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Replace the default change analyzer.
    #[must_use]
    pub fn with_analyzer(mut self, analyzer: ChangeAnalyzer) -> Self {
        self.analyzer = analyzer;
        self
    }

    /// Set the lookback window.
    #[must_use]
    pub fn with_lookback_days(mut self, days: u32) -> Self {
        self.lookback_days = days;
        self
    }

    /// The underlying document store.
    #[must_use]
    pub fn store(&self) -> &Arc<DocumentStore> {
        &self.store
    }

    /// Ingest a document and run the full pipeline on it.
    ///
    /// The reader index is refreshed after the ingest so the new document
    /// participates in its own temporal context.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when ingestion or the index refresh fails;
    /// collaborator failures degrade the result instead.
    pub async fn analyze_with_temporal_context(
        &self,
        entity_id: u64,
        document_type: &str,
        raw_text: &str,
        metrics: &BTreeMap<String, serde_json::Value>,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<AnalysisResult, StoreError> {
        let mut machine = PipelineStateMachine::new();

        let document_id = self
            .store
            .ingest(entity_id, document_type, raw_text, metrics, timestamp)
            .await?;
        self.store.refresh().await?;
        let document = self.store.get(document_id).await?;

        Ok(self.run_pipeline(&document, &mut machine).await)
    }

    /// Re-run the pipeline on an already stored document.
    ///
    /// Used when new history appears for an entity; nothing is ingested,
    /// so repeated reanalysis of the same document is idempotent from the
    /// store's point of view.
    pub async fn reanalyze_document(&self, document: &Document) -> AnalysisResult {
        let mut machine = PipelineStateMachine::new();
        self.run_pipeline(document, &mut machine).await
    }

    async fn run_pipeline(
        &self,
        document: &Document,
        machine: &mut PipelineStateMachine,
    ) -> AnalysisResult {
        let entity_id = document.entity_id;

        machine.transition(PipelineState::RetrievingContext);
        let context = self.retriever.get_context(entity_id, self.lookback_days).await;

        machine.transition(PipelineState::AnalyzingChange);
        let analysis = self.analyzer.analyze(&context);

        machine.transition(PipelineState::QueryingKnowledge);
        let knowledge = self.query_knowledge(document, &analysis.delta_events).await;

        machine.transition(PipelineState::ExternalReasoning);
        let reasoning = match &self.reasoning {
            Some(provider) => {
                let request = ReasoningRequest {
                    entity_id,
                    document: document.clone(),
                    trend_summary: analysis.trend_summary.clone(),
                    delta_events: analysis.delta_events.clone(),
                    risk_progressions: analysis.risk_progressions.clone(),
                    projections: analysis.projections.clone(),
                    knowledge,
                    first_analysis: context.first_analysis,
                };
                match provider.reason(&request).await {
                    Ok(text) => Some(text),
                    Err(e) => {
                        tracing::warn!(entity_id, error = %e, "Reasoning collaborator failed, continuing degraded");
                        machine.transition(PipelineState::Degraded);
                        None
                    }
                }
            }
            None => None,
        };

        let signals = self.extract_signals(document).await;

        // Both transitions are no-ops on a degraded run; the machine went
        // terminal at the reasoning step, composition still runs.
        machine.transition(PipelineState::Composing);
        let recommendations = compose_recommendations(&context, &analysis, signals.as_ref());
        let confidence = blended_confidence(&context, reasoning.as_deref(), signals.as_ref());

        machine.transition(PipelineState::Done);

        let result = AnalysisResult {
            document_id: document.document_id,
            entity_id,
            analyzed_at: Utc::now(),
            state: machine.state(),
            current_metrics: document.metrics.clone(),
            temporal: TemporalSummary::from_context(&context),
            analysis,
            reasoning,
            signals,
            recommendations,
            confidence,
        };

        tracing::info!(
            entity_id,
            document_id = %result.document_id,
            state = ?result.state,
            confidence = result.confidence,
            recommendations = result.recommendations.len(),
            "Analysis complete"
        );

        self.mirror_to_audit(&result);
        result
    }

    async fn query_knowledge(
        &self,
        document: &Document,
        deltas: &[crate::analyzer::DeltaEvent],
    ) -> Vec<KnowledgeItem> {
        if let Err(e) = self.knowledge.refresh().await {
            tracing::warn!(error = %e, "Knowledge index refresh failed");
        }

        let mut terms: Vec<String> = vec![document.document_type.replace('_', " ")];
        terms.extend(document.metrics.keys().map(|k| k.replace('_', " ")));
        terms.extend(deltas.iter().map(|d| d.metric.replace('_', " ")));
        self.knowledge.query(&terms.join(" "), KNOWLEDGE_LIMIT).await
    }

    async fn extract_signals(&self, document: &Document) -> Option<MlSignals> {
        let provider = self.signals.as_ref()?;
        match provider.extract(&document.raw_text, &document.metrics).await {
            Ok(signals) => Some(signals),
            Err(e) => {
                tracing::warn!(entity_id = document.entity_id, error = %e, "Signal collaborator failed, continuing without signals");
                None
            }
        }
    }

    fn mirror_to_audit(&self, result: &AnalysisResult) {
        let Some(audit) = self.audit.clone() else {
            return;
        };
        let result = result.clone();
        // Fire and forget. The stream files stay authoritative; a failed
        // mirror write is logged and dropped.
        tokio::spawn(async move {
            if let Err(e) = audit.log_analysis(&result).await {
                tracing::warn!(error = %e, "Audit mirror write failed");
            }
        });
    }
}
