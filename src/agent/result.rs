//! Analysis result composition.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::analyzer::{Analysis, ProjectionConfidence, RiskLevel};
use crate::store::MetricValue;
use crate::temporal::{TemporalContext, TrendDirection};

use super::signals::MlSignals;
use super::state::PipelineState;

/// Condensed view of the temporal context carried on the result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalSummary {
    pub lookback_days: u32,
    pub documents_in_window: usize,
    pub metrics_tracked: usize,
    pub first_analysis: bool,
}

impl TemporalSummary {
    #[must_use]
    pub fn from_context(context: &TemporalContext) -> Self {
        Self {
            lookback_days: context.lookback_days,
            documents_in_window: context.documents.len(),
            metrics_tracked: context.trends.len(),
            first_analysis: context.first_analysis,
        }
    }
}

/// The composed output of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub document_id: Uuid,
    pub entity_id: u64,
    pub analyzed_at: DateTime<Utc>,
    pub state: PipelineState,
    /// Metrics of the analyzed document.
    pub current_metrics: BTreeMap<String, MetricValue>,
    pub temporal: TemporalSummary,
    #[serde(flatten)]
    pub analysis: Analysis,
    /// Free-text output of the reasoning collaborator, absent when the run
    /// was degraded or reasoning is disabled.
    pub reasoning: Option<String>,
    /// Structured signals, absent when the collaborator is unavailable.
    pub signals: Option<MlSignals>,
    pub recommendations: Vec<String>,
    pub confidence: f64,
}

impl AnalysisResult {
    /// Whether the run completed without its reasoning collaborator.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.state == PipelineState::Degraded
    }
}

/// Compose recommendations from the local findings and optional signals.
///
/// Temporal insights come first, anomaly-driven items after, duplicates
/// removed while preserving order.
#[must_use]
pub fn compose_recommendations(
    context: &TemporalContext,
    analysis: &Analysis,
    signals: Option<&MlSignals>,
) -> Vec<String> {
    let mut recommendations = Vec::new();

    if context.first_analysis {
        recommendations
            .push("Baseline established; trends become available on the next document".to_string());
    }

    for event in &analysis.delta_events {
        let verb = match event.direction {
            TrendDirection::Increasing => "rose",
            TrendDirection::Decreasing => "fell",
            TrendDirection::Stable => "changed",
        };
        recommendations.push(format!(
            "Review {}: {verb} {:.1}% since the previous observation",
            event.metric,
            event.change_percent.abs()
        ));
    }

    for progression in &analysis.risk_progressions {
        if let Some((first, last)) = progression.endpoints() {
            if last > first && last.is_classified() && first.is_classified() {
                recommendations.push(format!(
                    "Risk band for {} moved from {first:?} to {last:?}; consider follow-up",
                    progression.metric
                ));
            }
            if last >= RiskLevel::High && last.is_classified() {
                recommendations.push(format!(
                    "{} is in the {last:?} band; clinical attention advised",
                    progression.metric
                ));
            }
        }
    }

    for projection in &analysis.projections {
        if projection.confidence == ProjectionConfidence::Moderate {
            if let Some(progression) = analysis
                .risk_progressions
                .iter()
                .find(|p| p.metric == projection.metric)
            {
                if progression
                    .endpoints()
                    .is_some_and(|(_, last)| last.is_classified() && last >= RiskLevel::Concerning)
                {
                    recommendations.push(format!(
                        "{} projected at {:.1} in {} days if the trend holds",
                        projection.metric, projection.predicted_value, projection.horizon_days
                    ));
                }
            }
        }
    }

    if let Some(signals) = signals {
        for anomaly in &signals.anomalies {
            recommendations.push(format!(
                "Collaborator flagged {} as anomalous (confidence {:.2})",
                anomaly.label, anomaly.confidence
            ));
        }
    }

    if recommendations.is_empty() {
        recommendations.push("No significant changes detected; continue routine monitoring".to_string());
    }

    dedup_preserving_order(recommendations)
}

/// Blend a confidence score from which pipeline stages contributed.
///
/// Base 0.5 for the local analysis, plus 0.2 when temporal comparison was
/// possible, 0.15 when reasoning succeeded, 0.15 when signals arrived.
#[must_use]
pub fn blended_confidence(
    context: &TemporalContext,
    reasoning: Option<&str>,
    signals: Option<&MlSignals>,
) -> f64 {
    let mut confidence: f64 = 0.5;
    if !context.first_analysis {
        confidence += 0.2;
    }
    if reasoning.is_some() {
        confidence += 0.15;
    }
    if signals.is_some() {
        confidence += 0.15;
    }
    confidence.min(1.0)
}

fn dedup_preserving_order(items: Vec<String>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    items.into_iter().filter(|i| seen.insert(i.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::signals::Signal;
    use crate::analyzer::DeltaEvent;

    fn empty_context(first_analysis: bool) -> TemporalContext {
        TemporalContext {
            entity_id: 1,
            lookback_days: 365,
            queried_at: Utc::now(),
            documents: Vec::new(),
            trends: Vec::new(),
            first_analysis,
        }
    }

    fn empty_analysis() -> Analysis {
        Analysis {
            delta_events: Vec::new(),
            risk_progressions: Vec::new(),
            projections: Vec::new(),
            trend_summary: String::new(),
        }
    }

    #[test]
    fn test_first_analysis_recommendation() {
        let recs = compose_recommendations(&empty_context(true), &empty_analysis(), None);
        assert!(recs[0].contains("Baseline established"));
    }

    #[test]
    fn test_quiet_window_recommendation() {
        let recs = compose_recommendations(&empty_context(false), &empty_analysis(), None);
        assert_eq!(recs.len(), 1);
        assert!(recs[0].contains("routine monitoring"));
    }

    #[test]
    fn test_delta_events_come_before_anomalies() {
        let mut analysis = empty_analysis();
        analysis.delta_events.push(DeltaEvent {
            metric: "glucose".to_string(),
            magnitude: 15.0,
            change_percent: 9.1,
            direction: TrendDirection::Increasing,
            threshold_crossed: true,
        });
        let signals = MlSignals {
            anomalies: vec![Signal {
                label: "glucose".to_string(),
                confidence: 0.9,
            }],
            ..MlSignals::default()
        };

        let recs = compose_recommendations(&empty_context(false), &analysis, Some(&signals));
        assert!(recs[0].contains("Review glucose"));
        assert!(recs[1].contains("flagged glucose as anomalous"));
    }

    #[test]
    fn test_recommendations_deduped() {
        let mut analysis = empty_analysis();
        let event = DeltaEvent {
            metric: "glucose".to_string(),
            magnitude: 15.0,
            change_percent: 9.1,
            direction: TrendDirection::Increasing,
            threshold_crossed: true,
        };
        analysis.delta_events.push(event.clone());
        analysis.delta_events.push(event);

        let recs = compose_recommendations(&empty_context(false), &analysis, None);
        assert_eq!(recs.len(), 1);
    }

    #[test]
    fn test_projection_recommendation_needs_confidence_and_risk() {
        use crate::analyzer::{Projection, RiskProgression};

        let mut analysis = empty_analysis();
        analysis.risk_progressions.push(RiskProgression {
            metric: "glucose".to_string(),
            levels: vec![(Utc::now(), RiskLevel::Concerning)],
            transitions: Vec::new(),
        });
        analysis.projections.push(Projection {
            metric: "glucose".to_string(),
            horizon_days: 30,
            predicted_value: 195.0,
            confidence: ProjectionConfidence::Moderate,
        });

        let recs = compose_recommendations(&empty_context(false), &analysis, None);
        assert!(recs.iter().any(|r| r.contains("projected at 195.0 in 30 days")));

        // Low confidence suppresses the projection line.
        analysis.projections[0].confidence = ProjectionConfidence::Low;
        let recs = compose_recommendations(&empty_context(false), &analysis, None);
        assert!(!recs.iter().any(|r| r.contains("projected")));
    }

    #[test]
    fn test_confidence_blending() {
        let ctx = empty_context(false);
        let first = empty_context(true);
        let signals = MlSignals::default();

        assert!((blended_confidence(&first, None, None) - 0.5).abs() < 1e-9);
        assert!((blended_confidence(&ctx, None, None) - 0.7).abs() < 1e-9);
        assert!((blended_confidence(&ctx, Some("text"), None) - 0.85).abs() < 1e-9);
        assert!((blended_confidence(&ctx, Some("text"), Some(&signals)) - 1.0).abs() < 1e-9);
    }
}
