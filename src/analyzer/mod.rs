//! Change and trend analysis over a temporal context.
//!
//! A pure function of the reconstructed history: delta events between the
//! two most recent observations, risk band progressions across every
//! observation, and a naive short-horizon projection. The projection is an
//! explicitly labeled linear heuristic, not a statistical forecast.

pub mod risk;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::temporal::{MetricTrend, TemporalContext, TrendDirection};

pub use risk::{ClinicalBands, RiskClassifier, RiskLevel};

/// Default relative-change threshold (percent) for flagging a delta event.
pub const DEFAULT_DELTA_THRESHOLD_PERCENT: f64 = 5.0;

/// Default projection horizon in days.
pub const DEFAULT_HORIZON_DAYS: u32 = 30;

/// A flagged significant change between the two most recent values of one
/// metric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeltaEvent {
    pub metric: String,
    /// Absolute change, current minus previous.
    pub magnitude: f64,
    /// Relative change against the previous value, in percent.
    pub change_percent: f64,
    pub direction: TrendDirection,
    /// Always true for emitted events; kept explicit so consumers see
    /// which rule fired.
    pub threshold_crossed: bool,
}

/// One risk band change between consecutive observations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskTransition {
    pub at: DateTime<Utc>,
    pub from: RiskLevel,
    pub to: RiskLevel,
}

/// Risk band classification across every observation of one metric.
///
/// Records every transition, so a rise-then-fall shows up as two
/// transitions rather than collapsing into "unchanged".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskProgression {
    pub metric: String,
    pub levels: Vec<(DateTime<Utc>, RiskLevel)>,
    pub transitions: Vec<RiskTransition>,
}

impl RiskProgression {
    /// First and last classified levels, when at least one point was
    /// classifiable.
    #[must_use]
    pub fn endpoints(&self) -> Option<(RiskLevel, RiskLevel)> {
        let first = self.levels.first()?.1;
        let last = self.levels.last()?.1;
        Some((first, last))
    }
}

/// Confidence label on a projection. Two points are the minimum the
/// heuristic accepts; three or more raise it to moderate, never higher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectionConfidence {
    Low,
    Moderate,
}

/// Linear extrapolation of one metric over a fixed horizon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Projection {
    pub metric: String,
    pub horizon_days: u32,
    /// `last_value + rate_per_day * horizon_days`.
    pub predicted_value: f64,
    pub confidence: ProjectionConfidence,
}

/// Output of the change analyzer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub delta_events: Vec<DeltaEvent>,
    pub risk_progressions: Vec<RiskProgression>,
    pub projections: Vec<Projection>,
    /// Human-readable one-line summary of the window.
    pub trend_summary: String,
}

/// Per-metric delta thresholds with a global default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeltaThresholds {
    /// Fallback threshold, percent.
    pub default_percent: f64,
    /// Metric-specific overrides, percent.
    pub per_metric: BTreeMap<String, f64>,
}

impl Default for DeltaThresholds {
    fn default() -> Self {
        // Percent equivalents of the clinical significance deltas for the
        // metrics the default classifier knows about.
        let per_metric = [
            ("glucose_fasting", 10.0),
            ("hba1c", 8.0),
            ("blood_pressure_systolic", 8.0),
            ("blood_pressure_diastolic", 6.0),
            ("cholesterol_total", 10.0),
            ("ldl", 10.0),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        Self {
            default_percent: DEFAULT_DELTA_THRESHOLD_PERCENT,
            per_metric,
        }
    }
}

impl DeltaThresholds {
    /// Threshold for one metric (normalized name), percent.
    #[must_use]
    pub fn for_metric(&self, metric: &str) -> f64 {
        let key = metric.to_lowercase().replace(' ', "_");
        self.per_metric.get(&key).copied().unwrap_or(self.default_percent)
    }
}

/// Computes deltas, risk progressions and projections from a temporal
/// context.
pub struct ChangeAnalyzer {
    thresholds: DeltaThresholds,
    classifier: Box<dyn RiskClassifier>,
    horizon_days: u32,
}

impl Default for ChangeAnalyzer {
    fn default() -> Self {
        Self::new(
            DeltaThresholds::default(),
            Box::new(ClinicalBands),
            DEFAULT_HORIZON_DAYS,
        )
    }
}

impl ChangeAnalyzer {
    #[must_use]
    pub fn new(
        thresholds: DeltaThresholds,
        classifier: Box<dyn RiskClassifier>,
        horizon_days: u32,
    ) -> Self {
        Self {
            thresholds,
            classifier,
            horizon_days,
        }
    }

    /// Analyze a temporal context.
    ///
    /// Metrics with insufficient history contribute no delta event and no
    /// projection, and never block the other metrics.
    #[must_use]
    pub fn analyze(&self, context: &TemporalContext) -> Analysis {
        let mut delta_events = Vec::new();
        let mut risk_progressions = Vec::new();
        let mut projections = Vec::new();

        for trend in &context.trends {
            if let Some(event) = self.delta_event(trend) {
                delta_events.push(event);
            }
            if let Some(progression) = self.risk_progression(trend) {
                risk_progressions.push(progression);
            }
            projections.push(self.project(trend));
        }

        let trend_summary = summarize(context, &delta_events, &risk_progressions);
        tracing::debug!(
            entity_id = context.entity_id,
            deltas = delta_events.len(),
            progressions = risk_progressions.len(),
            "Change analysis complete"
        );

        Analysis {
            delta_events,
            risk_progressions,
            projections,
            trend_summary,
        }
    }

    fn delta_event(&self, trend: &MetricTrend) -> Option<DeltaEvent> {
        let (change, change_percent) = trend.latest_delta()?;
        let threshold = self.thresholds.for_metric(&trend.metric);
        if change_percent.abs() < threshold {
            return None;
        }
        Some(DeltaEvent {
            metric: trend.metric.clone(),
            magnitude: change,
            change_percent,
            direction: if change > 0.0 {
                TrendDirection::Increasing
            } else if change < 0.0 {
                TrendDirection::Decreasing
            } else {
                TrendDirection::Stable
            },
            threshold_crossed: true,
        })
    }

    fn risk_progression(&self, trend: &MetricTrend) -> Option<RiskProgression> {
        let levels: Vec<(DateTime<Utc>, RiskLevel)> = trend
            .points
            .iter()
            .map(|&(ts, value)| (ts, self.classifier.classify(&trend.metric, value)))
            .collect();
        if !levels.iter().any(|(_, l)| l.is_classified()) {
            return None;
        }

        let transitions = levels
            .windows(2)
            .filter(|pair| pair[0].1 != pair[1].1)
            .map(|pair| RiskTransition {
                at: pair[1].0,
                from: pair[0].1,
                to: pair[1].1,
            })
            .collect();

        Some(RiskProgression {
            metric: trend.metric.clone(),
            levels,
            transitions,
        })
    }

    fn project(&self, trend: &MetricTrend) -> Projection {
        let confidence = if trend.points.len() < 3 {
            ProjectionConfidence::Low
        } else {
            ProjectionConfidence::Moderate
        };
        Projection {
            metric: trend.metric.clone(),
            horizon_days: self.horizon_days,
            predicted_value: trend.last_value
                + trend.rate_per_day * f64::from(self.horizon_days),
            confidence,
        }
    }
}

/// One-line window summary: trend directions plus risk movement counts.
fn summarize(
    context: &TemporalContext,
    deltas: &[DeltaEvent],
    progressions: &[RiskProgression],
) -> String {
    if context.first_analysis {
        return "First analysis for this entity; no temporal comparison available".to_string();
    }

    let mut increasing = 0;
    let mut decreasing = 0;
    let mut stable = 0;
    for trend in &context.trends {
        match trend.direction {
            TrendDirection::Increasing => increasing += 1,
            TrendDirection::Decreasing => decreasing += 1,
            TrendDirection::Stable => stable += 1,
        }
    }

    let mut worsened = 0;
    let mut improved = 0;
    for progression in progressions {
        if let Some((first, last)) = progression.endpoints() {
            if last > first && last.is_classified() && first.is_classified() {
                worsened += 1;
            } else if last < first && last.is_classified() && first.is_classified() {
                improved += 1;
            }
        }
    }

    format!(
        "{} metrics tracked ({increasing} increasing, {decreasing} decreasing, {stable} stable); \
         {} significant change(s); risk worsened for {worsened}, improved for {improved}",
        context.trends.len(),
        deltas.len(),
    )
}
