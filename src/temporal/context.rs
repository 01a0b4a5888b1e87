//! Temporal context retriever and metric trend derivation.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::store::{Document, DocumentStore};

/// Relative change (percent) below which a trend counts as stable.
pub const STABILITY_BAND_PERCENT: f64 = 2.0;

/// Direction of a metric trend, derived deterministically from
/// `change_percent` against [`STABILITY_BAND_PERCENT`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Increasing,
    Decreasing,
    Stable,
}

impl TrendDirection {
    /// Classify a percent change.
    #[must_use]
    pub fn from_change_percent(change_percent: f64) -> Self {
        if change_percent.abs() < STABILITY_BAND_PERCENT {
            Self::Stable
        } else if change_percent > 0.0 {
            Self::Increasing
        } else {
            Self::Decreasing
        }
    }
}

/// Trend for one metric over the lookback window.
///
/// The canonical trend signal is the two-point delta between the earliest
/// and latest qualifying values, not a regression. Requires at least two
/// data points; metrics with fewer are reported as insufficient history by
/// omission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricTrend {
    pub metric: String,
    /// Ordered (timestamp, value) observations inside the window.
    pub points: Vec<(DateTime<Utc>, f64)>,
    pub first_value: f64,
    pub last_value: f64,
    /// Absolute change, last minus first.
    pub change: f64,
    /// Relative change in percent; zero when the first value is zero.
    pub change_percent: f64,
    pub direction: TrendDirection,
    /// Linear rate over the observed span; zero when the span is empty.
    pub rate_per_day: f64,
}

impl MetricTrend {
    /// Build a trend from ordered observations. Returns `None` with fewer
    /// than two points.
    #[must_use]
    pub fn from_points(metric: &str, points: Vec<(DateTime<Utc>, f64)>) -> Option<Self> {
        let (first_ts, first_value) = *points.first()?;
        let (last_ts, last_value) = *points.last()?;
        if points.len() < 2 {
            return None;
        }

        let change = last_value - first_value;
        let change_percent = if first_value == 0.0 {
            0.0
        } else {
            change / first_value * 100.0
        };
        let span_days = (last_ts - first_ts).num_seconds() as f64 / 86_400.0;
        let rate_per_day = if span_days > 0.0 { change / span_days } else { 0.0 };

        Some(Self {
            metric: metric.to_string(),
            points,
            first_value,
            last_value,
            change,
            change_percent,
            direction: TrendDirection::from_change_percent(change_percent),
            rate_per_day,
        })
    }

    /// Change between the two most recent observations, as
    /// (absolute, percent-of-previous). `None` when the previous value is
    /// zero.
    #[must_use]
    pub fn latest_delta(&self) -> Option<(f64, f64)> {
        let n = self.points.len();
        let (_, previous) = self.points.get(n.checked_sub(2)?)?;
        let (_, current) = self.points.get(n - 1)?;
        if *previous == 0.0 {
            return None;
        }
        let change = current - previous;
        Some((change, change / previous * 100.0))
    }
}

/// The reconstructed, windowed view of one entity's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemporalContext {
    pub entity_id: u64,
    pub lookback_days: u32,
    pub queried_at: DateTime<Utc>,
    /// Documents inside the window, ascending by (timestamp, seq).
    pub documents: Vec<Document>,
    /// Trends for every metric observed in at least two window documents.
    pub trends: Vec<MetricTrend>,
    /// True when the entity has fewer than two documents in total. Lets
    /// consumers distinguish "no history" from "stable history".
    pub first_analysis: bool,
}

/// Rebuilds temporal context from the document store.
#[derive(Debug, Clone)]
pub struct TemporalContextRetriever {
    store: Arc<DocumentStore>,
}

impl TemporalContextRetriever {
    #[must_use]
    pub fn new(store: Arc<DocumentStore>) -> Self {
        Self { store }
    }

    /// Reconstruct the entity's context within the lookback window.
    ///
    /// Reads through the store's reader index, so the view may lag the
    /// newest write by one visibility interval. Unknown entities yield an
    /// empty first-analysis context, never an error.
    pub async fn get_context(&self, entity_id: u64, lookback_days: u32) -> TemporalContext {
        let queried_at = Utc::now();
        let cutoff = queried_at - Duration::days(i64::from(lookback_days));

        let full_history = self.store.history(entity_id, None).await;
        let first_analysis = full_history.len() < 2;
        let documents: Vec<Document> = full_history
            .into_iter()
            .filter(|d| d.timestamp >= cutoff)
            .collect();

        let trends = derive_trends(&documents);
        tracing::debug!(
            entity_id,
            lookback_days,
            documents = documents.len(),
            trends = trends.len(),
            first_analysis,
            "Temporal context reconstructed"
        );

        TemporalContext {
            entity_id,
            lookback_days,
            queried_at,
            documents,
            trends,
            first_analysis,
        }
    }
}

/// Group per-metric observations from ordered documents and derive trends.
fn derive_trends(documents: &[Document]) -> Vec<MetricTrend> {
    let mut series: BTreeMap<&str, Vec<(DateTime<Utc>, f64)>> = BTreeMap::new();
    for doc in documents {
        for (name, metric) in &doc.metrics {
            series.entry(name).or_default().push((doc.timestamp, metric.value));
        }
    }
    series
        .into_iter()
        .filter_map(|(metric, points)| MetricTrend::from_points(metric, points))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    async fn store_with_docs(
        docs: &[(u64, &[(&str, f64)], i64)],
    ) -> (TempDir, Arc<DocumentStore>) {
        let dir = TempDir::new().unwrap();
        let store = DocumentStore::open(dir.path()).await.unwrap();
        let base = Utc::now() - Duration::days(60);
        for (entity, metrics, day) in docs {
            let raw: BTreeMap<String, serde_json::Value> = metrics
                .iter()
                .map(|(k, v)| ((*k).to_string(), serde_json::json!(v)))
                .collect();
            store
                .ingest(*entity, "lab_report", "text", &raw, Some(base + Duration::days(*day)))
                .await
                .unwrap();
        }
        store.refresh().await.unwrap();
        (dir, store)
    }

    #[test]
    fn test_direction_stability_band() {
        assert_eq!(TrendDirection::from_change_percent(0.0), TrendDirection::Stable);
        assert_eq!(TrendDirection::from_change_percent(1.99), TrendDirection::Stable);
        assert_eq!(TrendDirection::from_change_percent(-1.99), TrendDirection::Stable);
        assert_eq!(TrendDirection::from_change_percent(2.0), TrendDirection::Increasing);
        assert_eq!(TrendDirection::from_change_percent(-2.0), TrendDirection::Decreasing);
    }

    #[test]
    fn test_trend_requires_two_points() {
        let now = Utc::now();
        assert!(MetricTrend::from_points("glucose", vec![]).is_none());
        assert!(MetricTrend::from_points("glucose", vec![(now, 100.0)]).is_none());
    }

    #[test]
    fn test_trend_two_point_delta() {
        let now = Utc::now();
        let trend = MetricTrend::from_points(
            "glucose",
            vec![(now - Duration::days(30), 165.0), (now, 180.0)],
        )
        .unwrap();
        assert!((trend.change - 15.0).abs() < 1e-9);
        assert!((trend.change_percent - 9.090_909_090_909_092).abs() < 1e-6);
        assert_eq!(trend.direction, TrendDirection::Increasing);
        assert!((trend.rate_per_day - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_trend_zero_first_value() {
        let now = Utc::now();
        let trend = MetricTrend::from_points(
            "marker",
            vec![(now - Duration::days(1), 0.0), (now, 5.0)],
        )
        .unwrap();
        assert!((trend.change_percent).abs() < f64::EPSILON);
        assert_eq!(trend.direction, TrendDirection::Stable);
    }

    #[test]
    fn test_latest_delta_uses_two_most_recent() {
        let now = Utc::now();
        let trend = MetricTrend::from_points(
            "glucose",
            vec![
                (now - Duration::days(20), 100.0),
                (now - Duration::days(10), 150.0),
                (now, 165.0),
            ],
        )
        .unwrap();
        let (change, percent) = trend.latest_delta().unwrap();
        assert!((change - 15.0).abs() < 1e-9);
        assert!((percent - 10.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_single_document_is_first_analysis() {
        let (_dir, store) = store_with_docs(&[(1, &[("glucose", 165.0)], 0)]).await;
        let retriever = TemporalContextRetriever::new(store);

        let ctx = retriever.get_context(1, 365).await;
        assert!(ctx.first_analysis);
        assert!(ctx.trends.is_empty());
        assert_eq!(ctx.documents.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_entity_is_empty_first_analysis() {
        let (_dir, store) = store_with_docs(&[]).await;
        let retriever = TemporalContextRetriever::new(store);

        let ctx = retriever.get_context(99, 365).await;
        assert!(ctx.first_analysis);
        assert!(ctx.documents.is_empty());
        assert!(ctx.trends.is_empty());
    }

    #[tokio::test]
    async fn test_two_documents_build_trend() {
        let (_dir, store) =
            store_with_docs(&[(1, &[("glucose", 165.0)], 0), (1, &[("glucose", 180.0)], 30)])
                .await;
        let retriever = TemporalContextRetriever::new(store);

        let ctx = retriever.get_context(1, 365).await;
        assert!(!ctx.first_analysis);
        assert_eq!(ctx.trends.len(), 1);
        let trend = &ctx.trends[0];
        assert_eq!(trend.metric, "glucose");
        assert!((trend.first_value - 165.0).abs() < f64::EPSILON);
        assert!((trend.last_value - 180.0).abs() < f64::EPSILON);
        assert_eq!(trend.direction, TrendDirection::Increasing);
    }

    #[tokio::test]
    async fn test_metric_in_one_document_has_no_trend() {
        let (_dir, store) = store_with_docs(&[
            (1, &[("glucose", 165.0), ("ldl", 120.0)], 0),
            (1, &[("glucose", 180.0)], 30),
        ])
        .await;
        let retriever = TemporalContextRetriever::new(store);

        let ctx = retriever.get_context(1, 365).await;
        assert_eq!(ctx.trends.len(), 1);
        assert_eq!(ctx.trends[0].metric, "glucose");
    }

    #[tokio::test]
    async fn test_lookback_window_filters_documents() {
        let (_dir, store) =
            store_with_docs(&[(1, &[("glucose", 100.0)], 0), (1, &[("glucose", 120.0)], 55)])
                .await;
        let retriever = TemporalContextRetriever::new(store);

        // Base is 60 days back, so a 10-day window only sees the second doc.
        let ctx = retriever.get_context(1, 10).await;
        assert_eq!(ctx.documents.len(), 1);
        assert!(ctx.trends.is_empty());
        // Entity has history overall, just not inside the window.
        assert!(!ctx.first_analysis);
    }
}
