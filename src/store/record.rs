//! Record types persisted in the append-only streams.
//!
//! Documents and knowledge items are serialized one JSON object per line.
//! Both are immutable once written; corrections arrive as new records.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::error::StoreError;

/// A numeric metric observation with an optional unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricValue {
    /// Normalized numeric value.
    pub value: f64,
    /// Unit as supplied at ingestion ("mg/dL", "mmHg", "%"), if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// One immutable ingested record for an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Unique document identifier.
    pub document_id: Uuid,
    /// The entity (patient) this document belongs to.
    pub entity_id: u64,
    /// Free-form document tag ("lab_report", "prescription", ...).
    pub document_type: String,
    /// Ingestion timestamp. Assigned by the store when not supplied.
    pub timestamp: DateTime<Utc>,
    /// Arrival order at the store. Breaks timestamp ties so that every
    /// entity has a total document order.
    pub seq: u64,
    /// Extracted text content.
    pub raw_text: String,
    /// Normalized metric observations keyed by metric name.
    pub metrics: BTreeMap<String, MetricValue>,
    /// SHA-256 over entity, type, text and metrics. Used for duplicate
    /// detection only; duplicates are still accepted as new documents.
    pub content_hash: String,
}

/// An entity-independent reference record (guideline, protocol, research).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeItem {
    /// Unique knowledge identifier.
    pub knowledge_id: Uuid,
    pub title: String,
    pub content: String,
    /// Where this material came from.
    pub source: String,
    pub ingested_at: DateTime<Utc>,
}

fn numeric_with_unit() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(-?\d+(?:\.\d+)?)\s*([^\s].*)?$").expect("valid metric regex")
    })
}

/// Normalize a raw metric value into a [`MetricValue`].
///
/// Accepts JSON numbers and strings carrying a trailing unit
/// ("180 mg/dL", "5.9%"). Anything else is rejected.
///
/// # Errors
///
/// Returns [`StoreError::Validation`] when the value is not numeric or is
/// not finite.
pub fn normalize_metric(name: &str, raw: &serde_json::Value) -> Result<MetricValue, StoreError> {
    let parsed = match raw {
        serde_json::Value::Number(n) => n.as_f64().map(|value| MetricValue { value, unit: None }),
        serde_json::Value::String(s) => numeric_with_unit().captures(s).and_then(|caps| {
            let value: f64 = caps.get(1)?.as_str().parse().ok()?;
            let unit = caps
                .get(2)
                .map(|m| m.as_str().trim().to_string())
                .filter(|u| !u.is_empty());
            Some(MetricValue { value, unit })
        }),
        _ => None,
    };

    match parsed {
        Some(m) if m.value.is_finite() => Ok(m),
        Some(_) => Err(StoreError::Validation {
            metric: name.to_string(),
            reason: "value is not finite".to_string(),
        }),
        None => Err(StoreError::Validation {
            metric: name.to_string(),
            reason: format!("expected a number, got {raw}"),
        }),
    }
}

/// Normalize and validate a full metric map at the ingestion boundary.
///
/// # Errors
///
/// Returns the first [`StoreError::Validation`] encountered; a document
/// with any malformed metric is rejected whole.
pub fn normalize_metrics(
    raw: &BTreeMap<String, serde_json::Value>,
) -> Result<BTreeMap<String, MetricValue>, StoreError> {
    raw.iter()
        .map(|(name, value)| Ok((name.clone(), normalize_metric(name, value)?)))
        .collect()
}

/// Compute the content hash for a document.
#[must_use]
pub fn content_hash(
    entity_id: u64,
    document_type: &str,
    raw_text: &str,
    metrics: &BTreeMap<String, MetricValue>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(entity_id.to_le_bytes());
    hasher.update(document_type.as_bytes());
    hasher.update(raw_text.as_bytes());
    for (name, metric) in metrics {
        hasher.update(name.as_bytes());
        hasher.update(metric.value.to_le_bytes());
        if let Some(unit) = &metric.unit {
            hasher.update(unit.as_bytes());
        }
    }
    let digest = hasher.finalize();
    let mut out = String::with_capacity(64);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(out, "{byte:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_metric_from_number() {
        let value = serde_json::json!(165.0);
        let metric = normalize_metric("glucose", &value).unwrap();
        assert!((metric.value - 165.0).abs() < f64::EPSILON);
        assert!(metric.unit.is_none());
    }

    #[test]
    fn test_normalize_metric_from_string_with_unit() {
        let value = serde_json::json!("180 mg/dL");
        let metric = normalize_metric("glucose", &value).unwrap();
        assert!((metric.value - 180.0).abs() < f64::EPSILON);
        assert_eq!(metric.unit.as_deref(), Some("mg/dL"));
    }

    #[test]
    fn test_normalize_metric_percent_string() {
        let value = serde_json::json!("5.9%");
        let metric = normalize_metric("hba1c", &value).unwrap();
        assert!((metric.value - 5.9).abs() < f64::EPSILON);
        assert_eq!(metric.unit.as_deref(), Some("%"));
    }

    #[test]
    fn test_normalize_metric_negative() {
        let value = serde_json::json!("-2.5");
        let metric = normalize_metric("delta", &value).unwrap();
        assert!((metric.value - -2.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_normalize_metric_rejects_non_numeric() {
        let value = serde_json::json!("elevated");
        let err = normalize_metric("glucose", &value).unwrap_err();
        assert!(matches!(err, StoreError::Validation { .. }));
    }

    #[test]
    fn test_normalize_metric_rejects_bool() {
        let value = serde_json::json!(true);
        assert!(normalize_metric("flag", &value).is_err());
    }

    #[test]
    fn test_normalize_metrics_rejects_whole_map() {
        let mut raw = BTreeMap::new();
        raw.insert("glucose".to_string(), serde_json::json!(100));
        raw.insert("note".to_string(), serde_json::json!("see attached"));
        assert!(normalize_metrics(&raw).is_err());
    }

    #[test]
    fn test_content_hash_deterministic() {
        let mut metrics = BTreeMap::new();
        metrics.insert(
            "glucose".to_string(),
            MetricValue {
                value: 165.0,
                unit: Some("mg/dL".to_string()),
            },
        );
        let a = content_hash(1, "lab_report", "glucose 165", &metrics);
        let b = content_hash(1, "lab_report", "glucose 165", &metrics);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_content_hash_differs_by_entity() {
        let metrics = BTreeMap::new();
        let a = content_hash(1, "lab_report", "text", &metrics);
        let b = content_hash(2, "lab_report", "text", &metrics);
        assert_ne!(a, b);
    }

    #[test]
    fn test_document_roundtrip() {
        let doc = Document {
            document_id: Uuid::new_v4(),
            entity_id: 7,
            document_type: "lab_report".to_string(),
            timestamp: Utc::now(),
            seq: 3,
            raw_text: "glucose 165 mg/dL".to_string(),
            metrics: BTreeMap::new(),
            content_hash: "abc".to_string(),
        };
        let line = serde_json::to_string(&doc).unwrap();
        let parsed: Document = serde_json::from_str(&line).unwrap();
        assert_eq!(doc, parsed);
    }
}
