//! Risk band classification.
//!
//! Classification is pluggable so an external ML collaborator can supply
//! it; [`ClinicalBands`] is the built-in default, carrying standard
//! reference ranges for the common lab metrics.

use serde::{Deserialize, Serialize};

/// Ordered risk bands. Ordering is severity: `Normal < Borderline <
/// Concerning < High < Critical`. `Unknown` is reserved for metrics the
/// classifier has no bands for and never participates in progressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Normal,
    Borderline,
    Concerning,
    High,
    Critical,
    Unknown,
}

impl RiskLevel {
    /// Whether this level carries severity information.
    #[must_use]
    pub fn is_classified(self) -> bool {
        self != Self::Unknown
    }
}

/// Classifies one metric observation into a risk band.
pub trait RiskClassifier: Send + Sync {
    fn classify(&self, metric: &str, value: f64) -> RiskLevel;
}

/// Built-in classifier with clinical reference ranges.
///
/// Covers fasting/random glucose, HbA1c, blood pressure, total cholesterol
/// and LDL. Values outside every defined band, and metrics without bands,
/// classify as `Unknown`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClinicalBands;

impl RiskClassifier for ClinicalBands {
    #[allow(clippy::match_same_arms)]
    fn classify(&self, metric: &str, value: f64) -> RiskLevel {
        let key = metric.to_lowercase().replace(' ', "_");
        match key.as_str() {
            "glucose_fasting" => match value {
                v if (70.0..=99.0).contains(&v) => RiskLevel::Normal,
                v if (100.0..=125.0).contains(&v) => RiskLevel::Borderline,
                v if v > 125.0 => RiskLevel::High,
                _ => RiskLevel::Unknown,
            },
            "glucose" | "glucose_random" => match value {
                v if (70.0..=140.0).contains(&v) => RiskLevel::Normal,
                v if v > 140.0 && v < 200.0 => RiskLevel::Concerning,
                v if v >= 200.0 => RiskLevel::High,
                _ => RiskLevel::Unknown,
            },
            "hba1c" => match value {
                v if v > 0.0 && v <= 5.6 => RiskLevel::Normal,
                v if (5.7..=6.4).contains(&v) => RiskLevel::Borderline,
                v if v >= 6.5 => RiskLevel::High,
                _ => RiskLevel::Unknown,
            },
            "blood_pressure_systolic" => match value {
                v if (90.0..=120.0).contains(&v) => RiskLevel::Normal,
                v if v > 120.0 && v <= 129.0 => RiskLevel::Borderline,
                v if (130.0..=139.0).contains(&v) => RiskLevel::Concerning,
                v if (140.0..=179.0).contains(&v) => RiskLevel::High,
                v if v >= 180.0 => RiskLevel::Critical,
                _ => RiskLevel::Unknown,
            },
            "blood_pressure_diastolic" => match value {
                v if (60.0..=80.0).contains(&v) => RiskLevel::Normal,
                v if v > 80.0 && v <= 84.0 => RiskLevel::Borderline,
                v if (85.0..=89.0).contains(&v) => RiskLevel::Concerning,
                v if (90.0..=119.0).contains(&v) => RiskLevel::High,
                v if v >= 120.0 => RiskLevel::Critical,
                _ => RiskLevel::Unknown,
            },
            "cholesterol_total" => match value {
                v if v > 0.0 && v < 200.0 => RiskLevel::Normal,
                v if (200.0..=239.0).contains(&v) => RiskLevel::Borderline,
                v if v >= 240.0 => RiskLevel::High,
                _ => RiskLevel::Unknown,
            },
            "ldl" => match value {
                v if v > 0.0 && v < 100.0 => RiskLevel::Normal,
                v if (100.0..=129.0).contains(&v) => RiskLevel::Borderline,
                v if (130.0..=159.0).contains(&v) => RiskLevel::Concerning,
                v if (160.0..=189.0).contains(&v) => RiskLevel::High,
                v if v >= 190.0 => RiskLevel::Critical,
                _ => RiskLevel::Unknown,
            },
            _ => RiskLevel::Unknown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_level_ordering() {
        assert!(RiskLevel::Normal < RiskLevel::Borderline);
        assert!(RiskLevel::Borderline < RiskLevel::Concerning);
        assert!(RiskLevel::Concerning < RiskLevel::High);
        assert!(RiskLevel::High < RiskLevel::Critical);
    }

    #[test]
    fn test_glucose_random_bands() {
        let c = ClinicalBands;
        assert_eq!(c.classify("glucose", 100.0), RiskLevel::Normal);
        assert_eq!(c.classify("glucose", 165.0), RiskLevel::Concerning);
        assert_eq!(c.classify("glucose", 210.0), RiskLevel::High);
    }

    #[test]
    fn test_glucose_fasting_bands() {
        let c = ClinicalBands;
        assert_eq!(c.classify("glucose_fasting", 85.0), RiskLevel::Normal);
        assert_eq!(c.classify("glucose_fasting", 110.0), RiskLevel::Borderline);
        assert_eq!(c.classify("glucose_fasting", 130.0), RiskLevel::High);
    }

    #[test]
    fn test_systolic_bands() {
        let c = ClinicalBands;
        assert_eq!(c.classify("blood_pressure_systolic", 115.0), RiskLevel::Normal);
        assert_eq!(c.classify("blood_pressure_systolic", 125.0), RiskLevel::Borderline);
        assert_eq!(c.classify("blood_pressure_systolic", 135.0), RiskLevel::Concerning);
        assert_eq!(c.classify("blood_pressure_systolic", 150.0), RiskLevel::High);
        assert_eq!(c.classify("blood_pressure_systolic", 185.0), RiskLevel::Critical);
    }

    #[test]
    fn test_metric_name_normalized() {
        let c = ClinicalBands;
        assert_eq!(c.classify("Blood Pressure Systolic", 115.0), RiskLevel::Normal);
    }

    #[test]
    fn test_unknown_metric() {
        let c = ClinicalBands;
        assert_eq!(c.classify("ferritin", 100.0), RiskLevel::Unknown);
        assert!(!RiskLevel::Unknown.is_classified());
    }

    #[test]
    fn test_out_of_band_value_is_unknown() {
        let c = ClinicalBands;
        assert_eq!(c.classify("glucose_fasting", 40.0), RiskLevel::Unknown);
    }
}
