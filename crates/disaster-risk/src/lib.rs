//! Disaster Risk Triage
//!
//! Classifies current weather into a four-tier disaster risk and looks up
//! historical disaster records for a location.
//!
//! # Scoring Model (additive ordinal)
//!
//! ```text
//! Score = T(temperature) + H(humidity) + W(wind)
//! ```
//!
//! | Factor | +3 | +2 | +1 |
//! |--------|----|----|----|
//! | T (°C)   | < 0 or > 45 | < 5 or > 40 | < 10 or > 35 |
//! | H (%)    | > 90 | > 80 | > 70 |
//! | W (m/s)  | > 20 | > 15 | > 10 |
//!
//! | Score | Tier |
//! |-------|------|
//! | ≥ 6   | CRITICAL |
//! | ≥ 4   | HIGH |
//! | ≥ 2   | MEDIUM |
//! | else  | LOW |
//!
//! # Model Overlays
//!
//! Pre-trained tree ensembles may override the heuristic tier. They are tried
//! in a fixed priority order and any failure falls back to the heuristic,
//! which is always available.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod ensemble;
pub mod heuristic;
pub mod overlay;
pub mod prepare;
pub mod records;
pub mod resolver;
pub mod sequence;
pub mod service;
pub mod vocabulary;

pub use overlay::{Overlay, OverlayChain, OverlayError, OverlayResult, OverlaySlot};
pub use records::{DisasterRecord, RecordStore};
pub use service::{LocationHistory, RiskService};
pub use vocabulary::LocationVocabulary;

/// Confidence reported by the heuristic path (independent of score)
pub const HEURISTIC_CONFIDENCE: f64 = 0.75;

/// Maximum number of vocabulary samples returned with a NotFound error
pub const MAX_HINTS: usize = 5;

/// Default sea-level pressure (hPa) used when an observation has none
pub const DEFAULT_PRESSURE_HPA: f64 = 1013.0;

/// Default rainfall (mm) used when an observation has none
pub const DEFAULT_RAINFALL_MM: f64 = 0.0;

/// Default artifact file names inside the data directory
pub const RECORDS_FILE: &str = "disaster_records.csv";
pub const VOCABULARY_FILE: &str = "location_vocabulary.json";
pub const FOREST_OVERLAY_FILE: &str = "forest_overlay.json";
pub const BOOSTED_OVERLAY_FILE: &str = "boosted_overlay.json";
pub const SEQUENCE_OVERLAY_FILE: &str = "lstm_overlay.json";

/// Failures that cross the core boundary
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RiskError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Location not found: {query}")]
    NotFound { query: String, hints: Vec<String> },
    #[error("Data unavailable: {0}")]
    Unavailable(String),
    #[error("Upstream dependency failed: {0}")]
    Upstream(String),
}

pub type Result<T> = std::result::Result<T, RiskError>;

/// Internal loader failures (never surfaced; the store degrades to empty)
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Missing column: {0}")]
    MissingColumn(&'static str),
}

/// Ordinal risk tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskTier {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskTier {
    pub const ALL: [RiskTier; 4] = [
        RiskTier::Low,
        RiskTier::Medium,
        RiskTier::High,
        RiskTier::Critical,
    ];

    /// Bucket an additive heuristic score
    pub fn from_score(score: i32) -> Self {
        if score >= 6 {
            RiskTier::Critical
        } else if score >= 4 {
            RiskTier::High
        } else if score >= 2 {
            RiskTier::Medium
        } else {
            RiskTier::Low
        }
    }

    /// Map a model class index (0-3) back to a tier
    pub fn from_class(class: usize) -> Option<Self> {
        Self::ALL.get(class).copied()
    }

    pub fn class_index(&self) -> usize {
        match self {
            RiskTier::Low => 0,
            RiskTier::Medium => 1,
            RiskTier::High => 2,
            RiskTier::Critical => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Low => "LOW",
            RiskTier::Medium => "MEDIUM",
            RiskTier::High => "HIGH",
            RiskTier::Critical => "CRITICAL",
        }
    }

    /// Display color token
    pub fn color(&self) -> &'static str {
        match self {
            RiskTier::Low => "#4CAF50",
            RiskTier::Medium => "#FFC107",
            RiskTier::High => "#FF9800",
            RiskTier::Critical => "#F44336",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            RiskTier::Low => "✅",
            RiskTier::Medium => "⚠",
            RiskTier::High => "⚠⚠",
            RiskTier::Critical => "🚨",
        }
    }

    pub fn recommendation(&self) -> &'static str {
        match self {
            RiskTier::Low => "No immediate threat. Stay informed about weather updates.",
            RiskTier::Medium => "Moderate risk. Review disaster preparedness checklist.",
            RiskTier::High => "High risk! Prepare emergency kit and know evacuation routes.",
            RiskTier::Critical => {
                "🚨 CRITICAL ALERT! Follow local authorities and evacuate if instructed."
            }
        }
    }
}

impl std::fmt::Display for RiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current weather at a location
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeatherObservation {
    /// Temperature (Celsius)
    #[serde(alias = "temp")]
    pub temperature: f64,
    /// Relative humidity (percent, nominally 0-100)
    pub humidity: f64,
    /// Wind speed (m/s)
    #[serde(alias = "wind")]
    pub wind_speed: f64,
    /// Sea-level pressure (hPa)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pressure: Option<f64>,
    /// Rainfall over the last hour (mm)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rainfall: Option<f64>,
}

impl WeatherObservation {
    pub fn new(temperature: f64, humidity: f64, wind_speed: f64) -> Self {
        Self {
            temperature,
            humidity,
            wind_speed,
            pressure: None,
            rainfall: None,
        }
    }

    /// Model feature vector: `[temperature, humidity, wind, pressure, rainfall]`
    pub fn features(&self) -> [f64; 5] {
        [
            self.temperature,
            self.humidity,
            self.wind_speed,
            self.pressure.unwrap_or(DEFAULT_PRESSURE_HPA),
            self.rainfall.unwrap_or(DEFAULT_RAINFALL_MM),
        ]
    }
}

/// Which classifier produced an assessment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum ModelSource {
    Heuristic,
    Overlay(String),
}

impl ModelSource {
    pub const HEURISTIC: &'static str = "heuristic";

    pub fn is_heuristic(&self) -> bool {
        matches!(self, ModelSource::Heuristic)
    }
}

impl From<ModelSource> for String {
    fn from(source: ModelSource) -> Self {
        match source {
            ModelSource::Heuristic => ModelSource::HEURISTIC.to_string(),
            ModelSource::Overlay(name) => name,
        }
    }
}

impl From<String> for ModelSource {
    fn from(name: String) -> Self {
        if name == ModelSource::HEURISTIC {
            ModelSource::Heuristic
        } else {
            ModelSource::Overlay(name)
        }
    }
}

/// Risk classification for one observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    #[serde(rename = "risk")]
    pub tier: RiskTier,
    pub color: String,
    pub emoji: String,
    /// Classifier confidence (0-1)
    pub confidence: f64,
    pub recommendation: String,
    pub risk_class: usize,
    /// Additive heuristic score of the observation
    pub score: i32,
    #[serde(rename = "model")]
    pub source_model: ModelSource,
    /// Weather values actually used for the assessment
    pub weather: WeatherObservation,
    /// Per-tier probabilities, when the classifier produces them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probabilities: Option<TierProbabilities>,
}

impl RiskAssessment {
    pub fn new(
        tier: RiskTier,
        score: i32,
        confidence: f64,
        source_model: ModelSource,
        weather: WeatherObservation,
    ) -> Self {
        Self {
            tier,
            color: tier.color().to_string(),
            emoji: tier.emoji().to_string(),
            confidence: confidence.clamp(0.0, 1.0),
            recommendation: tier.recommendation().to_string(),
            risk_class: tier.class_index(),
            score,
            source_model,
            weather,
            probabilities: None,
        }
    }

    pub fn with_probabilities(mut self, probabilities: TierProbabilities) -> Self {
        self.probabilities = Some(probabilities);
        self
    }
}

/// Probability of each tier, serialized as `{"LOW": .., "MEDIUM": .., ..}`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct TierProbabilities {
    pub low: f64,
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

impl TierProbabilities {
    /// From class-indexed values (0 = LOW .. 3 = CRITICAL)
    pub fn from_classes(values: [f64; 4]) -> Self {
        let [low, medium, high, critical] = values;
        Self {
            low,
            medium,
            high,
            critical,
        }
    }

    pub fn to_classes(&self) -> [f64; 4] {
        [self.low, self.medium, self.high, self.critical]
    }

    pub fn get(&self, tier: RiskTier) -> f64 {
        self.to_classes()[tier.class_index()]
    }

    /// Every entry finite and within 0-1
    pub fn is_valid(&self) -> bool {
        self.to_classes()
            .iter()
            .all(|p| p.is_finite() && (0.0..=1.0).contains(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_from_score() {
        assert_eq!(RiskTier::from_score(0), RiskTier::Low);
        assert_eq!(RiskTier::from_score(1), RiskTier::Low);
        assert_eq!(RiskTier::from_score(2), RiskTier::Medium);
        assert_eq!(RiskTier::from_score(4), RiskTier::High);
        assert_eq!(RiskTier::from_score(5), RiskTier::High);
        assert_eq!(RiskTier::from_score(6), RiskTier::Critical);
        assert_eq!(RiskTier::from_score(9), RiskTier::Critical);
    }

    #[test]
    fn test_tier_class_roundtrip() {
        for tier in RiskTier::ALL {
            assert_eq!(RiskTier::from_class(tier.class_index()), Some(tier));
        }
        assert_eq!(RiskTier::from_class(4), None);
    }

    #[test]
    fn test_tier_ordering() {
        assert!(RiskTier::Low < RiskTier::Medium);
        assert!(RiskTier::High < RiskTier::Critical);
    }

    #[test]
    fn test_assessment_serialization() {
        let weather = WeatherObservation::new(42.0, 90.0, 20.0);
        let assessment = RiskAssessment::new(
            RiskTier::Critical,
            7,
            HEURISTIC_CONFIDENCE,
            ModelSource::Heuristic,
            weather,
        );

        let json = serde_json::to_value(&assessment).unwrap();
        assert_eq!(json["risk"], "CRITICAL");
        assert_eq!(json["color"], "#F44336");
        assert_eq!(json["model"], "heuristic");
        assert_eq!(json["risk_class"], 3);
        assert_eq!(json["weather"]["temperature"], 42.0);
        assert!(json["weather"].get("pressure").is_none());
        assert!(json.get("probabilities").is_none());
    }

    #[test]
    fn test_probabilities_serialize_by_tier() {
        let p = TierProbabilities::from_classes([0.1, 0.2, 0.3, 0.4]);
        assert_eq!(p.get(RiskTier::High), 0.3);
        assert!(p.is_valid());
        assert!(!TierProbabilities::from_classes([f64::NAN, 0.0, 0.0, 1.0]).is_valid());

        let assessment = RiskAssessment::new(
            RiskTier::Critical,
            0,
            0.4,
            ModelSource::Overlay("lstm".into()),
            WeatherObservation::new(25.0, 60.0, 5.0),
        )
        .with_probabilities(p);
        let json = serde_json::to_value(&assessment).unwrap();
        assert_eq!(json["probabilities"]["LOW"], 0.1);
        assert_eq!(json["probabilities"]["CRITICAL"], 0.4);
    }

    #[test]
    fn test_observation_aliases() {
        let obs: WeatherObservation =
            serde_json::from_str(r#"{"temp": 25, "humidity": 60, "wind": 5}"#).unwrap();
        assert_eq!(obs, WeatherObservation::new(25.0, 60.0, 5.0));
        assert_eq!(obs.features(), [25.0, 60.0, 5.0, 1013.0, 0.0]);
    }

    #[test]
    fn test_model_source_strings() {
        let overlay: String = ModelSource::Overlay("boosted".into()).into();
        assert_eq!(overlay, "boosted");
        assert!(ModelSource::from("heuristic".to_string()).is_heuristic());
    }
}
