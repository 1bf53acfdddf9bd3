//! Optional model overlays with heuristic fallback
//!
//! An overlay is any classifier that may replace the heuristic tier. Each
//! overlay sits in an [`OverlaySlot`] that loads it at most once; the
//! [`OverlayChain`] tries slots in fixed priority order and the first success
//! wins. Every overlay failure (missing artifact, load error, panic, bad
//! output) stays inside this module and the heuristic answers instead.

use crate::{
    heuristic, ModelSource, Result, RiskAssessment, RiskError, RiskTier, TierProbabilities,
    WeatherObservation,
};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::OnceLock;
use thiserror::Error;
use tracing::{debug, info, warn};

pub type OverlayResult<T> = std::result::Result<T, OverlayError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OverlayError {
    #[error("overlay unavailable: {0}")]
    Unavailable(String),
    #[error("overlay artifact invalid: {0}")]
    InvalidArtifact(String),
    #[error("overlay evaluation failed: {0}")]
    Evaluation(String),
    #[error("overlay returned malformed output: {0}")]
    MalformedOutput(String),
}

/// Raw overlay output before validation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayPrediction {
    /// Risk class index (0 = LOW .. 3 = CRITICAL)
    pub class: usize,
    /// Confidence (0-1)
    pub confidence: f64,
    pub probabilities: Option<TierProbabilities>,
}

/// A statistical classifier over weather observations
pub trait Overlay: Send + Sync {
    /// Reported as the assessment's source model
    fn name(&self) -> &str;

    fn predict(&self, observation: &WeatherObservation) -> OverlayResult<OverlayPrediction>;

    /// Predict with the preceding daily observations (oldest first). Point
    /// models ignore `recent`.
    fn predict_with_history(
        &self,
        observation: &WeatherObservation,
        _recent: &[WeatherObservation],
    ) -> OverlayResult<OverlayPrediction> {
        self.predict(observation)
    }

    fn classify(&self, observation: &WeatherObservation) -> OverlayResult<RiskAssessment> {
        self.classify_with_history(observation, &[])
    }

    /// Validate the prediction and build an assessment
    fn classify_with_history(
        &self,
        observation: &WeatherObservation,
        recent: &[WeatherObservation],
    ) -> OverlayResult<RiskAssessment> {
        let prediction = self.predict_with_history(observation, recent)?;

        let tier = RiskTier::from_class(prediction.class).ok_or_else(|| {
            OverlayError::MalformedOutput(format!("class index {} out of range", prediction.class))
        })?;
        if !prediction.confidence.is_finite() || !(0.0..=1.0).contains(&prediction.confidence) {
            return Err(OverlayError::MalformedOutput(format!(
                "confidence {} outside 0-1",
                prediction.confidence
            )));
        }

        let assessment = RiskAssessment::new(
            tier,
            heuristic::score(observation),
            prediction.confidence,
            ModelSource::Overlay(self.name().to_string()),
            *observation,
        );
        match prediction.probabilities {
            Some(p) if p.is_valid() => Ok(assessment.with_probabilities(p)),
            Some(p) => Err(OverlayError::MalformedOutput(format!(
                "probabilities {:?} outside 0-1",
                p.to_classes()
            ))),
            None => Ok(assessment),
        }
    }
}

type OverlayLoader = Box<dyn Fn() -> OverlayResult<Box<dyn Overlay>> + Send + Sync>;

/// Lazily loaded overlay; the loader runs at most once, even under concurrent
/// first use, and a failed load is remembered
pub struct OverlaySlot {
    name: String,
    loader: OverlayLoader,
    loaded: OnceLock<OverlayResult<Box<dyn Overlay>>>,
}

impl OverlaySlot {
    pub fn new<F>(name: impl Into<String>, loader: F) -> Self
    where
        F: Fn() -> OverlayResult<Box<dyn Overlay>> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            loader: Box::new(loader),
            loaded: OnceLock::new(),
        }
    }

    /// Slot around an already constructed overlay
    pub fn ready(overlay: Box<dyn Overlay>) -> Self {
        let slot = Self::new(overlay.name().to_string(), || {
            Err(OverlayError::Unavailable("already loaded".into()))
        });
        let _ = slot.loaded.set(Ok(overlay));
        slot
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Load on first call; later calls return the cached outcome
    pub fn get(&self) -> OverlayResult<&dyn Overlay> {
        let loaded = self.loaded.get_or_init(|| {
            let outcome = catch_unwind(AssertUnwindSafe(|| (self.loader)())).unwrap_or_else(|_| {
                Err(OverlayError::Unavailable("loader panicked".into()))
            });
            match &outcome {
                Ok(overlay) => info!("Overlay {} loaded ({})", self.name, overlay.name()),
                Err(e) => warn!("Overlay {} disabled: {}", self.name, e),
            }
            outcome
        });
        loaded.as_deref().map_err(Clone::clone)
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.loaded.get(), Some(Ok(_)))
    }

    pub fn classify(&self, observation: &WeatherObservation) -> OverlayResult<RiskAssessment> {
        self.classify_with_history(observation, &[])
    }

    /// Classify through this slot, converting panics into errors. The slot
    /// name is reported as the source model.
    pub fn classify_with_history(
        &self,
        observation: &WeatherObservation,
        recent: &[WeatherObservation],
    ) -> OverlayResult<RiskAssessment> {
        let overlay = self.get()?;
        let mut assessment = catch_unwind(AssertUnwindSafe(|| {
            overlay.classify_with_history(observation, recent)
        }))
        .unwrap_or_else(|_| Err(OverlayError::Evaluation("overlay panicked".into())))?;
        assessment.source_model = ModelSource::Overlay(self.name.clone());
        Ok(assessment)
    }
}

impl std::fmt::Debug for OverlaySlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlaySlot")
            .field("name", &self.name)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

/// Overlays in priority order (first = highest)
#[derive(Debug, Default)]
pub struct OverlayChain {
    slots: Vec<OverlaySlot>,
}

impl OverlayChain {
    pub fn new(slots: Vec<OverlaySlot>) -> Self {
        Self { slots }
    }

    /// Chain with no overlays: always the heuristic
    pub fn heuristic_only() -> Self {
        Self::default()
    }

    pub fn push(&mut self, slot: OverlaySlot) {
        self.slots.push(slot);
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.slots.iter().map(OverlaySlot::name).collect()
    }

    /// Force every slot to load (startup warm-up); returns how many are usable
    pub fn warm_up(&self) -> usize {
        self.slots.iter().filter(|s| s.get().is_ok()).count()
    }

    /// First overlay result in priority order; lower-priority overlays are
    /// not consulted once one succeeds
    pub fn try_overlays(
        &self,
        observation: &WeatherObservation,
        recent: &[WeatherObservation],
    ) -> Result<RiskAssessment> {
        if self.slots.is_empty() {
            return Err(RiskError::Unavailable("no overlay configured".into()));
        }
        for slot in &self.slots {
            match slot.classify_with_history(observation, recent) {
                Ok(assessment) => {
                    debug!("Overlay {} classified as {}", slot.name(), assessment.tier);
                    return Ok(assessment);
                }
                Err(e) => warn!("Overlay {} failed, trying next: {}", slot.name(), e),
            }
        }
        Err(RiskError::Unavailable("no overlay produced a result".into()))
    }

    pub fn classify(&self, observation: &WeatherObservation) -> RiskAssessment {
        self.classify_with_history(observation, &[])
    }

    /// Overlay result if any succeeds, else the heuristic
    pub fn classify_with_history(
        &self,
        observation: &WeatherObservation,
        recent: &[WeatherObservation],
    ) -> RiskAssessment {
        self.try_overlays(observation, recent)
            .unwrap_or_else(|_| heuristic::classify_observation(observation))
    }
}
