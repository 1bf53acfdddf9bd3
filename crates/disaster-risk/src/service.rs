//! Core operations exposed to request handlers
//!
//! The service owns the read-only records store and the overlay chain. It is
//! built once at startup and shared behind an `Arc`; nothing in it mutates
//! after construction apart from overlay slots loading themselves once.

use crate::ensemble::TreeEnsemble;
use crate::overlay::OverlayChain;
use crate::sequence::SequenceNetwork;
use crate::{
    resolver, DisasterRecord, RecordStore, Result, RiskAssessment, RiskError, WeatherObservation,
    BOOSTED_OVERLAY_FILE, FOREST_OVERLAY_FILE, SEQUENCE_OVERLAY_FILE,
};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Overlay names understood by [`RiskService::from_data_dir`]
pub const KNOWN_OVERLAYS: [&str; 3] = ["boosted", "forest", "lstm"];

/// Resolved location with its historical records
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationHistory {
    pub location: String,
    pub records: Vec<DisasterRecord>,
}

#[derive(Debug)]
pub struct RiskService {
    store: Arc<RecordStore>,
    overlays: OverlayChain,
}

impl RiskService {
    pub fn new(store: Arc<RecordStore>, overlays: OverlayChain) -> Self {
        Self { store, overlays }
    }

    /// Load the records store and configure overlays (highest priority first)
    /// from a data directory. Unknown overlay names are skipped.
    pub fn from_data_dir(dir: impl AsRef<Path>, overlay_priority: &[String]) -> Self {
        let dir = dir.as_ref();
        let store = RecordStore::load_dir(dir);

        let mut overlays = OverlayChain::heuristic_only();
        for name in overlay_priority {
            let name = name.trim().to_lowercase();
            let slot = match name.as_str() {
                "boosted" => TreeEnsemble::slot(name, dir.join(BOOSTED_OVERLAY_FILE)),
                "forest" => TreeEnsemble::slot(name, dir.join(FOREST_OVERLAY_FILE)),
                "lstm" => SequenceNetwork::slot(name, dir.join(SEQUENCE_OVERLAY_FILE)),
                "" => continue,
                other => {
                    warn!("Unknown overlay {:?} ignored (known: {:?})", other, KNOWN_OVERLAYS);
                    continue;
                }
            };
            overlays.push(slot);
        }

        info!(
            "Risk service configured: records available={}, overlays={:?}",
            store.is_available(),
            overlays.names()
        );

        Self::new(Arc::new(store), overlays)
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn overlays(&self) -> &OverlayChain {
        &self.overlays
    }

    /// Classify the weather at a location. The caller supplies the weather;
    /// the core never fetches it.
    pub fn assess_risk(
        &self,
        location: &str,
        weather: Option<WeatherObservation>,
    ) -> Result<RiskAssessment> {
        self.assess_risk_with_history(location, weather, &[])
    }

    /// As [`RiskService::assess_risk`], with the preceding daily observations
    /// (oldest first) for overlays that read a sequence
    pub fn assess_risk_with_history(
        &self,
        location: &str,
        weather: Option<WeatherObservation>,
        recent: &[WeatherObservation],
    ) -> Result<RiskAssessment> {
        let location = location.trim();
        if location.is_empty() {
            return Err(RiskError::InvalidInput("location is required".into()));
        }
        let weather = weather.ok_or_else(|| {
            RiskError::InvalidInput(format!("weather observation required for {}", location))
        })?;

        let assessment = self.overlays.classify_with_history(&weather, recent);
        debug!(
            "Assessed {}: {} via {:?}",
            location, assessment.tier, assessment.source_model
        );
        Ok(assessment)
    }

    /// Resolve the location and return its historical records
    pub fn history_for(&self, location: &str) -> Result<Vec<DisasterRecord>> {
        self.lookup(location).map(|h| h.records)
    }

    /// Canonical location name together with its records
    pub fn lookup(&self, location: &str) -> Result<LocationHistory> {
        if location.trim().is_empty() {
            return Err(RiskError::InvalidInput("location is required".into()));
        }
        let vocabulary = match self.store.vocabulary() {
            Some(v) if self.store.is_available() => v,
            _ => {
                return Err(RiskError::Unavailable(
                    self.store
                        .unavailable_reason()
                        .unwrap_or("historical records not loaded")
                        .to_string(),
                ))
            }
        };

        let canonical = resolver::resolve(vocabulary, location)?;
        let records = self.store.records_for(canonical).to_vec();
        debug!("History for {:?} ({}): {} records", location, canonical, records.len());
        Ok(LocationHistory {
            location: canonical.to_string(),
            records,
        })
    }

    /// Canonical name for a raw location, if the store is loaded
    pub fn resolve(&self, location: &str) -> Result<String> {
        let vocabulary = self
            .store
            .vocabulary()
            .filter(|_| self.store.is_available())
            .ok_or_else(|| RiskError::Unavailable("location vocabulary not loaded".into()))?;
        resolver::resolve(vocabulary, location).map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::{Overlay, OverlayError, OverlayPrediction, OverlayResult, OverlaySlot};
    use crate::{LocationVocabulary, RiskTier};

    fn record(location: &str, year: i32, deaths: Option<u32>) -> DisasterRecord {
        DisasterRecord {
            location: location.into(),
            disaster_type: "Flood".into(),
            disaster_subtype: None,
            start_year: year,
            total_deaths: deaths,
        }
    }

    fn service() -> RiskService {
        let vocab = LocationVocabulary::new(["Maharashtra", "Tamil Nadu", "Uttar Pradesh"]);
        let store = RecordStore::new(
            vocab,
            vec![
                record("Tamil Nadu", 2015, Some(289)),
                record("Tamil Nadu", 2004, None),
                record("Maharashtra", 2005, Some(1094)),
            ],
        );
        RiskService::new(Arc::new(store), OverlayChain::heuristic_only())
    }

    struct AlwaysThrows;

    impl Overlay for AlwaysThrows {
        fn name(&self) -> &str {
            "always-throws"
        }

        fn predict(&self, _: &WeatherObservation) -> OverlayResult<OverlayPrediction> {
            Err(OverlayError::Evaluation("boom".into()))
        }
    }

    #[test]
    fn test_assess_critical() {
        let s = service();
        let a = s
            .assess_risk("Mumbai", Some(WeatherObservation::new(42.0, 90.0, 20.0)))
            .unwrap();
        assert_eq!(a.tier, RiskTier::Critical);
    }

    #[test]
    fn test_assess_low() {
        let s = service();
        let a = s
            .assess_risk("Mumbai", Some(WeatherObservation::new(25.0, 60.0, 5.0)))
            .unwrap();
        assert_eq!(a.score, 0);
        assert_eq!(a.tier, RiskTier::Low);
        assert_eq!(a.weather, WeatherObservation::new(25.0, 60.0, 5.0));
    }

    #[test]
    fn test_assess_requires_location_and_weather() {
        let s = service();
        let w = Some(WeatherObservation::new(25.0, 60.0, 5.0));
        assert!(matches!(s.assess_risk(" ", w), Err(RiskError::InvalidInput(_))));
        assert!(matches!(s.assess_risk("Mumbai", None), Err(RiskError::InvalidInput(_))));
    }

    #[test]
    fn test_throwing_overlay_uses_heuristic() {
        let vocab = LocationVocabulary::new(["Goa"]);
        let s = RiskService::new(
            Arc::new(RecordStore::new(vocab, vec![])),
            OverlayChain::new(vec![OverlaySlot::ready(Box::new(AlwaysThrows))]),
        );
        let a = s
            .assess_risk("Goa", Some(WeatherObservation::new(42.0, 90.0, 20.0)))
            .unwrap();
        assert!(a.source_model.is_heuristic());
        assert_eq!(a.tier, RiskTier::Critical);
    }

    #[test]
    fn test_history_fuzzy() {
        let s = service();
        let records = s.history_for("tamil").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].total_deaths, None);
    }

    #[test]
    fn test_lookup_returns_canonical_name() {
        let s = service();
        let h = s.lookup("  TAMIL ").unwrap();
        assert_eq!(h.location, "Tamil Nadu");
        assert_eq!(h.records.len(), 2);
    }

    #[test]
    fn test_history_feeds_sequence_overlay() {
        let dir = tempfile::tempdir().unwrap();
        let s = RiskService::from_data_dir(dir.path(), &["lstm".to_string()]);
        assert_eq!(s.overlays().names(), vec!["lstm"]);

        // no artifact on disk: heuristic answers with or without history
        let storm = WeatherObservation::new(30.0, 95.0, 20.0);
        let week = vec![storm; 6];
        let a = s
            .assess_risk_with_history("Goa", Some(storm), &week)
            .unwrap();
        assert!(a.source_model.is_heuristic());
        assert_eq!(a.tier, RiskTier::Critical);
    }

    #[test]
    fn test_history_resolved_without_records() {
        let s = service();
        assert!(s.history_for("Uttar Pradesh").unwrap().is_empty());
    }

    #[test]
    fn test_history_not_found() {
        let s = service();
        match s.history_for("Mumbai") {
            Err(RiskError::NotFound { hints, .. }) => {
                assert!(hints.len() <= crate::MAX_HINTS);
                assert_eq!(hints[0], "Maharashtra");
            }
            other => panic!("expected NotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_history_unavailable_store() {
        let s = RiskService::new(
            Arc::new(RecordStore::unavailable("file missing")),
            OverlayChain::heuristic_only(),
        );
        assert_eq!(
            s.history_for("Goa"),
            Err(RiskError::Unavailable("file missing".into()))
        );
        assert!(matches!(s.resolve("Goa"), Err(RiskError::Unavailable(_))));
        // assessment does not depend on the store
        assert!(s
            .assess_risk("Goa", Some(WeatherObservation::new(25.0, 60.0, 5.0)))
            .is_ok());
    }

    #[test]
    fn test_from_empty_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let s = RiskService::from_data_dir(
            dir.path(),
            &["boosted".to_string(), "bogus".to_string(), "forest".to_string()],
        );
        assert!(!s.store().is_available());
        assert_eq!(s.overlays().names(), vec!["boosted", "forest"]);
        assert_eq!(s.overlays().warm_up(), 0);

        let a = s
            .assess_risk("Anywhere", Some(WeatherObservation::new(-5.0, 95.0, 0.0)))
            .unwrap();
        assert!(a.source_model.is_heuristic());
        assert_eq!(a.tier, RiskTier::Critical);
    }
}
