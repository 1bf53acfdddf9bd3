//! Rule-based risk heuristic
//!
//! Each predictor is scored independently and the contributions summed:
//! Score = T(temperature) + H(humidity) + W(wind)
//!
//! All thresholds are strict (`>` / `<`). NaN inputs contribute 0 because
//! every comparison against NaN is false, so the function is total.

use crate::{ModelSource, RiskAssessment, RiskTier, WeatherObservation, HEURISTIC_CONFIDENCE};
use serde::Serialize;
use tracing::debug;

/// Per-factor contributions to the additive score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScoreBreakdown {
    pub temperature: i32,
    pub humidity: i32,
    pub wind: i32,
}

impl ScoreBreakdown {
    pub fn total(&self) -> i32 {
        self.temperature + self.humidity + self.wind
    }
}

/// Extreme heat or cold
pub fn temperature_points(temp: f64) -> i32 {
    if temp < 0.0 || temp > 45.0 {
        3
    } else if temp < 5.0 || temp > 40.0 {
        2
    } else if temp < 10.0 || temp > 35.0 {
        1
    } else {
        0
    }
}

/// Saturated air (flood risk)
pub fn humidity_points(humidity: f64) -> i32 {
    if humidity > 90.0 {
        3
    } else if humidity > 80.0 {
        2
    } else if humidity > 70.0 {
        1
    } else {
        0
    }
}

/// Storm / cyclone risk
pub fn wind_points(wind: f64) -> i32 {
    if wind > 20.0 {
        3
    } else if wind > 15.0 {
        2
    } else if wind > 10.0 {
        1
    } else {
        0
    }
}

pub fn score_breakdown(temp: f64, humidity: f64, wind: f64) -> ScoreBreakdown {
    ScoreBreakdown {
        temperature: temperature_points(temp),
        humidity: humidity_points(humidity),
        wind: wind_points(wind),
    }
}

/// Additive score for an observation
pub fn score(observation: &WeatherObservation) -> i32 {
    score_breakdown(
        observation.temperature,
        observation.humidity,
        observation.wind_speed,
    )
    .total()
}

/// Classify raw weather values
pub fn classify(temp: f64, humidity: f64, wind: f64) -> RiskAssessment {
    classify_observation(&WeatherObservation::new(temp, humidity, wind))
}

/// Classify an observation, echoing it back in the assessment
pub fn classify_observation(observation: &WeatherObservation) -> RiskAssessment {
    let breakdown = score_breakdown(
        observation.temperature,
        observation.humidity,
        observation.wind_speed,
    );
    let total = breakdown.total();
    let tier = RiskTier::from_score(total);

    debug!(
        "Heuristic: {} (score={}, temp={}, hum={}, wind={})",
        tier, total, breakdown.temperature, breakdown.humidity, breakdown.wind
    );

    RiskAssessment::new(
        tier,
        total,
        HEURISTIC_CONFIDENCE,
        ModelSource::Heuristic,
        *observation,
    )
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    const TEMP_THRESHOLDS: [f64; 6] = [0.0, 5.0, 10.0, 35.0, 40.0, 45.0];

    fn temp_strategy() -> impl Strategy<Value = f64> {
        -60.0f64..70.0
    }

    fn humidity_strategy() -> impl Strategy<Value = f64> {
        -10.0f64..120.0
    }

    fn wind_strategy() -> impl Strategy<Value = f64> {
        0.0f64..60.0
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(2000))]

        #[test]
        fn classify_is_pure(t in temp_strategy(), h in humidity_strategy(), w in wind_strategy()) {
            let a = classify(t, h, w);
            let b = classify(t, h, w);
            prop_assert_eq!(a.tier, b.tier);
            prop_assert_eq!(a.confidence, b.confidence);
            prop_assert!(RiskTier::ALL.contains(&a.tier));
            prop_assert!((0..=9).contains(&a.score));
        }

        #[test]
        fn hotter_never_lowers_tier(
            base in 10.0f64..35.0,
            delta in 0.0f64..40.0,
            h in humidity_strategy(),
            w in wind_strategy(),
        ) {
            let mild = classify(base, h, w);
            let hot = classify(base + delta, h, w);
            prop_assert!(hot.tier >= mild.tier);
        }

        #[test]
        fn colder_never_lowers_tier(
            base in 10.0f64..35.0,
            delta in 0.0f64..40.0,
            h in humidity_strategy(),
            w in wind_strategy(),
        ) {
            let mild = classify(base, h, w);
            let cold = classify(base - delta, h, w);
            prop_assert!(cold.tier >= mild.tier);
        }

        #[test]
        fn crossing_threshold_never_lowers_tier(
            idx in 0usize..6,
            eps in 0.0001f64..1.0,
            h in humidity_strategy(),
            w in wind_strategy(),
        ) {
            let threshold = TEMP_THRESHOLDS[idx];
            // Move away from the comfortable band across the threshold
            let (inside, outside) = if threshold >= 35.0 {
                (threshold, threshold + eps)
            } else {
                (threshold, threshold - eps)
            };
            prop_assert!(classify(outside, h, w).tier >= classify(inside, h, w).tier);
            prop_assert_eq!(
                temperature_points(outside),
                temperature_points(inside) + 1
            );
        }
    }
}
