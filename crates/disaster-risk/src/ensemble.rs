//! Tree-ensemble overlay loaded from a JSON artifact
//!
//! Features: `[temperature, humidity, wind_speed, pressure, rainfall]`.
//! A split sends a sample left when `feature < threshold` (missing/NaN values
//! follow `default_left`).
//!
//! Two aggregation modes:
//! - `vote`: random-forest majority vote, leaves hold class indices,
//!   confidence = winning vote share
//! - `boosted`: gradient-boosted margins, each tree adds its leaf to one
//!   class, softmax over classes, confidence = winning probability
//!
//! Ties go to the higher-risk class.
//!
//! ```json
//! {
//!   "name": "gradient-boosted",
//!   "mode": "boosted",
//!   "trees": [
//!     {"class": 3, "nodes": [
//!       {"feature": 1, "threshold": 90.0, "left": 1, "right": 2},
//!       {"leaf": -0.4},
//!       {"leaf": 0.8}
//!     ]}
//!   ]
//! }
//! ```

use crate::overlay::{Overlay, OverlayError, OverlayPrediction, OverlayResult, OverlaySlot};
use crate::{TierProbabilities, WeatherObservation};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::info;

/// Number of risk classes
pub const NUM_CLASSES: usize = 4;

/// Length of the feature vector
pub const NUM_FEATURES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnsembleMode {
    Vote,
    Boosted,
}

impl EnsembleMode {
    fn default_name(&self) -> &'static str {
        match self {
            EnsembleMode::Vote => "random-forest",
            EnsembleMode::Boosted => "gradient-boosted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        #[serde(default = "default_left")]
        default_left: bool,
    },
    Leaf {
        leaf: f64,
    },
}

fn default_left() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    /// Target class for boosted margins (defaults to tree index mod 4)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<usize>,
    pub nodes: Vec<TreeNode>,
}

impl Tree {
    /// Walk from the root to a leaf
    fn evaluate(&self, features: &[f64; NUM_FEATURES]) -> Result<f64, OverlayError> {
        let mut index = 0;
        // A valid tree reaches a leaf in fewer steps than it has nodes
        for _ in 0..self.nodes.len() {
            match self.nodes.get(index) {
                Some(TreeNode::Leaf { leaf }) => return Ok(*leaf),
                Some(TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    default_left,
                }) => {
                    let value = *features.get(*feature).ok_or_else(|| {
                        OverlayError::Evaluation(format!("feature {} out of range", feature))
                    })?;
                    let go_left = if value.is_nan() {
                        *default_left
                    } else {
                        value < *threshold
                    };
                    index = if go_left { *left } else { *right };
                }
                None => {
                    return Err(OverlayError::Evaluation(format!("node {} missing", index)));
                }
            }
        }
        Err(OverlayError::Evaluation("tree walk did not terminate".into()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEnsemble {
    #[serde(default)]
    pub name: Option<String>,
    pub mode: EnsembleMode,
    /// Initial margin for every class (boosted only)
    #[serde(default)]
    pub base_score: f64,
    pub trees: Vec<Tree>,
}

impl TreeEnsemble {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, OverlayError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(OverlayError::Unavailable(format!("{} not found", path.display())));
        }
        info!("Loading tree ensemble from {:?}", path);

        let file = File::open(path)
            .map_err(|e| OverlayError::Unavailable(format!("{}: {}", path.display(), e)))?;
        let ensemble: TreeEnsemble = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| OverlayError::InvalidArtifact(e.to_string()))?;
        ensemble.validate()?;

        info!(
            "Loaded {} ({:?}, {} trees)",
            ensemble.display_name(),
            ensemble.mode,
            ensemble.trees.len()
        );
        Ok(ensemble)
    }

    /// Slot that loads this artifact on first use
    pub fn slot(name: impl Into<String>, path: impl Into<PathBuf>) -> OverlaySlot {
        let path = path.into();
        OverlaySlot::new(name, move || {
            let ensemble = TreeEnsemble::load(&path)?;
            let overlay: Box<dyn Overlay> = Box::new(ensemble);
            Ok(overlay)
        })
    }

    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .unwrap_or_else(|| self.mode.default_name())
    }

    /// Structural checks so evaluation cannot index out of bounds
    pub fn validate(&self) -> Result<(), OverlayError> {
        if self.trees.is_empty() {
            return Err(OverlayError::InvalidArtifact("ensemble has no trees".into()));
        }
        for (t, tree) in self.trees.iter().enumerate() {
            if tree.nodes.is_empty() {
                return Err(OverlayError::InvalidArtifact(format!("tree {} is empty", t)));
            }
            if let Some(class) = tree.class {
                if class >= NUM_CLASSES {
                    return Err(OverlayError::InvalidArtifact(format!(
                        "tree {} targets class {}",
                        t, class
                    )));
                }
            }
            for (n, node) in tree.nodes.iter().enumerate() {
                match node {
                    TreeNode::Split {
                        feature,
                        threshold,
                        left,
                        right,
                        ..
                    } => {
                        if *feature >= NUM_FEATURES {
                            return Err(OverlayError::InvalidArtifact(format!(
                                "tree {} node {} uses feature {}",
                                t, n, feature
                            )));
                        }
                        if !threshold.is_finite() {
                            return Err(OverlayError::InvalidArtifact(format!(
                                "tree {} node {} has non-finite threshold",
                                t, n
                            )));
                        }
                        if *left >= tree.nodes.len() || *right >= tree.nodes.len() {
                            return Err(OverlayError::InvalidArtifact(format!(
                                "tree {} node {} points outside the tree",
                                t, n
                            )));
                        }
                    }
                    TreeNode::Leaf { leaf } => {
                        if !leaf.is_finite() {
                            return Err(OverlayError::InvalidArtifact(format!(
                                "tree {} node {} has non-finite leaf",
                                t, n
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn predict_vote(&self, features: &[f64; NUM_FEATURES]) -> OverlayResult<OverlayPrediction> {
        let mut votes = [0usize; NUM_CLASSES];
        for tree in &self.trees {
            let leaf = tree.evaluate(features)?;
            if leaf.fract() != 0.0 || leaf < 0.0 || leaf >= NUM_CLASSES as f64 {
                return Err(OverlayError::MalformedOutput(format!("vote leaf {}", leaf)));
            }
            votes[leaf as usize] += 1;
        }

        let shares = votes.map(|v| v as f64 / self.trees.len() as f64);
        let class = argmax_high(&shares);
        Ok(OverlayPrediction {
            class,
            confidence: shares[class],
            probabilities: Some(TierProbabilities::from_classes(shares)),
        })
    }

    fn predict_boosted(&self, features: &[f64; NUM_FEATURES]) -> OverlayResult<OverlayPrediction> {
        let mut margins = [self.base_score; NUM_CLASSES];
        for (i, tree) in self.trees.iter().enumerate() {
            let class = tree.class.unwrap_or(i % NUM_CLASSES);
            margins[class] += tree.evaluate(features)?;
        }

        let probabilities = softmax(&margins);
        let class = argmax_high(&probabilities);
        Ok(OverlayPrediction {
            class,
            confidence: probabilities[class],
            probabilities: Some(TierProbabilities::from_classes(probabilities)),
        })
    }
}

impl Overlay for TreeEnsemble {
    fn name(&self) -> &str {
        self.display_name()
    }

    fn predict(&self, observation: &WeatherObservation) -> OverlayResult<OverlayPrediction> {
        let features = observation.features();
        match self.mode {
            EnsembleMode::Vote => self.predict_vote(&features),
            EnsembleMode::Boosted => self.predict_boosted(&features),
        }
    }
}

/// Index of the maximum; ties resolve to the highest index
pub(crate) fn argmax_high(values: &[f64; NUM_CLASSES]) -> usize {
    let mut best = 0;
    for (i, v) in values.iter().enumerate() {
        if *v >= values[best] {
            best = i;
        }
    }
    best
}

fn softmax(margins: &[f64; NUM_CLASSES]) -> [f64; NUM_CLASSES] {
    let max = margins.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exp = margins.map(|m| (m - max).exp());
    let sum: f64 = exp.iter().sum();
    exp.map(|e| e / sum)
}
