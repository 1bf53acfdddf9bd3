//! Sequence-network overlay over a week of daily weather
//!
//! A stacked LSTM followed by dense layers, evaluated from weights stored as
//! JSON. Input is `sequence_length` days (default 7) of
//! `[temperature, humidity, wind_speed, pressure]`, min-max scaled with the
//! artifact's scaler. The final dense layer is a 4-way softmax; the winning
//! probability is the confidence.
//!
//! Weight layout per LSTM layer: `kernel` is `input_dim x 4·units`,
//! `recurrent_kernel` is `units x 4·units`, `bias` is `4·units`, with gate
//! columns ordered input, forget, cell, output. Dense `kernel` is
//! `input_dim x output_dim`.

use crate::ensemble::{argmax_high, NUM_CLASSES};
use crate::overlay::{Overlay, OverlayError, OverlayPrediction, OverlayResult, OverlaySlot};
use crate::{TierProbabilities, WeatherObservation, DEFAULT_PRESSURE_HPA};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tracing::info;

/// Days per input window
pub const SEQUENCE_DAYS: usize = 7;

/// Per-day features: temperature, humidity, wind, pressure
pub const SEQUENCE_FEATURES: usize = 4;

fn default_sequence_length() -> usize {
    SEQUENCE_DAYS
}

/// Per-feature min-max scaling to 0-1
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinMaxScaler {
    pub min: Vec<f64>,
    pub max: Vec<f64>,
}

impl MinMaxScaler {
    /// Constant features (zero range) scale to 0
    pub fn transform(&self, row: &[f64; SEQUENCE_FEATURES]) -> [f64; SEQUENCE_FEATURES] {
        let mut out = [0.0; SEQUENCE_FEATURES];
        for (i, x) in row.iter().enumerate() {
            let range = self.max[i] - self.min[i];
            out[i] = if range > 0.0 {
                (x - self.min[i]) / range
            } else {
                0.0
            };
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LstmLayer {
    pub units: usize,
    pub kernel: Vec<Vec<f64>>,
    pub recurrent_kernel: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
}

impl LstmLayer {
    /// Hidden state after every step
    fn run(&self, inputs: &[Vec<f64>]) -> Vec<Vec<f64>> {
        let u = self.units;
        let mut h = vec![0.0; u];
        let mut c = vec![0.0; u];
        let mut outputs = Vec::with_capacity(inputs.len());

        for x in inputs {
            let mut z = self.bias.clone();
            for (k, xk) in x.iter().enumerate() {
                for (j, w) in self.kernel[k].iter().enumerate() {
                    z[j] += xk * w;
                }
            }
            for (k, hk) in h.iter().enumerate() {
                for (j, w) in self.recurrent_kernel[k].iter().enumerate() {
                    z[j] += hk * w;
                }
            }

            for j in 0..u {
                let input = sigmoid(z[j]);
                let forget = sigmoid(z[u + j]);
                let cell = z[2 * u + j].tanh();
                let output = sigmoid(z[3 * u + j]);
                c[j] = forget * c[j] + input * cell;
                h[j] = output * c[j].tanh();
            }
            outputs.push(h.clone());
        }
        outputs
    }

    fn validate(&self, input_dim: usize, layer: usize) -> OverlayResult<()> {
        let width = 4 * self.units;
        let bad = |what: &str| {
            Err(OverlayError::InvalidArtifact(format!("lstm layer {}: {}", layer, what)))
        };
        if self.units == 0 {
            return bad("zero units");
        }
        if self.kernel.len() != input_dim || self.kernel.iter().any(|r| r.len() != width) {
            return bad("kernel shape");
        }
        if self.recurrent_kernel.len() != self.units
            || self.recurrent_kernel.iter().any(|r| r.len() != width)
        {
            return bad("recurrent kernel shape");
        }
        if self.bias.len() != width {
            return bad("bias length");
        }
        let weights = self.kernel.iter().chain(&self.recurrent_kernel).flatten();
        if !weights.chain(&self.bias).all(|w| w.is_finite()) {
            return bad("non-finite weight");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Linear,
    Relu,
    Softmax,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseLayer {
    pub kernel: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
    pub activation: Activation,
}

impl DenseLayer {
    fn apply(&self, x: &[f64]) -> Vec<f64> {
        let mut z = self.bias.clone();
        for (k, xk) in x.iter().enumerate() {
            for (j, w) in self.kernel[k].iter().enumerate() {
                z[j] += xk * w;
            }
        }
        match self.activation {
            Activation::Linear => z,
            Activation::Relu => z.into_iter().map(|v| v.max(0.0)).collect(),
            Activation::Softmax => softmax(&z),
        }
    }

    fn validate(&self, input_dim: usize, layer: usize) -> OverlayResult<()> {
        let out = self.bias.len();
        if out == 0
            || self.kernel.len() != input_dim
            || self.kernel.iter().any(|r| r.len() != out)
        {
            return Err(OverlayError::InvalidArtifact(format!(
                "dense layer {}: kernel shape",
                layer
            )));
        }
        if !self.kernel.iter().flatten().chain(&self.bias).all(|w| w.is_finite()) {
            return Err(OverlayError::InvalidArtifact(format!(
                "dense layer {}: non-finite weight",
                layer
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceNetwork {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_sequence_length")]
    pub sequence_length: usize,
    pub scaler: MinMaxScaler,
    pub lstm: Vec<LstmLayer>,
    pub dense: Vec<DenseLayer>,
}

impl SequenceNetwork {
    pub fn load(path: impl AsRef<Path>) -> OverlayResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(OverlayError::Unavailable(format!("{} not found", path.display())));
        }
        info!("Loading sequence network from {:?}", path);

        let file = File::open(path)
            .map_err(|e| OverlayError::Unavailable(format!("{}: {}", path.display(), e)))?;
        let network: SequenceNetwork = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| OverlayError::InvalidArtifact(e.to_string()))?;
        network.validate()?;

        info!(
            "Loaded {} ({} lstm, {} dense, {} days)",
            network.display_name(),
            network.lstm.len(),
            network.dense.len(),
            network.sequence_length
        );
        Ok(network)
    }

    /// Slot that loads this artifact on first use
    pub fn slot(name: impl Into<String>, path: impl Into<PathBuf>) -> OverlaySlot {
        let path = path.into();
        OverlaySlot::new(name, move || {
            let network = SequenceNetwork::load(&path)?;
            let overlay: Box<dyn Overlay> = Box::new(network);
            Ok(overlay)
        })
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or("lstm-network")
    }

    /// Shape checks so the forward pass cannot index out of bounds
    pub fn validate(&self) -> OverlayResult<()> {
        if self.sequence_length == 0 {
            return Err(OverlayError::InvalidArtifact("sequence length is zero".into()));
        }
        let scaler = &self.scaler;
        if scaler.min.len() != SEQUENCE_FEATURES
            || scaler.max.len() != SEQUENCE_FEATURES
            || !scaler.min.iter().chain(&scaler.max).all(|v| v.is_finite())
        {
            return Err(OverlayError::InvalidArtifact(format!(
                "scaler needs {} finite min/max values",
                SEQUENCE_FEATURES
            )));
        }
        if self.lstm.is_empty() {
            return Err(OverlayError::InvalidArtifact("no lstm layers".into()));
        }

        let mut dim = SEQUENCE_FEATURES;
        for (i, layer) in self.lstm.iter().enumerate() {
            layer.validate(dim, i)?;
            dim = layer.units;
        }
        for (i, layer) in self.dense.iter().enumerate() {
            layer.validate(dim, i)?;
            dim = layer.bias.len();
        }

        match self.dense.last() {
            Some(last) if dim == NUM_CLASSES && last.activation == Activation::Softmax => Ok(()),
            _ => Err(OverlayError::InvalidArtifact(format!(
                "output must be a {}-way softmax",
                NUM_CLASSES
            ))),
        }
    }

    /// The last `sequence_length` days, ending with the current observation
    pub fn window(
        &self,
        observation: &WeatherObservation,
        recent: &[WeatherObservation],
    ) -> OverlayResult<Vec<[f64; SEQUENCE_FEATURES]>> {
        let needed = self.sequence_length - 1;
        if recent.len() < needed {
            return Err(OverlayError::Unavailable(format!(
                "needs {} preceding days, got {}",
                needed,
                recent.len()
            )));
        }
        Ok(recent[recent.len() - needed..]
            .iter()
            .chain(std::iter::once(observation))
            .map(day_features)
            .collect())
    }

    /// Class probabilities for a window of raw daily features
    pub fn forward(
        &self,
        window: &[[f64; SEQUENCE_FEATURES]],
    ) -> OverlayResult<[f64; NUM_CLASSES]> {
        let mut sequence: Vec<Vec<f64>> = window
            .iter()
            .map(|day| self.scaler.transform(day).to_vec())
            .collect();
        for layer in &self.lstm {
            sequence = layer.run(&sequence);
        }

        let mut x = sequence
            .pop()
            .ok_or_else(|| OverlayError::Evaluation("empty input window".into()))?;
        for layer in &self.dense {
            x = layer.apply(&x);
        }

        let probabilities: [f64; NUM_CLASSES] = x.try_into().map_err(|v: Vec<f64>| {
            OverlayError::MalformedOutput(format!("{} outputs", v.len()))
        })?;
        if probabilities.iter().any(|p| !p.is_finite()) {
            return Err(OverlayError::MalformedOutput("non-finite probability".into()));
        }
        Ok(probabilities)
    }
}

impl Overlay for SequenceNetwork {
    fn name(&self) -> &str {
        self.display_name()
    }

    fn predict(&self, observation: &WeatherObservation) -> OverlayResult<OverlayPrediction> {
        self.predict_with_history(observation, &[])
    }

    fn predict_with_history(
        &self,
        observation: &WeatherObservation,
        recent: &[WeatherObservation],
    ) -> OverlayResult<OverlayPrediction> {
        let window = self.window(observation, recent)?;
        let probabilities = self.forward(&window)?;
        let class = argmax_high(&probabilities);
        Ok(OverlayPrediction {
            class,
            confidence: probabilities[class],
            probabilities: Some(TierProbabilities::from_classes(probabilities)),
        })
    }
}

fn day_features(day: &WeatherObservation) -> [f64; SEQUENCE_FEATURES] {
    [
        day.temperature,
        day.humidity,
        day.wind_speed,
        day.pressure.unwrap_or(DEFAULT_PRESSURE_HPA),
    ]
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn softmax(z: &[f64]) -> Vec<f64> {
    let max = z.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let exp: Vec<f64> = z.iter().map(|v| (v - max).exp()).collect();
    let sum: f64 = exp.iter().sum();
    exp.into_iter().map(|e| e / sum).collect()
}
