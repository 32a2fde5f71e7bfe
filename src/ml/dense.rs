//! Small dense-network scorer (CPU-only, loaded from JSON).
//!
//! Used as the paper-mode predictive model. Shapes are validated at load so a
//! bad model file fails at startup instead of on the trade path.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{ModelFeatures, PredictiveModel, Score, FEATURE_DIM};
use crate::error::{CollaboratorError, Result, TradegateError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    #[default]
    Linear,
    Relu,
    Tanh,
    Sigmoid,
}

impl Activation {
    fn apply(self, x: f64) -> f64 {
        match self {
            Activation::Linear => x,
            Activation::Relu => x.max(0.0),
            Activation::Tanh => x.tanh(),
            Activation::Sigmoid => sigmoid(x),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseLayer {
    /// Weights shape: [out_dim][in_dim]
    pub weights: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
    #[serde(default)]
    pub activation: Activation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseNetwork {
    pub input_dim: usize,
    pub layers: Vec<DenseLayer>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl DenseNetwork {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        let model: Self = serde_json::from_str(&content)?;
        model.validate().map_err(TradegateError::Validation)?;
        Ok(model)
    }

    /// Single sigmoid unit with zero weights: always 0.5, i.e. no opinion
    pub fn neutral(input_dim: usize) -> Self {
        Self {
            input_dim,
            layers: vec![DenseLayer {
                weights: vec![vec![0.0; input_dim]],
                bias: vec![0.0],
                activation: Activation::Sigmoid,
            }],
            metadata: serde_json::json!({ "name": "neutral" }),
        }
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.input_dim == 0 {
            return Err("input_dim must be > 0".to_string());
        }
        if self.layers.is_empty() {
            return Err("layers must not be empty".to_string());
        }

        let mut expected_in = self.input_dim;
        for (idx, layer) in self.layers.iter().enumerate() {
            if layer.weights.is_empty() || layer.bias.len() != layer.weights.len() {
                return Err(format!(
                    "layer[{idx}] has {} rows and {} biases",
                    layer.weights.len(),
                    layer.bias.len()
                ));
            }
            if layer.weights.iter().any(|row| row.len() != expected_in) {
                return Err(format!("layer[{idx}] rows must have {expected_in} columns"));
            }
            let finite = layer.weights.iter().flatten().chain(&layer.bias).all(|v| v.is_finite());
            if !finite {
                return Err(format!("layer[{idx}] contains non-finite values"));
            }
            expected_in = layer.weights.len();
        }
        if expected_in != 1 {
            return Err(format!("output_dim must be 1, got {expected_in}"));
        }
        Ok(())
    }

    pub fn forward_scalar(&self, input: &[f64]) -> std::result::Result<f64, String> {
        if input.len() != self.input_dim {
            return Err(format!(
                "input dim mismatch: got {}, expected {}",
                input.len(),
                self.input_dim
            ));
        }

        let mut x = input.to_vec();
        for layer in &self.layers {
            x = layer
                .weights
                .iter()
                .zip(&layer.bias)
                .map(|(row, b)| {
                    let sum = row.iter().zip(&x).map(|(w, v)| w * v).sum::<f64>() + b;
                    layer.activation.apply(sum)
                })
                .collect();
        }

        x.first()
            .copied()
            .ok_or_else(|| "network produced no output".to_string())
    }
}

fn sigmoid(x: f64) -> f64 {
    // Numerically-stable sigmoid.
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let z = x.exp();
        z / (1.0 + z)
    }
}

/// [`PredictiveModel`] backed by a [`DenseNetwork`].
///
/// The scalar output is read as a probability; confidence is its distance
/// from 0.5, scaled to [0, 1].
#[derive(Debug, Clone)]
pub struct DenseModel {
    network: DenseNetwork,
}

impl DenseModel {
    pub fn new(network: DenseNetwork) -> Result<Self> {
        network.validate().map_err(TradegateError::Validation)?;
        if network.input_dim != FEATURE_DIM {
            return Err(TradegateError::Validation(format!(
                "model expects {} features, pipeline produces {FEATURE_DIM}",
                network.input_dim
            )));
        }
        Ok(Self { network })
    }

    pub fn neutral() -> Self {
        Self {
            network: DenseNetwork::neutral(FEATURE_DIM),
        }
    }
}

#[async_trait]
impl PredictiveModel for DenseModel {
    async fn predict(&self, features: &ModelFeatures) -> std::result::Result<Score, CollaboratorError> {
        let p = self
            .network
            .forward_scalar(features.as_slice())
            .map_err(|e| CollaboratorError::rejected("model", e))?;
        Ok(Score {
            value: p,
            confidence: ((p - 0.5).abs() * 2.0).min(1.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_scalar_sigmoid() {
        let net = DenseNetwork {
            input_dim: 2,
            layers: vec![DenseLayer {
                weights: vec![vec![1.0, 2.0]],
                bias: vec![0.0],
                activation: Activation::Sigmoid,
            }],
            metadata: serde_json::json!({}),
        };
        net.validate().unwrap();

        let p0 = net.forward_scalar(&[0.0, 0.0]).unwrap();
        assert!((p0 - 0.5).abs() < 1e-12);
        assert!(net.forward_scalar(&[1.0, 0.0]).unwrap() > 0.5);
    }

    #[test]
    fn validates_shapes() {
        let bad = DenseNetwork {
            input_dim: 3,
            layers: vec![DenseLayer {
                weights: vec![vec![1.0, 2.0]],
                bias: vec![0.0],
                activation: Activation::Linear,
            }],
            metadata: serde_json::json!({}),
        };
        assert!(bad.validate().is_err());
        assert!(DenseModel::new(DenseNetwork::neutral(3)).is_err());
    }

    #[tokio::test]
    async fn neutral_model_has_no_confidence() {
        let model = DenseModel::neutral();
        let score = model
            .predict(&ModelFeatures {
                values: vec![1.0; FEATURE_DIM],
            })
            .await
            .unwrap();
        assert_eq!(score.value, 0.5);
        assert_eq!(score.confidence, 0.0);
    }
}
