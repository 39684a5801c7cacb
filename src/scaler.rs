use crate::error::{Error, Result};
use ndarray::Array1;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Feature standardization parameters for the neural-network model, loaded
/// once at startup and shared across requests. Standardization is
/// `(x - mean) / scale`, with zero scale entries treated as one.
#[derive(Debug, Clone, Deserialize)]
pub struct FeatureScaler {
    mean: Vec<f32>,
    scale: Vec<f32>,
}

impl FeatureScaler {
    pub fn new(mean: Vec<f32>, scale: Vec<f32>) -> Self {
        Self { mean, scale }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| Error::ArtifactLoad {
            what: "feature scaler",
            source: Box::new(e),
        })?;
        let scaler: Self = serde_json::from_str(&raw).map_err(|e| Error::ArtifactLoad {
            what: "feature scaler",
            source: Box::new(e),
        })?;
        if scaler.mean.is_empty() || scaler.mean.len() != scaler.scale.len() {
            return Err(Error::ArtifactLoad {
                what: "feature scaler",
                source: "mean and scale lengths differ or are empty".into(),
            });
        }
        tracing::info!(features = scaler.mean.len(), "feature scaler loaded");
        Ok(scaler)
    }

    pub fn transform(&self, features: &Array1<f32>) -> Result<Array1<f32>> {
        if features.len() != self.mean.len() {
            return Err(Error::Inference {
                reason: format!(
                    "scaler expects {} features, got {}",
                    self.mean.len(),
                    features.len()
                ),
            });
        }
        Ok(Array1::from_iter(
            features
                .iter()
                .zip(&self.mean)
                .zip(&self.scale)
                .map(|((x, mean), scale)| {
                    let scale = if *scale == 0.0 { 1.0 } else { *scale };
                    (x - mean) / scale
                }),
        ))
    }
}
