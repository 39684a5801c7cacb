use crate::error::{Error, Result};
use crate::scaler::FeatureScaler;
use crate::session;
use ndarray::{Array1, Axis};
use std::fmt::Display;
use std::path::Path;

use ort::Session;

/// Class-label output of estimator graphs (sklearn-style ONNX export).
pub const LABEL_OUTPUT: &str = "label";
/// Optional class-probability output of estimator graphs.
pub const PROBABILITIES_OUTPUT: &str = "probabilities";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    /// Emits a probability distribution over classes; requires the shared
    /// feature scaler.
    NeuralNetwork,
    /// Emits a class label directly, with an optional probability output.
    EnsembleClassifier,
}

/// A loaded model: kind tag, ONNX session, and the output capabilities
/// probed once at load time. Owned by the registry and shared as `Arc`;
/// never reloaded for the life of the process.
#[derive(Debug)]
pub struct LoadedModel {
    name: String,
    kind: ModelKind,
    session: Session,
    distribution_output: String,
    has_probabilities: bool,
}

impl LoadedModel {
    pub fn load(name: &str, kind: ModelKind, path: &Path) -> Result<Self> {
        let session = session::create_session(path).map_err(|e| Error::ModelLoad {
            name: name.to_string(),
            source: Box::new(e),
        })?;
        let distribution_output = session
            .outputs
            .first()
            .map(|output| output.name.clone())
            .ok_or_else(|| Error::ModelLoad {
                name: name.to_string(),
                source: "model graph declares no outputs".into(),
            })?;
        let has_probabilities = session
            .outputs
            .iter()
            .any(|output| output.name == PROBABILITIES_OUTPUT);

        Ok(Self {
            name: name.to_string(),
            kind,
            session,
            distribution_output,
            has_probabilities,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    /// Runs the model on a feature vector and returns the predicted class
    /// index with an optional confidence.
    ///
    /// Confidence is the probability mass at the predicted index when the
    /// model exposes one; values from different model kinds come from
    /// different estimators and are not numerically comparable.
    pub fn predict(
        &self,
        features: &Array1<f32>,
        scaler: Option<&FeatureScaler>,
    ) -> Result<(usize, Option<f32>)> {
        match self.kind {
            ModelKind::NeuralNetwork => self.predict_network(features, scaler),
            ModelKind::EnsembleClassifier => self.predict_estimator(features),
        }
    }

    fn predict_network(
        &self,
        features: &Array1<f32>,
        scaler: Option<&FeatureScaler>,
    ) -> Result<(usize, Option<f32>)> {
        let scaler = scaler.ok_or(Error::ScalerUnavailable)?;
        let scaled = scaler.transform(features)?;
        let batch = scaled.insert_axis(Axis(0));

        let inputs = ort::inputs![batch.view().into_dyn()].map_err(inference_err)?;
        let outputs = self.session.run(inputs).map_err(inference_err)?;
        let distribution = outputs
            .get(self.distribution_output.as_str())
            .ok_or_else(|| Error::Inference {
                reason: format!("output '{}' not found", self.distribution_output),
            })?
            .try_extract_tensor::<f32>()
            .map_err(inference_err)?;

        let row: Vec<f32> = distribution.iter().copied().collect();
        let (index, confidence) = argmax(&row).ok_or_else(|| Error::Inference {
            reason: "model returned an empty distribution".to_string(),
        })?;
        Ok((index, Some(confidence)))
    }

    fn predict_estimator(&self, features: &Array1<f32>) -> Result<(usize, Option<f32>)> {
        let batch = features.view().insert_axis(Axis(0));

        let inputs = ort::inputs![batch.into_dyn()].map_err(inference_err)?;
        let outputs = self.session.run(inputs).map_err(inference_err)?;
        let labels = outputs
            .get(LABEL_OUTPUT)
            .ok_or_else(|| Error::Inference {
                reason: format!("output '{LABEL_OUTPUT}' not found"),
            })?
            .try_extract_tensor::<i64>()
            .map_err(inference_err)?;
        let raw = labels.iter().next().copied().ok_or_else(|| Error::Inference {
            reason: "model returned no class label".to_string(),
        })?;
        let index = usize::try_from(raw).map_err(|_| Error::Inference {
            reason: format!("model returned negative class label {raw}"),
        })?;

        let confidence = if self.has_probabilities {
            let probabilities = outputs
                .get(PROBABILITIES_OUTPUT)
                .ok_or_else(|| Error::Inference {
                    reason: format!("output '{PROBABILITIES_OUTPUT}' not found"),
                })?
                .try_extract_tensor::<f32>()
                .map_err(inference_err)?;
            probabilities.iter().copied().nth(index)
        } else {
            None
        };

        Ok((index, confidence))
    }
}

fn inference_err<E: Display>(e: E) -> Error {
    Error::Inference {
        reason: e.to_string(),
    }
}

/// Index and value of the row maximum. Exact ties resolve to the lowest
/// index.
pub(crate) fn argmax(row: &[f32]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (index, &value) in row.iter().enumerate() {
        let better = match best {
            None => true,
            Some((_, current)) => value > current,
        };
        if better {
            best = Some((index, value));
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argmax_picks_the_maximum() {
        assert_eq!(argmax(&[0.1, 0.7, 0.2]), Some((1, 0.7)));
    }

    #[test]
    fn argmax_ties_resolve_to_lowest_index() {
        assert_eq!(argmax(&[0.1, 0.4, 0.4, 0.1]), Some((1, 0.4)));
        assert_eq!(argmax(&[0.5, 0.5]), Some((0, 0.5)));
    }

    #[test]
    fn argmax_of_empty_row_is_none() {
        assert_eq!(argmax(&[]), None);
    }

    #[test]
    fn loading_garbage_artifact_is_a_model_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Broken.onnx");
        std::fs::write(&path, b"not an onnx graph").unwrap();

        let err = LoadedModel::load("Broken", ModelKind::EnsembleClassifier, &path).unwrap_err();
        assert!(matches!(err, Error::ModelLoad { .. }));
    }
}
