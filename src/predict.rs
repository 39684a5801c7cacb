use crate::error::{Error, Result};
use crate::features;
use crate::labels::LabelEncoding;
use crate::registry::{ModelRegistry, LABEL_ENCODER_FILE, SCALER_FILE};
use crate::scaler::FeatureScaler;
use crate::segment;
use serde::Serialize;
use std::path::Path;

/// Outcome of one prediction request. Exactly one of `emotion` and `error`
/// is populated; `confidence` is present only when the model kind supports
/// a probability estimate.
#[derive(Debug, Clone, Serialize)]
pub struct PredictionResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub emotion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PredictionResult {
    fn success(emotion: String, confidence: Option<f32>) -> Self {
        Self {
            emotion: Some(emotion),
            confidence,
            error: None,
        }
    }

    fn failure(error: &Error) -> Self {
        Self {
            emotion: None,
            confidence: None,
            error: Some(error.to_string()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// End-to-end prediction pipeline: model resolution, segment selection,
/// feature extraction, inference, label decoding.
///
/// The label encoding and the neural-network scaler are loaded once at
/// construction and shared read-only across requests. A missing or broken
/// scaler is not fatal here; it only fails requests that target the
/// neural-network model.
pub struct EmotionPredictor {
    registry: ModelRegistry,
    labels: LabelEncoding,
    scaler: Option<FeatureScaler>,
    default_segment_secs: f64,
}

impl EmotionPredictor {
    pub fn new(model_dir: &Path, default_segment_secs: f64) -> Result<Self> {
        let registry = ModelRegistry::new(model_dir)?;
        let labels = LabelEncoding::load(&model_dir.join(LABEL_ENCODER_FILE))?;
        let scaler = match FeatureScaler::load(&model_dir.join(SCALER_FILE)) {
            Ok(scaler) => Some(scaler),
            Err(e) => {
                tracing::warn!(error = %e, "feature scaler unavailable, neural network predictions will fail");
                None
            }
        };

        Ok(Self {
            registry,
            labels,
            scaler,
            default_segment_secs,
        })
    }

    pub fn list_models(&self) -> Result<Vec<String>> {
        self.registry.list_models()
    }

    /// Runs the full pipeline and always returns a result value; any stage
    /// failure short-circuits the remaining stages and lands in
    /// [`PredictionResult::error`]. No stage is retried.
    pub fn predict(
        &self,
        model_name: &str,
        audio_path: &Path,
        chorus_start: Option<f64>,
        chorus_end: Option<f64>,
    ) -> PredictionResult {
        match self.run_pipeline(model_name, audio_path, chorus_start, chorus_end) {
            Ok((emotion, confidence)) => {
                tracing::info!(model = %model_name, emotion = %emotion, ?confidence, "prediction complete");
                PredictionResult::success(emotion, confidence)
            }
            Err(e) => {
                tracing::error!(model = %model_name, error = %e, "prediction failed");
                PredictionResult::failure(&e)
            }
        }
    }

    fn run_pipeline(
        &self,
        model_name: &str,
        audio_path: &Path,
        chorus_start: Option<f64>,
        chorus_end: Option<f64>,
    ) -> Result<(String, Option<f32>)> {
        let model = self.registry.load(model_name)?;

        // The temp file handle owns the segment artifact; dropping it at the
        // end of this scope removes the file on success and on every error
        // path alike.
        let segment_file = segment::extract_segment(
            audio_path,
            chorus_start,
            chorus_end,
            self.default_segment_secs,
        )?;
        let features = features::extract_features(segment_file.path())?;

        let (index, confidence) = model.predict(&features, self.scaler.as_ref())?;
        let emotion = self.labels.decode(index)?.to_string();

        Ok((emotion, confidence))
    }
}
