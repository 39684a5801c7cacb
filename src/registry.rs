use crate::error::{Error, Result};
use crate::model::{LoadedModel, ModelKind};
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Canonical name of the fixed neural-network artifact.
pub const NEURAL_NETWORK_MODEL: &str = "Neural_Network";
/// Reserved artifact holding the label encoding.
pub const LABEL_ENCODER_FILE: &str = "label_encoder.json";
/// Reserved artifact holding the neural-network feature scaler.
pub const SCALER_FILE: &str = "nn_scaler.json";

const MODEL_EXTENSION: &str = "onnx";

/// Discovers trained model artifacts on disk and keeps loaded instances
/// resident for the life of the process.
///
/// The cache is the only shared mutable state in the pipeline. Lookups for
/// cached names are lock-free reads; a cache miss deserializes outside any
/// lock, so loading one model never blocks requests for other names. Two
/// racing loads of the same uncached name may both deserialize; the second
/// insert overwrites the first, which is idempotent because loading is a
/// pure function of the immutable on-disk artifact.
pub struct ModelRegistry {
    model_dir: PathBuf,
    cache: DashMap<String, Arc<LoadedModel>>,
}

impl ModelRegistry {
    pub fn new(model_dir: impl Into<PathBuf>) -> Result<Self> {
        let model_dir = model_dir.into();
        if !model_dir.is_dir() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("model directory not found at {}", model_dir.display()),
            )));
        }
        tracing::info!(model_dir = %model_dir.display(), "model registry initialized");
        Ok(Self {
            model_dir,
            cache: DashMap::new(),
        })
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    /// Scans the model directory and returns the canonical model names,
    /// sorted and duplicate-free. Reserved artifacts are excluded.
    pub fn list_models(&self) -> Result<Vec<String>> {
        let mut names = BTreeSet::new();
        for entry in fs::read_dir(&self.model_dir)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            if file_name == LABEL_ENCODER_FILE || file_name == SCALER_FILE {
                continue;
            }
            let path = Path::new(file_name);
            if path.extension().and_then(|e| e.to_str()) != Some(MODEL_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.insert(stem.replace(' ', "_"));
            }
        }
        Ok(names.into_iter().collect())
    }

    /// Returns the cached model for `name`, loading and caching it on first
    /// use. Loaded models are never evicted or reloaded.
    pub fn load(&self, name: &str) -> Result<Arc<LoadedModel>> {
        if let Some(model) = self.cache.get(name) {
            return Ok(Arc::clone(&model));
        }

        let (kind, path) = self.resolve(name)?;
        let model = Arc::new(LoadedModel::load(name, kind, &path)?);
        self.cache.insert(name.to_string(), Arc::clone(&model));
        tracing::info!(model = %name, ?kind, path = %path.display(), "model loaded");
        Ok(model)
    }

    /// Resolves a canonical name to its on-disk artifact. Estimator names
    /// are tried with the normalized filename first, then the legacy
    /// variant with underscores as spaces.
    fn resolve(&self, name: &str) -> Result<(ModelKind, PathBuf)> {
        if name == NEURAL_NETWORK_MODEL {
            let path = self
                .model_dir
                .join(format!("{NEURAL_NETWORK_MODEL}.{MODEL_EXTENSION}"));
            if path.is_file() {
                return Ok((ModelKind::NeuralNetwork, path));
            }
            return Err(Error::ModelNotFound {
                name: name.to_string(),
            });
        }

        let normalized = self.model_dir.join(format!("{name}.{MODEL_EXTENSION}"));
        if normalized.is_file() {
            return Ok((ModelKind::EnsembleClassifier, normalized));
        }
        let legacy = self
            .model_dir
            .join(format!("{}.{MODEL_EXTENSION}", name.replace('_', " ")));
        if legacy.is_file() {
            return Ok((ModelKind::EnsembleClassifier, legacy));
        }

        Err(Error::ModelNotFound {
            name: name.to_string(),
        })
    }
}
