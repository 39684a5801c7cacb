use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

type Cause = Box<dyn std::error::Error + Send + Sync>;

/// Pipeline errors. All of them are terminal for the request that raised
/// them; the orchestrator translates every variant into
/// [`PredictionResult::error`](crate::PredictionResult) instead of letting it
/// cross the pipeline boundary.
#[derive(Error, Debug)]
pub enum Error {
    #[error("segment extraction failed: {source}")]
    SegmentExtraction {
        #[source]
        source: Cause,
    },

    #[error("feature extraction failed: {source}")]
    FeatureExtraction {
        #[source]
        source: Cause,
    },

    #[error("model not found: {name}")]
    ModelNotFound { name: String },

    #[error("failed to load model '{name}': {source}")]
    ModelLoad {
        name: String,
        #[source]
        source: Cause,
    },

    #[error("no feature scaler available for the neural network model")]
    ScalerUnavailable,

    #[error("class index {index} outside label encoding with {num_classes} classes")]
    UnknownClassIndex { index: usize, num_classes: usize },

    #[error("inference failed: {reason}")]
    Inference { reason: String },

    #[error("failed to load {what}: {source}")]
    ArtifactLoad {
        what: &'static str,
        #[source]
        source: Cause,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
