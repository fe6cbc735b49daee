//! Error types for candidate-attribute meta learning

use thiserror::Error;

/// Result type alias used throughout the crate
pub type Result<T> = std::result::Result<T, MetaFeatError>;

/// Main error type
#[derive(Error, Debug)]
pub enum MetaFeatError {
    /// Unknown classifier name, missing or malformed property. Aborts the run.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// An operator assignment could not produce its column.
    #[error("Candidate generation failed for {assignment}: {reason}")]
    CandidateGeneration { assignment: String, reason: String },

    #[error("Classifier training failed ({classifier}): {reason}")]
    ClassifierTraining { classifier: String, reason: String },

    /// A serialized matrix or model could not be read back.
    #[error("Unreadable artifact {path}: {reason}")]
    CacheCorruption { path: String, reason: String },

    #[error("Unsupported column type: {0}")]
    UnsupportedColumnType(String),

    #[error("Invalid attribute {name}: {reason}")]
    InvalidAttribute { name: String, reason: String },

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("ARFF parse error at line {line}: {reason}")]
    ArffParse { line: usize, reason: String },

    #[error("Feature extraction failed: {0}")]
    FeatureExtraction(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    #[error("Model not fitted")]
    ModelNotFitted,
}

impl MetaFeatError {
    /// Fatal errors abort the whole run instead of skipping one candidate.
    pub fn is_fatal(&self) -> bool {
        matches!(self, MetaFeatError::Configuration(_))
    }

    pub(crate) fn training(classifier: impl ToString, reason: impl ToString) -> Self {
        MetaFeatError::ClassifierTraining {
            classifier: classifier.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl From<bincode::Error> for MetaFeatError {
    fn from(err: bincode::Error) -> Self {
        MetaFeatError::Serialization(err.to_string())
    }
}

impl From<rayon::ThreadPoolBuildError> for MetaFeatError {
    fn from(err: rayon::ThreadPoolBuildError) -> Self {
        MetaFeatError::ThreadPool(err.to_string())
    }
}
