use std::path::PathBuf;

use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ForecastError {
    #[error("invalid forecast input: {0}")]
    InvalidInput(String),
    #[error("cannot fit `{model}` on an empty training set")]
    EmptyTrainingSet { model: &'static str },
    #[error("feature/label length mismatch: {features} feature rows vs {labels} labels")]
    LengthMismatch { features: usize, labels: usize },
    #[error("no candidate models were supplied for selection")]
    NoCandidates,
}

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("could not access model artifact `{path}`: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("could not (de)serialize model artifact: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("model artifact checksum mismatch: expected {expected}, found {actual}")]
    ChecksumMismatch { expected: String, actual: String },
    #[error("model artifact uses feature set `{found}`, expected `{expected}`")]
    FeatureSetMismatch { expected: String, found: String },
    #[error("model artifact store is unavailable: {0}")]
    Unavailable(String),
}
