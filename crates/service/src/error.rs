use thiserror::Error;

use demandcast_core::errors::{ArtifactError, ForecastError};
use demandcast_db::repositories::RepositoryError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
    #[error(transparent)]
    Forecast(#[from] ForecastError),
    #[error("{what} not found. {hint}")]
    NotFound { what: String, hint: String },
    #[error("background task failed: {0}")]
    Task(String),
}

impl ServiceError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::Forecast(ForecastError::InvalidInput(message.into()))
    }

    pub fn error_class(&self) -> &'static str {
        match self {
            Self::Repository(_) => "persistence",
            Self::Artifact(_) => "artifact",
            Self::Forecast(ForecastError::InvalidInput(_)) => "invalid_input",
            Self::Forecast(_) => "training",
            Self::NotFound { .. } => "not_found",
            Self::Task(_) => "internal",
        }
    }
}
