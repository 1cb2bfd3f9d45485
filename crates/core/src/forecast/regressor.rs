use serde::{Deserialize, Serialize};

use crate::errors::ForecastError;
use crate::forecast::boosting::GradientBoosting;
use crate::forecast::features::FEATURE_COUNT;
use crate::forecast::forest::RandomForest;

/// A trainable regressor over the fixed feature schema.
pub trait Regressor {
    fn name(&self) -> &'static str;

    fn fit(&mut self, rows: &[[f64; FEATURE_COUNT]], targets: &[f64]) -> Result<(), ForecastError>;

    fn predict(&self, row: &[f64; FEATURE_COUNT]) -> f64;

    fn predict_all(&self, rows: &[[f64; FEATURE_COUNT]]) -> Vec<f64> {
        rows.iter().map(|row| self.predict(row)).collect()
    }
}

pub(crate) fn check_training_input(
    model: &'static str,
    rows: &[[f64; FEATURE_COUNT]],
    targets: &[f64],
) -> Result<(), ForecastError> {
    if rows.len() != targets.len() {
        return Err(ForecastError::LengthMismatch { features: rows.len(), labels: targets.len() });
    }
    if rows.is_empty() {
        return Err(ForecastError::EmptyTrainingSet { model });
    }
    if targets.iter().any(|target| !target.is_finite()) {
        return Err(ForecastError::InvalidInput(format!("{model}: non-finite training label")));
    }
    Ok(())
}

/// Serializable union of the candidate families.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "family", rename_all = "snake_case")]
pub enum ForecastModel {
    GradientBoosting(GradientBoosting),
    RandomForest(RandomForest),
}

impl Regressor for ForecastModel {
    fn name(&self) -> &'static str {
        match self {
            Self::GradientBoosting(model) => model.name(),
            Self::RandomForest(model) => model.name(),
        }
    }

    fn fit(&mut self, rows: &[[f64; FEATURE_COUNT]], targets: &[f64]) -> Result<(), ForecastError> {
        match self {
            Self::GradientBoosting(model) => model.fit(rows, targets),
            Self::RandomForest(model) => model.fit(rows, targets),
        }
    }

    fn predict(&self, row: &[f64; FEATURE_COUNT]) -> f64 {
        match self {
            Self::GradientBoosting(model) => model.predict(row),
            Self::RandomForest(model) => model.predict(row),
        }
    }
}
