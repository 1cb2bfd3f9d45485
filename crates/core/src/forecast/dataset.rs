use std::collections::BTreeMap;
use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::product::ProductId;
use crate::forecast::features::{FeatureVector, FEATURE_COUNT};
use crate::forecast::sales::DailySalesSeries;

pub const MIN_TOTAL_EXAMPLES: usize = 60;
pub const MIN_FIT_EXAMPLES: usize = 60;
pub const MIN_EVAL_EXAMPLES: usize = 10;

/// Supervised example: features of the prefix before `day`, label = the
/// quantity sold on `day`.
#[derive(Clone, Debug, PartialEq)]
pub struct TrainingExample {
    pub product_id: ProductId,
    pub day: NaiveDate,
    pub features: FeatureVector,
    pub label: f64,
}

/// Examples partitioned on a single wall-clock cutoff shared by all products.
#[derive(Clone, Debug)]
pub struct TrainingSplit {
    pub cutoff: NaiveDate,
    pub fit: Vec<TrainingExample>,
    pub eval: Vec<TrainingExample>,
}

impl TrainingSplit {
    pub fn fit_matrix(&self) -> (Vec<[f64; FEATURE_COUNT]>, Vec<f64>) {
        to_matrix(&self.fit)
    }

    pub fn eval_matrix(&self) -> (Vec<[f64; FEATURE_COUNT]>, Vec<f64>) {
        to_matrix(&self.eval)
    }
}

/// Why a training run was skipped. Reported as a value, not an error.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum InsufficientData {
    TooFewExamples { total: usize },
    TooFewSplitExamples { fit: usize, eval: usize },
}

impl fmt::Display for InsufficientData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooFewExamples { .. } => {
                f.write_str("Not enough data to train (need more order history).")
            }
            Self::TooFewSplitExamples { .. } => {
                f.write_str("Not enough split data for training/eval.")
            }
        }
    }
}

/// Slide over each series: index `i >= 1` yields an example whose features see
/// only `series[..i]`.
pub fn build_examples(series: &BTreeMap<ProductId, DailySalesSeries>) -> Vec<TrainingExample> {
    let mut examples = Vec::new();
    for product in series.values() {
        for index in 1..product.len() {
            let day = product.day_at(index);
            examples.push(TrainingExample {
                product_id: product.product_id,
                day,
                features: FeatureVector::extract(&product.quantities[..index], day),
                label: product.quantities[index],
            });
        }
    }
    examples
}

pub fn split_at_cutoff(
    examples: Vec<TrainingExample>,
    cutoff: NaiveDate,
) -> Result<TrainingSplit, InsufficientData> {
    if examples.len() < MIN_TOTAL_EXAMPLES {
        return Err(InsufficientData::TooFewExamples { total: examples.len() });
    }

    let (fit, eval): (Vec<_>, Vec<_>) =
        examples.into_iter().partition(|example| example.day < cutoff);

    if fit.len() < MIN_FIT_EXAMPLES || eval.len() < MIN_EVAL_EXAMPLES {
        return Err(InsufficientData::TooFewSplitExamples { fit: fit.len(), eval: eval.len() });
    }

    Ok(TrainingSplit { cutoff, fit, eval })
}

fn to_matrix(examples: &[TrainingExample]) -> (Vec<[f64; FEATURE_COUNT]>, Vec<f64>) {
    examples.iter().map(|example| (example.features.to_array(), example.label)).unzip()
}
