use std::collections::BTreeMap;

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::config::TrainingConfig;
use crate::domain::product::ProductId;
use crate::errors::ForecastError;
use crate::forecast::boosting::{BoostingParams, GradientBoosting};
use crate::forecast::dataset::{build_examples, split_at_cutoff, InsufficientData, TrainingSplit};
use crate::forecast::features::FEATURE_SET;
use crate::forecast::forest::{ForestParams, RandomForest};
use crate::forecast::regressor::{ForecastModel, Regressor};
use crate::forecast::sales::DailySalesSeries;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub trained_at: DateTime<Utc>,
    pub model_name: String,
    pub mae_model: f64,
    pub mae_baseline: f64,
    /// Strict improvement over the rolling-7 baseline on the holdout.
    pub beats_baseline: bool,
    /// Gates inference; always equal to `beats_baseline`.
    pub use_model: bool,
    pub feature_set: String,
    pub fit_examples: usize,
    pub eval_examples: usize,
    pub cutoff: NaiveDate,
}

/// The single persisted model snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ForecastArtifact {
    pub metadata: ModelMetadata,
    pub model: ForecastModel,
}

impl ForecastArtifact {
    /// The model, only when its metadata says it may be trusted.
    pub fn usable_model(&self) -> Option<&ForecastModel> {
        self.metadata.use_model.then_some(&self.model)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum TrainingOutcome {
    Trained(Box<ForecastArtifact>),
    Skipped(InsufficientData),
}

/// Candidates in evaluation order. On equal MAE the earlier one wins.
pub fn candidate_models(config: &TrainingConfig) -> Vec<ForecastModel> {
    vec![
        ForecastModel::GradientBoosting(GradientBoosting::new(BoostingParams::from(config))),
        ForecastModel::RandomForest(RandomForest::new(ForestParams::from(config))),
    ]
}

pub fn mean_absolute_error(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    actual.iter().zip(predicted).map(|(actual, predicted)| (actual - predicted).abs()).sum::<f64>()
        / actual.len() as f64
}

pub fn holdout_cutoff(today: NaiveDate, eval_holdout_days: u32) -> NaiveDate {
    today.checked_sub_days(Days::new(u64::from(eval_holdout_days))).unwrap_or(NaiveDate::MIN)
}

/// Build examples from `series`, split them at `today - eval_holdout_days`
/// and fit every candidate. Too little data is a [`TrainingOutcome::Skipped`].
pub fn train(
    series: &BTreeMap<ProductId, DailySalesSeries>,
    today: NaiveDate,
    eval_holdout_days: u32,
    config: &TrainingConfig,
    trained_at: DateTime<Utc>,
) -> Result<TrainingOutcome, ForecastError> {
    let examples = build_examples(series);
    let split = match split_at_cutoff(examples, holdout_cutoff(today, eval_holdout_days)) {
        Ok(split) => split,
        Err(reason) => {
            tracing::info!(
                event_name = "forecast.train.skipped",
                product_count = series.len(),
                reason = %reason,
                "training skipped"
            );
            return Ok(TrainingOutcome::Skipped(reason));
        }
    };

    let artifact = train_and_select(&split, candidate_models(config), trained_at)?;
    Ok(TrainingOutcome::Trained(Box::new(artifact)))
}

/// Fit each candidate on the fit split, score it on the eval split with
/// predictions floored at zero, and keep the lowest MAE.
pub fn train_and_select(
    split: &TrainingSplit,
    candidates: Vec<ForecastModel>,
    trained_at: DateTime<Utc>,
) -> Result<ForecastArtifact, ForecastError> {
    let (fit_rows, fit_labels) = split.fit_matrix();
    let (eval_rows, eval_labels) = split.eval_matrix();

    let baseline: Vec<f64> = split.eval.iter().map(|example| example.features.roll_7).collect();
    let mae_baseline = mean_absolute_error(&eval_labels, &baseline);

    let mut best: Option<(f64, ForecastModel)> = None;
    for mut candidate in candidates {
        candidate.fit(&fit_rows, &fit_labels)?;
        let predictions: Vec<f64> =
            candidate.predict_all(&eval_rows).into_iter().map(|value| value.max(0.0)).collect();
        let mae = mean_absolute_error(&eval_labels, &predictions);

        tracing::info!(
            event_name = "forecast.train.candidate_scored",
            model_name = candidate.name(),
            mae,
            mae_baseline,
            "candidate evaluated"
        );

        if best.as_ref().map_or(true, |(best_mae, _)| mae < *best_mae) {
            best = Some((mae, candidate));
        }
    }

    let (mae_model, model) = best.ok_or(ForecastError::NoCandidates)?;
    let beats_baseline = mae_model < mae_baseline;

    let metadata = ModelMetadata {
        trained_at,
        model_name: model.name().to_string(),
        mae_model,
        mae_baseline,
        beats_baseline,
        use_model: beats_baseline,
        feature_set: FEATURE_SET.to_string(),
        fit_examples: split.fit.len(),
        eval_examples: split.eval.len(),
        cutoff: split.cutoff,
    };

    tracing::info!(
        event_name = "forecast.train.completed",
        model_name = %metadata.model_name,
        mae_model,
        mae_baseline,
        beats_baseline,
        fit_examples = metadata.fit_examples,
        eval_examples = metadata.eval_examples,
        "forecast model selected"
    );

    Ok(ForecastArtifact { metadata, model })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use chrono::{Days, NaiveDate, TimeZone, Utc};

    use super::{mean_absolute_error, train, train_and_select, TrainingOutcome};
    use crate::config::TrainingConfig;
    use crate::domain::product::ProductId;
    use crate::errors::ForecastError;
    use crate::forecast::dataset::{build_examples, split_at_cutoff, InsufficientData};
    use crate::forecast::sales::DailySalesSeries;

    fn small_config() -> TrainingConfig {
        TrainingConfig {
            forest_trees: 10,
            boosting_iterations: 20,
            ..TrainingConfig::default()
        }
    }

    fn series(quantities: Vec<f64>) -> BTreeMap<ProductId, DailySalesSeries> {
        let product_id = ProductId(1);
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date");
        BTreeMap::from([(product_id, DailySalesSeries { product_id, start, quantities })])
    }

    #[test]
    fn mae_of_perfect_prediction_is_zero() {
        assert_eq!(mean_absolute_error(&[1.0, 2.0], &[1.0, 2.0]), 0.0);
        assert_eq!(mean_absolute_error(&[1.0, 2.0], &[2.0, 4.0]), 1.5);
    }

    #[test]
    fn constant_series_never_beats_baseline() {
        let data = series(vec![4.0; 120]);
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date");
        let today = start + Days::new(120);
        let trained_at = Utc.with_ymd_and_hms(2024, 4, 30, 0, 0, 0).single().expect("valid time");

        let outcome = train(&data, today, 30, &small_config(), trained_at).expect("training runs");
        let TrainingOutcome::Trained(artifact) = outcome else {
            panic!("expected a trained artifact");
        };

        assert_eq!(artifact.metadata.mae_baseline, 0.0);
        assert!(!artifact.metadata.beats_baseline);
        assert!(!artifact.metadata.use_model);
        assert!(artifact.usable_model().is_none());
        assert_eq!(artifact.metadata.feature_set, "v2");
        assert_eq!(artifact.metadata.fit_examples + artifact.metadata.eval_examples, 119);
    }

    #[test]
    fn short_history_is_skipped() {
        let data = series(vec![1.0; 30]);
        let today = NaiveDate::from_ymd_opt(2024, 2, 1).expect("valid date");
        let outcome =
            train(&data, today, 10, &small_config(), Utc::now()).expect("training runs");
        assert_eq!(
            outcome,
            TrainingOutcome::Skipped(InsufficientData::TooFewExamples { total: 29 })
        );
    }

    #[test]
    fn weekly_pattern_prefers_a_model() {
        // Strong day-of-week signal: the 7-day mean is always off by a lot.
        let quantities: Vec<f64> =
            (0..140).map(|day| if day % 7 == 0 { 14.0 } else { 0.0 }).collect();
        let data = series(quantities);
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date");
        let split = split_at_cutoff(build_examples(&data), start + Days::new(110))
            .expect("enough data");

        let artifact =
            train_and_select(&split, super::candidate_models(&small_config()), Utc::now())
                .expect("selection succeeds");

        assert!(artifact.metadata.mae_model < artifact.metadata.mae_baseline);
        assert!(artifact.metadata.use_model);
    }

    #[test]
    fn no_candidates_is_an_error() {
        let data = series(vec![1.0; 120]);
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).expect("valid date");
        let split =
            split_at_cutoff(build_examples(&data), start + Days::new(90)).expect("enough data");
        assert_eq!(
            train_and_select(&split, Vec::new(), Utc::now()).err(),
            Some(ForecastError::NoCandidates)
        );
    }
}
